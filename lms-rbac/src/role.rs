use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::Permission::{self, *};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    TeacherEditor,
    TeacherExecutor,
    Student,
}

impl Role {
    pub const ALL: &'static [Role] = &[
        Role::Admin,
        Role::TeacherEditor,
        Role::TeacherExecutor,
        Role::Student,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::TeacherEditor => "teacher_editor",
            Role::TeacherExecutor => "teacher_executor",
            Role::Student => "student",
        }
    }

    /// The exact permission set granted to this role.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Admin => Permission::ALL,
            Role::TeacherEditor => TEACHER_EDITOR,
            Role::TeacherExecutor => TEACHER_EXECUTOR,
            Role::Student => STUDENT,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher_editor" => Ok(Role::TeacherEditor),
            "teacher_executor" => Ok(Role::TeacherExecutor),
            "student" => Ok(Role::Student),
            _ => Err(anyhow::anyhow!("unknown role `{}`", s)),
        }
    }
}

const TEACHER_EDITOR: &[Permission] = &[
    ViewCourses,
    CreateCourse,
    EditCourse,
    DeleteCourse,
    ExecuteCourse,
    ViewTopics,
    CreateTopics,
    EditTopics,
    DeleteTopics,
    ViewExercises,
    CreateExercises,
    EditExercises,
    DeleteExercises,
    ExecuteCode,
    ViewOwnProgress,
    ViewAllProgress,
    ManageCourseEditions,
    ManageGroups,
    AssignInstructors,
    EnrollStudents,
    ViewSettings,
];

const TEACHER_EXECUTOR: &[Permission] = &[
    ViewCourses,
    ExecuteCourse,
    ViewTopics,
    ViewExercises,
    ExecuteCode,
    ViewStudentSubmissions,
    GradeSubmissions,
    ProvideFeedback,
    ViewOwnProgress,
    ManageGroups,
    AssignInstructors,
    EnrollStudents,
    ViewSettings,
];

const STUDENT: &[Permission] = &[
    ViewCourses,
    ViewTopics,
    ViewAssignedTopics,
    ViewAssignedExercises,
    SubmitExercises,
    ViewOwnSubmissions,
    ViewOwnGrades,
    ViewOwnProgress,
    ViewSettings,
];
