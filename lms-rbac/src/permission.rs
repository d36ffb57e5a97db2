use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! permissions {
    ($($variant:ident => $token:literal,)+) => {
        /// Atomic capability token consulted by the route guards.
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            ToSchema,
        )]
        #[serde(rename_all = "snake_case")]
        pub enum Permission {
            $($variant,)+
        }

        impl Permission {
            pub const ALL: &'static [Permission] = &[$(Permission::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Permission::$variant => $token,)+
                }
            }
        }

        impl FromStr for Permission {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($token => Ok(Permission::$variant),)+
                    _ => Err(anyhow::anyhow!("unknown permission `{}`", s)),
                }
            }
        }
    };
}

permissions! {
    // courses
    ViewCourses => "view_courses",
    CreateCourse => "create_course",
    EditCourse => "edit_course",
    DeleteCourse => "delete_course",
    ExecuteCourse => "execute_course",
    // users
    ViewUsers => "view_users",
    ManageUsers => "manage_users",
    ChangeUserRoles => "change_user_roles",
    DeactivateUsers => "deactivate_users",
    // topics
    ViewTopics => "view_topics",
    CreateTopics => "create_topics",
    EditTopics => "edit_topics",
    DeleteTopics => "delete_topics",
    ViewAssignedTopics => "view_assigned_topics",
    // exercises
    ViewExercises => "view_exercises",
    CreateExercises => "create_exercises",
    EditExercises => "edit_exercises",
    DeleteExercises => "delete_exercises",
    ViewAssignedExercises => "view_assigned_exercises",
    ExecuteCode => "execute_code",
    SubmitExercises => "submit_exercises",
    // submissions and grading
    ViewStudentSubmissions => "view_student_submissions",
    GradeSubmissions => "grade_submissions",
    ProvideFeedback => "provide_feedback",
    ViewOwnSubmissions => "view_own_submissions",
    ViewOwnGrades => "view_own_grades",
    // progress
    ViewOwnProgress => "view_own_progress",
    ViewAllProgress => "view_all_progress",
    // editions, groups and enrollments
    ManageCourseEditions => "manage_course_editions",
    ManageGroups => "manage_groups",
    AssignInstructors => "assign_instructors",
    EnrollStudents => "enroll_students",
    // settings
    ViewSettings => "view_settings",
    EditSystemSettings => "edit_system_settings",
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
