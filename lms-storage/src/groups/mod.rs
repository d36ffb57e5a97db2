pub mod mariadb;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockall::automock;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use lms_slo::{regexp::check_enrollment_key, Result};

use crate::{
    courses::Course,
    enrollments::{Enrollment, EnrollmentStatus},
    List, Pagination, ID,
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq)]
pub struct Group {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub schedule: Option<String>,
    pub instructor_id: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_key: Option<String>,
    pub max_students: Option<u32>,
    pub enrollment_start_date: Option<NaiveDateTime>,
    pub enrollment_end_date: Option<NaiveDateTime>,
    pub is_enrollment_open: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A group with its course edition and current enrollments attached.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq)]
pub struct Roster {
    #[serde(flatten)]
    pub group: Group,
    pub course: Option<Course>,
    pub enrollments: Vec<Enrollment>,
}

impl Roster {
    pub fn active_count(&self) -> usize {
        self.enrollments
            .iter()
            .filter(|e| e.status == EnrollmentStatus::Active)
            .count()
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "check_content_window"))]
pub struct Content {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub schedule: Option<String>,
    #[validate(length(min = 1))]
    pub instructor_id: Option<String>,
    #[validate(custom(function = "check_enrollment_key"))]
    pub enrollment_key: Option<String>,
    #[validate(range(min = 1))]
    pub max_students: Option<u32>,
    pub enrollment_start_date: Option<NaiveDateTime>,
    pub enrollment_end_date: Option<NaiveDateTime>,
    #[serde(default = "default_open")]
    pub is_enrollment_open: bool,
}

fn default_open() -> bool {
    true
}

/// Partial update. For the nullable columns an absent field keeps the stored
/// value and an explicit `null` clears it.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "check_update"))]
pub struct UpdateOpts {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub schedule: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub enrollment_key: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<u32>)]
    pub max_students: Option<Option<u32>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub enrollment_start_date: Option<Option<NaiveDateTime>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub enrollment_end_date: Option<Option<NaiveDateTime>>,
    pub is_enrollment_open: Option<bool>,
    pub is_active: Option<bool>,
}

// present field: Some(value or None); missing field falls back to default
fn nullable<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ListOpts {
    #[serde(skip)]
    pub course_id: String,
    #[serde(flatten)]
    #[validate(nested)]
    pub pagination: Pagination,
}

/// `start <= end` when both ends of the enrollment window are set.
pub fn check_window(
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> std::result::Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => {
            Err(ValidationError::new("enrollment window ends before it starts"))
        }
        _ => Ok(()),
    }
}

fn check_content_window(
    content: &Content,
) -> std::result::Result<(), ValidationError> {
    check_window(content.enrollment_start_date, content.enrollment_end_date)
}

fn check_update(
    opts: &UpdateOpts,
) -> std::result::Result<(), ValidationError> {
    if let Some(Some(schedule)) = &opts.schedule {
        if schedule.is_empty() || schedule.chars().count() > 255 {
            return Err(ValidationError::new("schedule must be 1 to 255 chars"));
        }
    }
    if let Some(Some(key)) = &opts.enrollment_key {
        check_enrollment_key(key)?;
    }
    if let Some(Some(0)) = opts.max_students {
        return Err(ValidationError::new("max_students must be at least 1"));
    }
    check_window(
        opts.enrollment_start_date.flatten(),
        opts.enrollment_end_date.flatten(),
    )
}

#[automock]
#[async_trait]
pub trait GroupStore {
    async fn create_group(
        &self,
        id: Option<String>,
        course_id: &str,
        content: &Content,
    ) -> Result<ID>;
    async fn update_group(&self, id: &str, opts: &UpdateOpts) -> Result<()>;
    async fn get_group(&self, id: &str) -> Result<Group>;
    async fn delete_group(&self, id: &str) -> Result<()>;
    async fn list_group(&self, opts: &ListOpts) -> Result<List<Group>>;
    /// `None` clears the instructor.
    async fn assign_instructor(
        &self,
        id: &str,
        instructor_id: Option<String>,
    ) -> Result<()>;
    async fn set_enrollment_key(&self, id: &str, key: &str) -> Result<()>;

    async fn find_group_by_id(&self, id: &str) -> Result<Option<Roster>>;
    async fn find_group_by_enrollment_key(
        &self,
        key: &str,
    ) -> Result<Option<Roster>>;
}
