pub mod mariadb;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockall::automock;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use lms_slo::Result;

pub const ALREADY_ENROLLED: &str = "user is already enrolled in this group";
pub const CAPACITY_REACHED: &str = "group has reached maximum capacity";

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq)]
pub struct Enrollment {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub status: EnrollmentStatus,
    pub enrolled_by: EnrolledBy,
    pub enrolled_at: NaiveDateTime,
}

#[derive(
    Debug, Clone, Copy, Deserialize, Serialize, ToSchema, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Dropped,
    Completed,
}

#[derive(
    Debug, Clone, Copy, Deserialize, Serialize, ToSchema, PartialEq, Eq,
)]
pub enum EnrolledBy {
    #[serde(rename = "self")]
    SelfService,
    #[serde(rename = "admin")]
    Admin,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dropped => "dropped",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for EnrollmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "dropped" => Ok(Self::Dropped),
            "completed" => Ok(Self::Completed),
            _ => Err(anyhow::anyhow!("unknown enrollment status `{}`", s)),
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EnrolledBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfService => "self",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for EnrolledBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "self" => Ok(Self::SelfService),
            "admin" => Ok(Self::Admin),
            _ => Err(anyhow::anyhow!("unknown enrollment origin `{}`", s)),
        }
    }
}

impl fmt::Display for EnrolledBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A new enrollment. Always persisted as `active`.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub group_id: String,
    pub user_id: String,
    pub enrolled_by: EnrolledBy,
    pub enrolled_at: NaiveDateTime,
}

#[automock]
#[async_trait]
pub trait EnrollmentStore {
    async fn find_enrollment(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<Enrollment>>;
    /// Any enrollment of the user in a group of the given course edition.
    async fn find_enrollment_in_course(
        &self,
        course_id: &str,
        user_id: &str,
    ) -> Result<Option<Enrollment>>;
    /// Inserts atomically. With `capacity` set, the group row is locked and
    /// the active enrollments are re-counted before the insert.
    async fn create_enrollment(
        &self,
        content: &Content,
        capacity: Option<u32>,
    ) -> Result<Enrollment>;
    /// Staff batch for one course edition. Either every row is inserted or
    /// none is. A user already enrolled anywhere in the edition is a
    /// `Conflict`. Capacity is not enforced.
    async fn create_enrollments(
        &self,
        course_id: &str,
        contents: &[Content],
    ) -> Result<Vec<Enrollment>>;
    async fn list_enrollment_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Enrollment>>;
    async fn delete_enrollment(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<()>;
}
