pub mod mariadb;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockall::automock;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use lms_slo::Result;

/// A course edition. Groups hang off it.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: CourseStatus,
    pub instructor_id: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(
    Debug, Clone, Copy, Deserialize, Serialize, ToSchema, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Active,
    Historic,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Historic => "historic",
        }
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "historic" => Ok(Self::Historic),
            _ => Err(anyhow::anyhow!("unknown course status `{}`", s)),
        }
    }
}

#[automock]
#[async_trait]
pub trait CourseStore {
    async fn get_course(&self, id: &str) -> Result<Course>;
}
