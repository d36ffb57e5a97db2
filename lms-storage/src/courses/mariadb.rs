use async_trait::async_trait;
use sqlx::{mysql::MySqlRow, MySqlExecutor, MySqlPool, Row};

use lms_slo::{errors, Result};

use super::{Course, CourseStore};
use crate::convert::parse_id;

#[derive(Clone)]
pub struct CourseImpl {
    pool: MySqlPool,
}

impl CourseImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseStore for CourseImpl {
    async fn get_course(&self, id: &str) -> Result<Course> {
        fetch_course(&self.pool, parse_id(id)?)
            .await?
            .ok_or_else(|| errors::not_found("course not found"))
    }
}

pub(crate) async fn fetch_course<'e, E: MySqlExecutor<'e>>(
    executor: E,
    id: u64,
) -> Result<Option<Course>> {
    let row = sqlx::query(
        r#"SELECT `id`,`title`,`description`,`status`,`instructor_id`,
        `is_active`,`created_at`,`updated_at`
        FROM `course`
        WHERE `id` = ? AND `deleted` = 0;"#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(errors::any)?;
    row.as_ref().map(course_from_row).transpose()
}

fn course_from_row(row: &MySqlRow) -> Result<Course> {
    Ok(Course {
        id: row
            .try_get::<u64, _>("id")
            .map_err(errors::any)?
            .to_string(),
        title: row.try_get("title").map_err(errors::any)?,
        description: row.try_get("description").map_err(errors::any)?,
        status: row
            .try_get::<String, _>("status")
            .map_err(errors::any)?
            .parse()
            .map_err(errors::anyhow)?,
        instructor_id: row
            .try_get::<Option<u64>, _>("instructor_id")
            .map_err(errors::any)?
            .map(|v| v.to_string()),
        is_active: row.try_get("is_active").map_err(errors::any)?,
        created_at: row.try_get("created_at").map_err(errors::any)?,
        updated_at: row.try_get("updated_at").map_err(errors::any)?,
    })
}
