use async_trait::async_trait;
use sqlx::{MySqlPool, Row};

use lms_slo::{errors, Result};

use super::{User, UserStore};
use crate::convert::parse_id;

#[derive(Clone)]
pub struct UserImpl {
    pool: MySqlPool,
}

impl UserImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserImpl {
    async fn get_user(&self, id: &str) -> Result<User> {
        let row = sqlx::query(
            r#"SELECT `id`,`name`,`email`,`role`,`is_active`,`created_at`,`updated_at`
            FROM `user`
            WHERE `id` = ? AND `deleted` = 0;"#,
        )
        .bind(parse_id(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(errors::any)?
        .ok_or_else(|| errors::not_found("user not found"))?;

        Ok(User {
            id: row
                .try_get::<u64, _>("id")
                .map_err(errors::any)?
                .to_string(),
            name: row.try_get("name").map_err(errors::any)?,
            email: row.try_get("email").map_err(errors::any)?,
            role: row
                .try_get::<String, _>("role")
                .map_err(errors::any)?
                .parse()
                .map_err(errors::anyhow)?,
            is_active: row.try_get("is_active").map_err(errors::any)?,
            created_at: row.try_get("created_at").map_err(errors::any)?,
            updated_at: row.try_get("updated_at").map_err(errors::any)?,
        })
    }
}
