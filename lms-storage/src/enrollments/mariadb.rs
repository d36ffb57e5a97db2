use async_trait::async_trait;
use sqlx::{mysql::MySqlRow, MySqlExecutor, MySqlPool, Row};
use tracing::{debug, warn};

use lms_slo::{errors, next_id, Result};

use super::{
    Content, EnrollmentStatus, Enrollment, EnrollmentStore, ALREADY_ENROLLED,
    CAPACITY_REACHED,
};
use crate::convert::parse_id;

const COLUMNS: &str =
    "`id`,`group_id`,`user_id`,`status`,`enrolled_by`,`enrolled_at`";

#[derive(Clone)]
pub struct EnrollmentImpl {
    pool: MySqlPool,
}

impl EnrollmentImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentStore for EnrollmentImpl {
    async fn find_enrollment(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<Enrollment>> {
        let row = sqlx::query(&format!(
            r#"SELECT {} FROM `group_enrollment`
            WHERE `group_id` = ? AND `user_id` = ? AND `deleted` = 0;"#,
            COLUMNS
        ))
        .bind(parse_id(group_id)?)
        .bind(parse_id(user_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(errors::any)?;
        row.as_ref().map(enrollment_from_row).transpose()
    }

    async fn find_enrollment_in_course(
        &self,
        course_id: &str,
        user_id: &str,
    ) -> Result<Option<Enrollment>> {
        fetch_in_course(&self.pool, parse_id(course_id)?, parse_id(user_id)?)
            .await
    }

    async fn create_enrollment(
        &self,
        content: &Content,
        capacity: Option<u32>,
    ) -> Result<Enrollment> {
        let group_id = parse_id(&content.group_id)?;
        let user_id = parse_id(&content.user_id)?;

        // dropping the transaction without commit rolls it back
        let mut tx = self.pool.begin().await.map_err(errors::any)?;
        lock_group(&mut *tx, group_id).await?;

        if let Some(max) = capacity {
            let active = count_active(&mut *tx, group_id).await?;
            debug!("group {} holds {}/{} students", group_id, active, max);
            if active >= i64::from(max) {
                return Err(errors::bad_request(CAPACITY_REACHED));
            }
        }

        let id = next_id().map_err(errors::any)?;
        let enrollment =
            insert_enrollment(&mut *tx, id, group_id, user_id, content)
                .await
                .map_err(|err| match err {
                    sqlx::Error::Database(db) if db.is_unique_violation() => {
                        warn!(
                            "duplicate enrollment of {} in {}",
                            user_id, group_id
                        );
                        errors::bad_request(ALREADY_ENROLLED)
                    }
                    err => errors::any(err),
                })?;
        tx.commit().await.map_err(errors::any)?;
        Ok(enrollment)
    }

    async fn create_enrollments(
        &self,
        course_id: &str,
        contents: &[Content],
    ) -> Result<Vec<Enrollment>> {
        let course_id = parse_id(course_id)?;
        let mut rows = Vec::with_capacity(contents.len());
        for content in contents {
            rows.push((
                parse_id(&content.group_id)?,
                parse_id(&content.user_id)?,
                content,
            ));
        }

        let mut tx = self.pool.begin().await.map_err(errors::any)?;
        let mut locked = Vec::new();
        for (group_id, _, _) in &rows {
            if !locked.contains(group_id) {
                lock_group(&mut *tx, *group_id).await?;
                locked.push(*group_id);
            }
        }

        let mut output = Vec::with_capacity(rows.len());
        for (group_id, user_id, content) in rows {
            if fetch_in_course(&mut *tx, course_id, user_id)
                .await?
                .is_some()
            {
                return Err(errors::conflict(&format!(
                    "user {} is already enrolled in this edition",
                    user_id
                )));
            }
            let id = next_id().map_err(errors::any)?;
            let enrollment =
                insert_enrollment(&mut *tx, id, group_id, user_id, content)
                    .await
                    .map_err(|err| match err {
                        sqlx::Error::Database(db)
                            if db.is_unique_violation() =>
                        {
                            errors::conflict(&format!(
                                "user {} is already enrolled in this edition",
                                user_id
                            ))
                        }
                        err => errors::any(err),
                    })?;
            output.push(enrollment);
        }
        tx.commit().await.map_err(errors::any)?;
        Ok(output)
    }

    async fn list_enrollment_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM `group_enrollment`
            WHERE `user_id` = ? AND `deleted` = 0
            ORDER BY `enrolled_at` DESC;"#,
            COLUMNS
        ))
        .bind(parse_id(user_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(errors::any)?;
        rows.iter().map(enrollment_from_row).collect()
    }

    async fn delete_enrollment(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE `group_enrollment` SET `deleted` = `id`,`deleted_at` = now()
            WHERE `group_id` = ? AND `user_id` = ? AND `deleted` = 0;"#,
        )
        .bind(parse_id(group_id)?)
        .bind(parse_id(user_id)?)
        .execute(&self.pool)
        .await
        .map_err(errors::any)?;
        if result.rows_affected() == 0 {
            return Err(errors::not_found("enrollment not found"));
        }
        Ok(())
    }
}

async fn count_active<'e, E: MySqlExecutor<'e>>(
    executor: E,
    group_id: u64,
) -> Result<i64> {
    let row = sqlx::query(
        r#"SELECT COUNT(*) as count FROM `group_enrollment`
        WHERE `group_id` = ? AND `status` = 'active' AND `deleted` = 0;"#,
    )
    .bind(group_id)
    .fetch_one(executor)
    .await
    .map_err(errors::any)?;
    row.try_get("count").map_err(errors::any)
}

async fn lock_group<'e, E: MySqlExecutor<'e>>(
    executor: E,
    group_id: u64,
) -> Result<()> {
    sqlx::query(
        r#"SELECT `id` FROM `course_group`
        WHERE `id` = ? AND `deleted` = 0 FOR UPDATE;"#,
    )
    .bind(group_id)
    .fetch_optional(executor)
    .await
    .map_err(errors::any)?
    .ok_or_else(|| errors::not_found("group not found"))?;
    Ok(())
}

async fn fetch_in_course<'e, E: MySqlExecutor<'e>>(
    executor: E,
    course_id: u64,
    user_id: u64,
) -> Result<Option<Enrollment>> {
    let row = sqlx::query(
        r#"SELECT e.`id`,e.`group_id`,e.`user_id`,e.`status`,
        e.`enrolled_by`,e.`enrolled_at`
        FROM `group_enrollment` e
        INNER JOIN `course_group` g ON g.`id` = e.`group_id`
        WHERE g.`course_id` = ? AND e.`user_id` = ?
        AND e.`deleted` = 0 AND g.`deleted` = 0
        LIMIT 1;"#,
    )
    .bind(course_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(errors::any)?;
    row.as_ref().map(enrollment_from_row).transpose()
}

async fn insert_enrollment<'e, E: MySqlExecutor<'e>>(
    executor: E,
    id: u64,
    group_id: u64,
    user_id: u64,
    content: &Content,
) -> std::result::Result<Enrollment, sqlx::Error> {
    let status = EnrollmentStatus::Active;
    sqlx::query(
        r#"INSERT INTO `group_enrollment`
        (`id`,`group_id`,`user_id`,`status`,`enrolled_by`,`enrolled_at`)
        VALUES(?,?,?,?,?,?);"#,
    )
    .bind(id)
    .bind(group_id)
    .bind(user_id)
    .bind(status.as_str())
    .bind(content.enrolled_by.as_str())
    .bind(content.enrolled_at)
    .execute(executor)
    .await?;
    Ok(Enrollment {
        id: id.to_string(),
        group_id: group_id.to_string(),
        user_id: user_id.to_string(),
        status,
        enrolled_by: content.enrolled_by,
        enrolled_at: content.enrolled_at,
    })
}

pub(crate) async fn fetch_by_group<'e, E: MySqlExecutor<'e>>(
    executor: E,
    group_id: u64,
) -> Result<Vec<Enrollment>> {
    let rows = sqlx::query(&format!(
        r#"SELECT {} FROM `group_enrollment`
        WHERE `group_id` = ? AND `deleted` = 0;"#,
        COLUMNS
    ))
    .bind(group_id)
    .fetch_all(executor)
    .await
    .map_err(errors::any)?;
    rows.iter().map(enrollment_from_row).collect()
}

fn enrollment_from_row(row: &MySqlRow) -> Result<Enrollment> {
    Ok(Enrollment {
        id: row
            .try_get::<u64, _>("id")
            .map_err(errors::any)?
            .to_string(),
        group_id: row
            .try_get::<u64, _>("group_id")
            .map_err(errors::any)?
            .to_string(),
        user_id: row
            .try_get::<u64, _>("user_id")
            .map_err(errors::any)?
            .to_string(),
        status: row
            .try_get::<String, _>("status")
            .map_err(errors::any)?
            .parse()
            .map_err(errors::anyhow)?,
        enrolled_by: row
            .try_get::<String, _>("enrolled_by")
            .map_err(errors::any)?
            .parse()
            .map_err(errors::anyhow)?,
        enrolled_at: row.try_get("enrolled_at").map_err(errors::any)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::enrollments::EnrolledBy;

    async fn seed_group(pool: &MySqlPool, id: u64, course_id: u64) {
        sqlx::query(
            r#"INSERT IGNORE INTO `course` (`id`,`title`,`status`)
            VALUES(?,'Rust','published');"#,
        )
        .bind(course_id)
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO `course_group` (`id`,`course_id`,`name`)
            VALUES(?,?,'A');"#,
        )
        .bind(id)
        .bind(course_id)
        .execute(pool)
        .await
        .unwrap();
    }

    fn content(group_id: u64, user_id: u64) -> Content {
        Content {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            enrolled_by: EnrolledBy::SelfService,
            enrolled_at: Utc::now().naive_utc(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at MySQL"]
    async fn capacity_is_rechecked_under_lock(pool: MySqlPool) {
        seed_group(&pool, 10, 1).await;
        let store = EnrollmentImpl::new(pool);

        store.create_enrollment(&content(10, 100), Some(1)).await.unwrap();
        assert_eq!(
            store
                .create_enrollment(&content(10, 101), Some(1))
                .await
                .unwrap_err(),
            errors::bad_request(CAPACITY_REACHED)
        );
        assert_eq!(
            store
                .create_enrollment(&content(10, 100), None)
                .await
                .unwrap_err(),
            errors::bad_request(ALREADY_ENROLLED)
        );
        assert_eq!(store.find_enrollment("10", "101").await.unwrap(), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at MySQL"]
    async fn racing_enrollments_fill_one_seat(pool: MySqlPool) {
        seed_group(&pool, 10, 1).await;
        let store = EnrollmentImpl::new(pool.clone());

        let (first, second) = (content(10, 100), content(10, 101));
        let (a, b) = tokio::join!(
            store.create_enrollment(&first, Some(1)),
            store.create_enrollment(&second, Some(1)),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(count_active(&pool, 10).await.unwrap(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at MySQL"]
    async fn batch_with_enrolled_user_saves_nothing(pool: MySqlPool) {
        seed_group(&pool, 10, 1).await;
        seed_group(&pool, 11, 1).await;
        let store = EnrollmentImpl::new(pool.clone());
        store.create_enrollment(&content(11, 102), None).await.unwrap();

        let batch = [content(10, 100), content(10, 101), content(10, 102)];
        assert_eq!(
            store.create_enrollments("1", &batch).await.unwrap_err(),
            errors::conflict("")
        );
        assert_eq!(count_active(&pool, 10).await.unwrap(), 0);

        let saved = store
            .create_enrollments("1", &batch[..2])
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(count_active(&pool, 10).await.unwrap(), 2);
    }
}
