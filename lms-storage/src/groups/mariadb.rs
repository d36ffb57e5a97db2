use async_trait::async_trait;
use sqlx::{mysql::MySqlRow, MySql, MySqlPool, QueryBuilder, Row};
use tracing::debug;

use lms_slo::{errors, next_id, Result};

use super::{Content, Group, GroupStore, ListOpts, Roster, UpdateOpts};
use crate::{
    convert::{and_where, parse_id, parse_option_id},
    courses::mariadb::fetch_course,
    enrollments::mariadb::fetch_by_group,
    List, ID,
};

const COLUMNS: &str = "`id`,`course_id`,`name`,`schedule`,`instructor_id`,\
    `is_active`,`enrollment_key`,`max_students`,`enrollment_start_date`,\
    `enrollment_end_date`,`is_enrollment_open`,`created_at`,`updated_at`";

#[derive(Clone)]
pub struct GroupImpl {
    pool: MySqlPool,
}

impl GroupImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn select_group(
        &self,
        wheres: &str,
        bind: Bind<'_>,
    ) -> Result<Option<Group>> {
        let sql = format!(
            r#"SELECT {} FROM `course_group` WHERE {} AND `deleted` = 0;"#,
            COLUMNS, wheres
        );
        let query = sqlx::query(&sql);
        let query = match bind {
            Bind::Id(id) => query.bind(id),
            Bind::Key(key) => query.bind(key),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(errors::any)?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn attach(&self, group: Option<Group>) -> Result<Option<Roster>> {
        let Some(group) = group else {
            return Ok(None);
        };
        let course =
            fetch_course(&self.pool, parse_id(&group.course_id)?).await?;
        let enrollments =
            fetch_by_group(&self.pool, parse_id(&group.id)?).await?;
        Ok(Some(Roster {
            group,
            course,
            enrollments,
        }))
    }
}

enum Bind<'a> {
    Id(u64),
    Key(&'a str),
}

#[async_trait]
impl GroupStore for GroupImpl {
    async fn create_group(
        &self,
        id: Option<String>,
        course_id: &str,
        content: &Content,
    ) -> Result<ID> {
        debug!("create group {:#?}", content);
        let gid = match id {
            Some(v) => parse_id(&v)?,
            None => next_id().map_err(errors::any)?,
        };
        sqlx::query(
            r#"INSERT INTO `course_group`
            (`id`,`course_id`,`name`,`schedule`,`instructor_id`,`enrollment_key`,
            `max_students`,`enrollment_start_date`,`enrollment_end_date`,
            `is_enrollment_open`)
            VALUES(?,?,?,?,?,?,?,?,?,?);"#,
        )
        .bind(gid)
        .bind(parse_id(course_id)?)
        .bind(&content.name)
        .bind(&content.schedule)
        .bind(parse_option_id(&content.instructor_id)?)
        .bind(&content.enrollment_key)
        .bind(content.max_students)
        .bind(content.enrollment_start_date)
        .bind(content.enrollment_end_date)
        .bind(content.is_enrollment_open)
        .execute(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                errors::conflict("enrollment key is already in use")
            }
            err => errors::any(err),
        })?;
        Ok(ID {
            id: gid.to_string(),
        })
    }

    async fn update_group(&self, id: &str, opts: &UpdateOpts) -> Result<()> {
        let mut builder: QueryBuilder<MySql> =
            QueryBuilder::new("UPDATE `course_group` SET ");
        let mut changed = false;
        let mut set = builder.separated(" , ");
        if let Some(v) = &opts.name {
            set.push("`name` = ").push_bind_unseparated(v.clone());
            changed = true;
        }
        if let Some(v) = &opts.schedule {
            set.push("`schedule` = ").push_bind_unseparated(v.clone());
            changed = true;
        }
        if let Some(v) = &opts.enrollment_key {
            set.push("`enrollment_key` = ").push_bind_unseparated(v.clone());
            changed = true;
        }
        if let Some(v) = opts.max_students {
            set.push("`max_students` = ").push_bind_unseparated(v);
            changed = true;
        }
        if let Some(v) = opts.enrollment_start_date {
            set.push("`enrollment_start_date` = ")
                .push_bind_unseparated(v);
            changed = true;
        }
        if let Some(v) = opts.enrollment_end_date {
            set.push("`enrollment_end_date` = ").push_bind_unseparated(v);
            changed = true;
        }
        if let Some(v) = opts.is_enrollment_open {
            set.push("`is_enrollment_open` = ").push_bind_unseparated(v);
            changed = true;
        }
        if let Some(v) = opts.is_active {
            set.push("`is_active` = ").push_bind_unseparated(v);
            changed = true;
        }
        drop(set);
        if !changed {
            return Ok(());
        }
        builder
            .push(" WHERE `id` = ")
            .push_bind(parse_id(id)?)
            .push(" AND `deleted` = 0");
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    errors::conflict("enrollment key is already in use")
                }
                err => errors::any(err),
            })?;
        debug!("updated group {}, {} rows", id, result.rows_affected());
        Ok(())
    }

    async fn get_group(&self, id: &str) -> Result<Group> {
        let group = match parse_id(id) {
            Ok(id) => self.select_group("`id` = ?", Bind::Id(id)).await?,
            Err(_) => None,
        };
        group.ok_or_else(|| errors::not_found("group not found"))
    }

    async fn delete_group(&self, id: &str) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE `course_group` SET `deleted` = `id`,`deleted_at` = now()
            WHERE `id` = ? AND `deleted` = 0;"#,
        )
        .bind(parse_id(id)?)
        .execute(&self.pool)
        .await
        .map_err(errors::any)?;
        if result.rows_affected() == 0 {
            return Err(errors::not_found("group not found"));
        }
        Ok(())
    }

    async fn list_group(&self, opts: &ListOpts) -> Result<List<Group>> {
        let mut wheres = String::new();
        and_where(
            &mut wheres,
            &format!("`course_id` = {}", parse_id(&opts.course_id)?),
        );
        and_where(&mut wheres, "`deleted` = 0");

        let mut output = List::default();
        if !opts.pagination.count_disable {
            let row = sqlx::query(&format!(
                r#"SELECT COUNT(*) as count FROM `course_group` WHERE {};"#,
                wheres
            ))
            .fetch_one(&self.pool)
            .await
            .map_err(errors::any)?;
            output.total = row.try_get("count").map_err(errors::any)?;
        }

        opts.pagination.convert(&mut wheres);
        output.limit = opts.pagination.limit;
        output.offset = opts.pagination.offset;

        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM `course_group` WHERE {};"#,
            COLUMNS, wheres
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(errors::any)?;
        output.data = rows
            .iter()
            .map(group_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(output)
    }

    async fn assign_instructor(
        &self,
        id: &str,
        instructor_id: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE `course_group` SET `instructor_id` = ?
            WHERE `id` = ? AND `deleted` = 0;"#,
        )
        .bind(parse_option_id(&instructor_id)?)
        .bind(parse_id(id)?)
        .execute(&self.pool)
        .await
        .map_err(errors::any)?;
        Ok(())
    }

    async fn set_enrollment_key(&self, id: &str, key: &str) -> Result<()> {
        sqlx::query(
            r#"UPDATE `course_group` SET `enrollment_key` = ?
            WHERE `id` = ? AND `deleted` = 0;"#,
        )
        .bind(key)
        .bind(parse_id(id)?)
        .execute(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                errors::conflict("enrollment key is already in use")
            }
            err => errors::any(err),
        })?;
        Ok(())
    }

    async fn find_group_by_id(&self, id: &str) -> Result<Option<Roster>> {
        // a non-numeric id names no group
        let Ok(id) = parse_id(id) else {
            return Ok(None);
        };
        let group = self.select_group("`id` = ?", Bind::Id(id)).await?;
        self.attach(group).await
    }

    async fn find_group_by_enrollment_key(
        &self,
        key: &str,
    ) -> Result<Option<Roster>> {
        let group = self
            .select_group("`enrollment_key` = ?", Bind::Key(key))
            .await?;
        self.attach(group).await
    }
}

fn group_from_row(row: &MySqlRow) -> Result<Group> {
    Ok(Group {
        id: row
            .try_get::<u64, _>("id")
            .map_err(errors::any)?
            .to_string(),
        course_id: row
            .try_get::<u64, _>("course_id")
            .map_err(errors::any)?
            .to_string(),
        name: row.try_get("name").map_err(errors::any)?,
        schedule: row.try_get("schedule").map_err(errors::any)?,
        instructor_id: row
            .try_get::<Option<u64>, _>("instructor_id")
            .map_err(errors::any)?
            .map(|v| v.to_string()),
        is_active: row.try_get("is_active").map_err(errors::any)?,
        enrollment_key: row.try_get("enrollment_key").map_err(errors::any)?,
        max_students: row.try_get("max_students").map_err(errors::any)?,
        enrollment_start_date: row
            .try_get("enrollment_start_date")
            .map_err(errors::any)?,
        enrollment_end_date: row
            .try_get("enrollment_end_date")
            .map_err(errors::any)?,
        is_enrollment_open: row
            .try_get("is_enrollment_open")
            .map_err(errors::any)?,
        created_at: row.try_get("created_at").map_err(errors::any)?,
        updated_at: row.try_get("updated_at").map_err(errors::any)?,
    })
}
