use std::{ops::Deref, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sqlx::MySqlPool;
use tracing::info;

use lms_slo::errors;
use lms_storage::{
    courses::mariadb::CourseImpl, enrollments::mariadb::EnrollmentImpl,
    groups::mariadb::GroupImpl, users::mariadb::UserImpl,
};

use crate::{services::clock::SystemClock, AppConfig};

pub struct App {
    pub config: AppConfig,
    pub store: Store,
    pub clock: SystemClock,
}

impl App {
    pub fn new(pool: MySqlPool, config: AppConfig) -> Result<Self> {
        info!("initializing stores...");
        let store = Store::new(pool);
        Ok(Self {
            config,
            store,
            clock: SystemClock,
        })
    }
}

pub struct Store {
    pub user: UserImpl,
    pub course: CourseImpl,
    pub group: GroupImpl,
    pub enrollment: EnrollmentImpl,
}

impl Store {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            user: UserImpl::new(pool.clone()),
            course: CourseImpl::new(pool.clone()),
            group: GroupImpl::new(pool.clone()),
            enrollment: EnrollmentImpl::new(pool),
        }
    }
}

#[derive(Clone)]
pub struct AppState(pub Arc<App>);

// deref so you can still access the inner fields easily
impl Deref for AppState {
    type Target = App;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AppState
where
    Self: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = errors::WithBacktrace;
    async fn from_request_parts(
        _: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_ref(state))
    }
}
