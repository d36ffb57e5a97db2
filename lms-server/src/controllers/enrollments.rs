use axum::{
    routing::{get, post},
    Json, Router,
};
use http::StatusCode;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use lms_slo::{errors::ErrorCode, Result};
use lms_storage::enrollments::Enrollment;

use crate::{
    auth::Auth, services::enrollment, valid::Valid,
    var::ENROLLMENT_ADMISSIONS_TOTAL, AppState,
};

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/enrollments/enroll", post(enroll))
        .route("/enrollments/enroll-with-code", post(enroll_with_code))
        .route("/enrollments/my-enrollments", get(my_enrollments))
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EnrollContent {
    #[validate(length(min = 1))]
    pub group_id: String,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub enrollment_key: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CodeContent {
    #[validate(length(min = 1, max = 50))]
    pub enrollment_key: String,
}

async fn enroll(
    auth: Auth,
    app: AppState,
    Valid(Json(input)): Valid<Json<EnrollContent>>,
) -> Result<(StatusCode, Json<Enrollment>)> {
    let result = enrollment::enroll_with_key(
        &app.store.group,
        &app.store.enrollment,
        &app.clock,
        &auth.user.id,
        &input.group_id,
        &input.enrollment_key,
    )
    .await;
    admitted("key", result)
}

async fn enroll_with_code(
    auth: Auth,
    app: AppState,
    Valid(Json(input)): Valid<Json<CodeContent>>,
) -> Result<(StatusCode, Json<Enrollment>)> {
    let result = enrollment::enroll_with_code(
        &app.store.group,
        &app.store.enrollment,
        &app.clock,
        &auth.user.id,
        &input.enrollment_key,
    )
    .await;
    admitted("code", result)
}

fn admitted(
    entry: &str,
    result: Result<Enrollment>,
) -> Result<(StatusCode, Json<Enrollment>)> {
    let outcome = match &result {
        Ok(_) => "admitted",
        Err(err) => err.code().code().1,
    };
    ENROLLMENT_ADMISSIONS_TOTAL
        .with_label_values(&[entry, outcome])
        .inc();
    Ok((StatusCode::CREATED, result?.into()))
}

async fn my_enrollments(
    auth: Auth,
    app: AppState,
) -> Result<Json<Vec<Enrollment>>> {
    let list =
        enrollment::my_enrollments(&app.store.enrollment, &auth.user.id)
            .await?;
    Ok(list.into())
}
