use axum::{
    extract::Path,
    routing::{delete, get, patch, post},
    Json, Router,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use lms_rbac::Permission;
use lms_slo::Result;
use lms_storage::{
    enrollments::Enrollment,
    groups::{Content, Group, ListOpts, UpdateOpts},
    List, ID,
};

use crate::{
    auth::Auth,
    services::groups::{self, GROUP_AUTHORS, GROUP_MANAGERS},
    valid::Valid,
    AppState,
};

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/editions/:edition_id/groups",
            get(list_group).post(create_group),
        )
        .route(
            "/editions/:edition_id/groups/:group_id",
            get(get_group).patch(update_group).delete(delete_group),
        )
        .route(
            "/editions/:edition_id/groups/:group_id/instructor",
            patch(assign_instructor),
        )
        .route(
            "/editions/:edition_id/groups/:group_id/enrollment-key",
            post(regenerate_key),
        )
        .route(
            "/editions/:edition_id/groups/:group_id/enroll",
            post(enroll_students),
        )
        .route(
            "/editions/:edition_id/groups/:group_id/enroll/:user_id",
            delete(remove_enrollment),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InstructorContent {
    #[validate(length(min = 1))]
    pub instructor_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnrollmentKey {
    pub enrollment_key: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EnrollStudents {
    #[validate(length(min = 1, max = 500))]
    pub user_ids: Vec<String>,
}

async fn list_group(
    auth: Auth,
    app: AppState,
    Path(edition_id): Path<String>,
    Valid(mut opts): Valid<ListOpts>,
) -> Result<Json<List<Group>>> {
    auth.authorize(GROUP_MANAGERS, &[Permission::ManageGroups])?;
    opts.course_id = edition_id;
    let list =
        groups::list_groups(&app.store.course, &app.store.group, &opts)
            .await?;
    Ok(list.into())
}

async fn get_group(
    auth: Auth,
    app: AppState,
    Path((edition_id, group_id)): Path<(String, String)>,
) -> Result<Json<Group>> {
    auth.authorize(GROUP_MANAGERS, &[Permission::ManageGroups])?;
    let group =
        groups::get_edition_group(&app.store.group, &edition_id, &group_id)
            .await?;
    Ok(group.into())
}

async fn create_group(
    auth: Auth,
    app: AppState,
    Path(edition_id): Path<String>,
    Valid(Json(input)): Valid<Json<Content>>,
) -> Result<(StatusCode, Json<ID>)> {
    auth.authorize(GROUP_AUTHORS, &[Permission::ManageGroups])?;
    let id = groups::create_group(
        &app.store.course,
        &app.store.group,
        &edition_id,
        &input,
    )
    .await?;
    Ok((StatusCode::CREATED, id.into()))
}

async fn update_group(
    auth: Auth,
    app: AppState,
    Path((edition_id, group_id)): Path<(String, String)>,
    Valid(Json(input)): Valid<Json<UpdateOpts>>,
) -> Result<StatusCode> {
    groups::update_group(
        &app.store.group,
        &auth.user,
        &edition_id,
        &group_id,
        &input,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_group(
    auth: Auth,
    app: AppState,
    Path((edition_id, group_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    auth.authorize(GROUP_AUTHORS, &[Permission::ManageGroups])?;
    groups::delete_group(&app.store.group, &edition_id, &group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_instructor(
    auth: Auth,
    app: AppState,
    Path((edition_id, group_id)): Path<(String, String)>,
    Valid(Json(input)): Valid<Json<InstructorContent>>,
) -> Result<StatusCode> {
    auth.authorize(GROUP_MANAGERS, &[Permission::AssignInstructors])?;
    groups::assign_instructor(
        &app.store.group,
        &app.store.user,
        &edition_id,
        &group_id,
        input.instructor_id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn regenerate_key(
    auth: Auth,
    app: AppState,
    Path((edition_id, group_id)): Path<(String, String)>,
) -> Result<Json<EnrollmentKey>> {
    let enrollment_key = groups::regenerate_enrollment_key(
        &app.store.group,
        &auth.user,
        &edition_id,
        &group_id,
    )
    .await?;
    Ok(EnrollmentKey { enrollment_key }.into())
}

async fn enroll_students(
    auth: Auth,
    app: AppState,
    Path((edition_id, group_id)): Path<(String, String)>,
    Valid(Json(input)): Valid<Json<EnrollStudents>>,
) -> Result<(StatusCode, Json<Vec<Enrollment>>)> {
    auth.authorize(GROUP_MANAGERS, &[Permission::EnrollStudents])?;
    let enrolled = groups::enroll_students(
        &app.store.group,
        &app.store.enrollment,
        &app.clock,
        &edition_id,
        &group_id,
        &input.user_ids,
    )
    .await?;
    Ok((StatusCode::CREATED, enrolled.into()))
}

async fn remove_enrollment(
    auth: Auth,
    app: AppState,
    Path((edition_id, group_id, user_id)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    auth.authorize(GROUP_MANAGERS, &[Permission::EnrollStudents])?;
    groups::remove_enrollment(
        &app.store.group,
        &app.store.enrollment,
        &edition_id,
        &group_id,
        &user_id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
