use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use lms_rbac::{Mode, Permission, Role};
use lms_slo::{errors, Result};

use crate::{auth::Auth, valid::Valid, AppState};

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/permissions/me", get(my_permissions))
        .route("/permissions/check", get(check_permissions))
        .with_state(state)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Grants {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckParams {
    /// Comma separated permission tokens.
    #[validate(length(max = 2048))]
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Allowed {
    pub allowed: bool,
}

async fn my_permissions(auth: Auth) -> Json<Grants> {
    let role = auth.user.role;
    Grants {
        role,
        permissions: lms_rbac::permissions_of(role).to_vec(),
    }
    .into()
}

async fn check_permissions(
    auth: Auth,
    Valid(params): Valid<CheckParams>,
) -> Result<Json<Allowed>> {
    let permissions = parse_permissions(&params.permissions)?;
    let allowed = lms_rbac::check(Some(&auth.user), &permissions, params.mode);
    Ok(Allowed { allowed }.into())
}

fn parse_permissions(list: &str) -> Result<Vec<Permission>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|err| errors::bad_request(&err)))
        .collect()
}
