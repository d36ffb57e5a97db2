use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use http::request::Parts;
use tracing::debug;

use lms_rbac::{Permission, Role};
use lms_slo::{
    errors::{self, Code, WithBacktrace},
    Result,
};
use lms_storage::users::{User, UserStore};

use crate::AppState;

// TODO: replace with bearer token verification once an issuer is deployed
pub const USER_ID_HEADER: &str = "X-User-ID";

/// The authenticated, active principal of a request.
#[derive(Debug)]
pub struct Auth {
    pub user: User,
}

#[async_trait]
impl<S> FromRequestParts<S> for Auth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WithBacktrace;
    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(errors::unauthorized)?;
        let user = load_principal(&app.store.user, user_id).await?;
        Ok(Self { user })
    }
}

pub async fn load_principal<U>(users: &U, id: &str) -> Result<User>
where
    U: UserStore + Sync,
{
    let user = match users.get_user(id).await {
        Ok(user) => user,
        Err(err) => {
            let unknown = matches!(
                err.code(),
                Code::NotFound(_) | Code::BadRequest(_)
            );
            if unknown {
                debug!("unknown principal {}", id);
                return Err(errors::unauthorized());
            }
            return Err(err);
        }
    };
    if !user.is_active {
        return Err(errors::forbidden("the user account is deactivated"));
    }
    Ok(user)
}

impl Auth {
    /// An empty `roles` list admits every role. All `permissions` are needed.
    pub fn authorize(
        &self,
        roles: &[Role],
        permissions: &[Permission],
    ) -> Result<()> {
        lms_rbac::authorize(&self.user, roles, permissions)
            .map_err(|err| errors::forbidden(&err))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use lms_storage::users::MockUserStore;

    use super::*;

    fn user(role: Role, is_active: bool) -> User {
        let now = Utc::now().naive_utc();
        User {
            id: "7".to_owned(),
            name: "lee".to_owned(),
            email: "lee@example.com".to_owned(),
            role,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn active_principal() {
        let mut users = MockUserStore::new();
        users
            .expect_get_user()
            .returning(|_| Ok(user(Role::Student, true)));
        let got = load_principal(&users, "7").await.unwrap();
        assert_eq!(got.role, Role::Student);
    }

    #[tokio::test]
    async fn unknown_principal_is_unauthorized() {
        let mut users = MockUserStore::new();
        users
            .expect_get_user()
            .returning(|_| Err(errors::not_found("user not found")));
        let err = load_principal(&users, "7").await.unwrap_err();
        assert_eq!(err, errors::unauthorized());
    }

    #[tokio::test]
    async fn inactive_principal_is_forbidden() {
        let mut users = MockUserStore::new();
        users
            .expect_get_user()
            .returning(|_| Ok(user(Role::Admin, false)));
        let err = load_principal(&users, "7").await.unwrap_err();
        assert_eq!(err, errors::forbidden(""));
    }

    #[test]
    fn authorize_guard() {
        let auth = Auth {
            user: user(Role::TeacherExecutor, true),
        };
        assert!(auth
            .authorize(&[], &[Permission::EnrollStudents])
            .is_ok());
        assert_eq!(
            auth.authorize(&[Role::Admin, Role::TeacherEditor], &[])
                .unwrap_err(),
            errors::forbidden("")
        );
        assert_eq!(
            auth.authorize(&[], &[Permission::EditCourse]).unwrap_err(),
            errors::forbidden("")
        );
    }
}
