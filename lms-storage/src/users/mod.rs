pub mod mariadb;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockall::automock;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use lms_rbac::{Role, Subject};
use lms_slo::Result;

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Subject for User {
    fn role(&self) -> Role {
        self.role
    }

    fn is_active(&self) -> bool {
        self.is_active
    }
}

#[automock]
#[async_trait]
pub trait UserStore {
    async fn get_user(&self, id: &str) -> Result<User>;
}
