//! Repository interface between the core services and persistence.
//!
//! The services only ever talk to [`Store`]. Two implementations ship:
//! [`sea::SeaStore`] over a sea-orm connection, and [`memory::MemoryStore`]
//! for tests and embedding. Both enforce the same constraints: unique names,
//! unique association pairs, unique `jti`, and existing foreign keys (except
//! for the historical `user_id` on revocations).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DbErr, SqlErr};
use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use crate::models::{
    endpoint_permission, permission, revoked_token, role, role_permission, user, user_role,
};

pub mod memory;
pub mod sea;

pub use memory::MemoryStore;
pub use sea::SeaStore;

pub type User = user::Model;
pub type Role = role::Model;
pub type Permission = permission::Model;
pub type UserRole = user_role::Model;
pub type RolePermission = role_permission::Model;
pub type EndpointPermission = endpoint_permission::Model;
pub type RevokedToken = revoked_token::Model;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// The write referenced a row that does not exist.
    #[error("referenced row missing: {0}")]
    MissingReference(String),

    #[error("database error: {0}")]
    Database(DbErr),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                StoreError::MissingReference(detail)
            }
            _ => StoreError::Database(err),
        }
    }
}

/// A user row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
}

/// Column changes for an existing user. `None` leaves the column alone.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
}

/// A revocation about to be recorded.
#[derive(Debug, Clone)]
pub struct NewRevocation {
    pub jti: String,
    pub token_type: String,
    pub user_id: i32,
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Mutable fields of a role.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RoleUpdate {
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

/// Mutable fields of a permission.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PermissionUpdate {
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

/// Mutable fields of an endpoint mapping.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EndpointUpdate {
    #[validate(length(min = 1, max = 100))]
    pub endpoint_name: Option<String>,
    pub permission_id: Option<i32>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user; `Conflict` if the username or email is taken.
    async fn insert_user(&self, new: NewUser, now: DateTime<Utc>) -> Result<User, StoreError>;

    async fn user_by_id(&self, id: i32) -> Result<Option<User>, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn update_user(
        &self,
        id: i32,
        changes: UserChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// Delete a user together with its role assignments. Revocation rows are
    /// kept until their tokens expire.
    async fn delete_user(&self, id: i32) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record a revocation; `Conflict` if the jti is already recorded.
    /// `user_id` is not checked against existing users.
    async fn insert_revocation(&self, new: NewRevocation) -> Result<RevokedToken, StoreError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError>;

    /// Delete revocations whose token expired before `cutoff`.
    async fn purge_revocations(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait RbacStore: Send + Sync {
    // ═══ Roles ═══

    async fn insert_role(
        &self,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Role, StoreError>;

    async fn role_by_id(&self, id: i32) -> Result<Option<Role>, StoreError>;

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    async fn update_role(
        &self,
        id: i32,
        update: RoleUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Role>, StoreError>;

    /// Delete a role and every association that mentions it.
    async fn delete_role(&self, id: i32) -> Result<bool, StoreError>;

    // ═══ Permissions ═══

    async fn insert_permission(
        &self,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Permission, StoreError>;

    async fn permission_by_id(&self, id: i32) -> Result<Option<Permission>, StoreError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError>;

    async fn update_permission(
        &self,
        id: i32,
        update: PermissionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Permission>, StoreError>;

    /// Delete a permission and its role grants. `Conflict` while an endpoint
    /// mapping still requires it.
    async fn delete_permission(&self, id: i32) -> Result<bool, StoreError>;

    // ═══ Associations ═══

    async fn insert_user_role(
        &self,
        user_id: i32,
        role_id: i32,
        now: DateTime<Utc>,
    ) -> Result<UserRole, StoreError>;

    async fn delete_user_role(&self, user_id: i32, role_id: i32) -> Result<bool, StoreError>;

    async fn list_user_roles(&self) -> Result<Vec<UserRole>, StoreError>;

    async fn roles_for_user(&self, user_id: i32) -> Result<Vec<Role>, StoreError>;

    async fn insert_role_permission(
        &self,
        role_id: i32,
        permission_id: i32,
        now: DateTime<Utc>,
    ) -> Result<RolePermission, StoreError>;

    async fn delete_role_permission(
        &self,
        role_id: i32,
        permission_id: i32,
    ) -> Result<bool, StoreError>;

    async fn list_role_permissions(&self) -> Result<Vec<RolePermission>, StoreError>;

    async fn permissions_for_role(&self, role_id: i32) -> Result<Vec<Permission>, StoreError>;

    /// Every permission reachable from the user through its roles.
    async fn effective_permissions(&self, user_id: i32) -> Result<Vec<Permission>, StoreError>;

    // ═══ Endpoint mappings ═══

    async fn insert_endpoint(
        &self,
        endpoint_name: &str,
        permission_id: i32,
        now: DateTime<Utc>,
    ) -> Result<EndpointPermission, StoreError>;

    async fn endpoint_by_id(&self, id: i32) -> Result<Option<EndpointPermission>, StoreError>;

    async fn endpoint_by_name(
        &self,
        endpoint_name: &str,
    ) -> Result<Option<EndpointPermission>, StoreError>;

    async fn list_endpoints(&self) -> Result<Vec<EndpointPermission>, StoreError>;

    async fn update_endpoint(
        &self,
        id: i32,
        update: EndpointUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<EndpointPermission>, StoreError>;

    async fn delete_endpoint(&self, id: i32) -> Result<bool, StoreError>;
}

/// Everything the services need from persistence.
pub trait Store: CredentialStore + RevocationStore + RbacStore {}

impl<T> Store for T where T: CredentialStore + RevocationStore + RbacStore {}

pub type SharedStore = Arc<dyn Store>;
