use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};

use super::{
    CredentialStore, EndpointPermission, EndpointUpdate, NewRevocation, NewUser, Permission,
    PermissionUpdate, RbacStore, RevocationStore, RevokedToken, Role, RolePermission, RoleUpdate,
    StoreError, User, UserChanges, UserRole,
};
use crate::models::{
    endpoint_permission, permission, revoked_token, role, role_permission, user, user_role,
};

/// [`super::Store`] backed by a sea-orm connection (SQLite or PostgreSQL).
///
/// Multi-row deletes run in a transaction and remove dependent rows
/// explicitly, so cascades hold even where the backend does not enforce
/// foreign keys.
#[derive(Clone)]
pub struct SeaStore {
    db: DatabaseConnection,
}

impl SeaStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl CredentialStore for SeaStore {
    async fn insert_user(&self, new: NewUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        let model = user::ActiveModel {
            username: Set(new.username),
            email: Set(new.email),
            password_hash: Set(new.password_hash),
            is_active: Set(new.is_active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn user_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(user::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(user::Entity::find()
            .order_by_asc(user::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn update_user(
        &self,
        id: i32,
        changes: UserChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let Some(existing) = user::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut active: user::ActiveModel = existing.into();
        if let Some(username) = changes.username {
            active.username = Set(username);
        }
        if let Some(email) = changes.email {
            active.email = Set(email);
        }
        if let Some(password_hash) = changes.password_hash {
            active.password_hash = Set(password_hash);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(now);

        Ok(Some(active.update(&self.db).await?))
    }

    async fn delete_user(&self, id: i32) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        let res = user::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(res.rows_affected > 0)
    }
}

#[async_trait]
impl RevocationStore for SeaStore {
    async fn insert_revocation(&self, new: NewRevocation) -> Result<RevokedToken, StoreError> {
        let model = revoked_token::ActiveModel {
            jti: Set(new.jti),
            token_type: Set(new.token_type),
            user_id: Set(new.user_id),
            revoked_at: Set(new.revoked_at),
            expires_at: Set(new.expires_at),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        let found = revoked_token::Entity::find()
            .filter(revoked_token::Column::Jti.eq(jti))
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn purge_revocations(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = revoked_token::Entity::delete_many()
            .filter(revoked_token::Column::ExpiresAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }
}

#[async_trait]
impl RbacStore for SeaStore {
    // ═══ Roles ═══

    async fn insert_role(
        &self,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Role, StoreError> {
        let model = role::ActiveModel {
            name: Set(name.to_string()),
            description: Set(description.map(str::to_string)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn role_by_id(&self, id: i32) -> Result<Option<Role>, StoreError> {
        Ok(role::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        Ok(role::Entity::find()
            .order_by_asc(role::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn update_role(
        &self,
        id: i32,
        update: RoleUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Role>, StoreError> {
        let Some(existing) = role::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut active: role::ActiveModel = existing.into();
        if let Some(name) = update.name {
            active.name = Set(name);
        }
        if let Some(description) = update.description {
            active.description = Set(Some(description));
        }
        active.updated_at = Set(now);

        Ok(Some(active.update(&self.db).await?))
    }

    async fn delete_role(&self, id: i32) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        user_role::Entity::delete_many()
            .filter(user_role::Column::RoleId.eq(id))
            .exec(&txn)
            .await?;
        role_permission::Entity::delete_many()
            .filter(role_permission::Column::RoleId.eq(id))
            .exec(&txn)
            .await?;
        let res = role::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(res.rows_affected > 0)
    }

    // ═══ Permissions ═══

    async fn insert_permission(
        &self,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Permission, StoreError> {
        let model = permission::ActiveModel {
            name: Set(name.to_string()),
            description: Set(description.map(str::to_string)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn permission_by_id(&self, id: i32) -> Result<Option<Permission>, StoreError> {
        Ok(permission::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        Ok(permission::Entity::find()
            .order_by_asc(permission::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn update_permission(
        &self,
        id: i32,
        update: PermissionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Permission>, StoreError> {
        let Some(existing) = permission::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut active: permission::ActiveModel = existing.into();
        if let Some(name) = update.name {
            active.name = Set(name);
        }
        if let Some(description) = update.description {
            active.description = Set(Some(description));
        }
        active.updated_at = Set(now);

        Ok(Some(active.update(&self.db).await?))
    }

    async fn delete_permission(&self, id: i32) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        let mapped = endpoint_permission::Entity::find()
            .filter(endpoint_permission::Column::PermissionId.eq(id))
            .one(&txn)
            .await?;
        if let Some(endpoint) = mapped {
            // dropping txn rolls back
            return Err(StoreError::Conflict(format!(
                "permission {} is required by endpoint '{}'",
                id, endpoint.endpoint_name
            )));
        }

        role_permission::Entity::delete_many()
            .filter(role_permission::Column::PermissionId.eq(id))
            .exec(&txn)
            .await?;
        let res = permission::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(res.rows_affected > 0)
    }

    // ═══ Associations ═══

    async fn insert_user_role(
        &self,
        user_id: i32,
        role_id: i32,
        now: DateTime<Utc>,
    ) -> Result<UserRole, StoreError> {
        let model = user_role::ActiveModel {
            user_id: Set(user_id),
            role_id: Set(role_id),
            created_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn delete_user_role(&self, user_id: i32, role_id: i32) -> Result<bool, StoreError> {
        let res = user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(user_id))
            .filter(user_role::Column::RoleId.eq(role_id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn list_user_roles(&self) -> Result<Vec<UserRole>, StoreError> {
        Ok(user_role::Entity::find()
            .order_by_asc(user_role::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn roles_for_user(&self, user_id: i32) -> Result<Vec<Role>, StoreError> {
        Ok(role::Entity::find()
            .join(JoinType::InnerJoin, role::Relation::UserRoles.def())
            .filter(user_role::Column::UserId.eq(user_id))
            .order_by_asc(role::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn insert_role_permission(
        &self,
        role_id: i32,
        permission_id: i32,
        now: DateTime<Utc>,
    ) -> Result<RolePermission, StoreError> {
        let model = role_permission::ActiveModel {
            role_id: Set(role_id),
            permission_id: Set(permission_id),
            created_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn delete_role_permission(
        &self,
        role_id: i32,
        permission_id: i32,
    ) -> Result<bool, StoreError> {
        let res = role_permission::Entity::delete_many()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .filter(role_permission::Column::PermissionId.eq(permission_id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn list_role_permissions(&self) -> Result<Vec<RolePermission>, StoreError> {
        Ok(role_permission::Entity::find()
            .order_by_asc(role_permission::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn permissions_for_role(&self, role_id: i32) -> Result<Vec<Permission>, StoreError> {
        Ok(permission::Entity::find()
            .join(JoinType::InnerJoin, permission::Relation::RolePermissions.def())
            .filter(role_permission::Column::RoleId.eq(role_id))
            .order_by_asc(permission::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn effective_permissions(&self, user_id: i32) -> Result<Vec<Permission>, StoreError> {
        // permissions ⋈ role_permissions ⋈ roles ⋈ user_roles
        Ok(permission::Entity::find()
            .join(JoinType::InnerJoin, permission::Relation::RolePermissions.def())
            .join(JoinType::InnerJoin, role_permission::Relation::Role.def())
            .join(JoinType::InnerJoin, role::Relation::UserRoles.def())
            .filter(user_role::Column::UserId.eq(user_id))
            .distinct()
            .order_by_asc(permission::Column::Id)
            .all(&self.db)
            .await?)
    }

    // ═══ Endpoint mappings ═══

    async fn insert_endpoint(
        &self,
        endpoint_name: &str,
        permission_id: i32,
        now: DateTime<Utc>,
    ) -> Result<EndpointPermission, StoreError> {
        let model = endpoint_permission::ActiveModel {
            endpoint_name: Set(endpoint_name.to_string()),
            permission_id: Set(permission_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn endpoint_by_id(&self, id: i32) -> Result<Option<EndpointPermission>, StoreError> {
        Ok(endpoint_permission::Entity::find_by_id(id)
            .one(&self.db)
            .await?)
    }

    async fn endpoint_by_name(
        &self,
        endpoint_name: &str,
    ) -> Result<Option<EndpointPermission>, StoreError> {
        Ok(endpoint_permission::Entity::find()
            .filter(endpoint_permission::Column::EndpointName.eq(endpoint_name))
            .one(&self.db)
            .await?)
    }

    async fn list_endpoints(&self) -> Result<Vec<EndpointPermission>, StoreError> {
        Ok(endpoint_permission::Entity::find()
            .order_by_asc(endpoint_permission::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn update_endpoint(
        &self,
        id: i32,
        update: EndpointUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<EndpointPermission>, StoreError> {
        let Some(existing) = endpoint_permission::Entity::find_by_id(id)
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let mut active: endpoint_permission::ActiveModel = existing.into();
        if let Some(endpoint_name) = update.endpoint_name {
            active.endpoint_name = Set(endpoint_name);
        }
        if let Some(permission_id) = update.permission_id {
            active.permission_id = Set(permission_id);
        }
        active.updated_at = Set(now);

        Ok(Some(active.update(&self.db).await?))
    }

    async fn delete_endpoint(&self, id: i32) -> Result<bool, StoreError> {
        let res = endpoint_permission::Entity::delete_by_id(id)
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }
}
