use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    CredentialStore, EndpointPermission, EndpointUpdate, NewRevocation, NewUser, Permission,
    PermissionUpdate, RbacStore, RevocationStore, RevokedToken, Role, RolePermission, RoleUpdate,
    StoreError, User, UserChanges, UserRole,
};

#[derive(Default)]
struct Tables {
    next_id: i32,
    users: BTreeMap<i32, User>,
    roles: BTreeMap<i32, Role>,
    permissions: BTreeMap<i32, Permission>,
    user_roles: BTreeMap<i32, UserRole>,
    role_permissions: BTreeMap<i32, RolePermission>,
    endpoints: BTreeMap<i32, EndpointPermission>,
    revoked: BTreeMap<i32, RevokedToken>,
}

impl Tables {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_user(&self, id: i32) -> Result<(), StoreError> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::MissingReference(format!("user {id}")))
        }
    }

    fn ensure_role(&self, id: i32) -> Result<(), StoreError> {
        if self.roles.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::MissingReference(format!("role {id}")))
        }
    }

    fn ensure_permission(&self, id: i32) -> Result<(), StoreError> {
        if self.permissions.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::MissingReference(format!("permission {id}")))
        }
    }

    fn check_user_unique(
        &self,
        except: Option<i32>,
        username: &str,
        email: &str,
    ) -> Result<(), StoreError> {
        for user in self.users.values().filter(|u| Some(u.id) != except) {
            if user.username == username {
                return Err(StoreError::Conflict("users.username".to_string()));
            }
            if user.email == email {
                return Err(StoreError::Conflict("users.email".to_string()));
            }
        }
        Ok(())
    }

    fn role_name_taken(&self, except: Option<i32>, name: &str) -> bool {
        self.roles
            .values()
            .any(|r| Some(r.id) != except && r.name == name)
    }

    fn permission_name_taken(&self, except: Option<i32>, name: &str) -> bool {
        self.permissions
            .values()
            .any(|p| Some(p.id) != except && p.name == name)
    }

    fn endpoint_name_taken(&self, except: Option<i32>, name: &str) -> bool {
        self.endpoints
            .values()
            .any(|e| Some(e.id) != except && e.endpoint_name == name)
    }
}

/// In-process [`super::Store`] with the same constraint behaviour as the
/// database schema. Ids come from one shared counter, so they are unique
/// across tables as well as within them.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, new: NewUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        t.check_user_unique(None, &new.username, &new.email)?;

        let id = t.allocate_id();
        let user = User {
            id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn update_user(
        &self,
        id: i32,
        changes: UserChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(existing) = t.users.get(&id).cloned() else {
            return Ok(None);
        };

        let mut updated = existing;
        if let Some(username) = changes.username {
            updated.username = username;
        }
        if let Some(email) = changes.email {
            updated.email = email;
        }
        if let Some(password_hash) = changes.password_hash {
            updated.password_hash = password_hash;
        }
        if let Some(is_active) = changes.is_active {
            updated.is_active = is_active;
        }
        t.check_user_unique(Some(id), &updated.username, &updated.email)?;
        updated.updated_at = now;

        t.users.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_user(&self, id: i32) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.remove(&id).is_none() {
            return Ok(false);
        }
        t.user_roles.retain(|_, ur| ur.user_id != id);
        Ok(true)
    }
}

#[async_trait]
impl RevocationStore for MemoryStore {
    async fn insert_revocation(&self, new: NewRevocation) -> Result<RevokedToken, StoreError> {
        let mut t = self.tables.write().await;
        if t.revoked.values().any(|r| r.jti == new.jti) {
            return Err(StoreError::Conflict("revoked_tokens.jti".to_string()));
        }

        let id = t.allocate_id();
        let row = RevokedToken {
            id,
            jti: new.jti,
            token_type: new.token_type,
            user_id: new.user_id,
            revoked_at: new.revoked_at,
            expires_at: new.expires_at,
        };
        t.revoked.insert(id, row.clone());
        Ok(row)
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        let t = self.tables.read().await;
        Ok(t.revoked.values().any(|r| r.jti == jti))
    }

    async fn purge_revocations(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.revoked.len();
        t.revoked.retain(|_, r| r.expires_at >= cutoff);
        Ok((before - t.revoked.len()) as u64)
    }
}

#[async_trait]
impl RbacStore for MemoryStore {
    async fn insert_role(
        &self,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Role, StoreError> {
        let mut t = self.tables.write().await;
        if t.role_name_taken(None, name) {
            return Err(StoreError::Conflict("roles.name".to_string()));
        }

        let id = t.allocate_id();
        let role = Role {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        t.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn role_by_id(&self, id: i32) -> Result<Option<Role>, StoreError> {
        Ok(self.tables.read().await.roles.get(&id).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        Ok(self.tables.read().await.roles.values().cloned().collect())
    }

    async fn update_role(
        &self,
        id: i32,
        update: RoleUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Role>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(mut role) = t.roles.get(&id).cloned() else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            if t.role_name_taken(Some(id), &name) {
                return Err(StoreError::Conflict("roles.name".to_string()));
            }
            role.name = name;
        }
        if let Some(description) = update.description {
            role.description = Some(description);
        }
        role.updated_at = now;

        t.roles.insert(id, role.clone());
        Ok(Some(role))
    }

    async fn delete_role(&self, id: i32) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        if t.roles.remove(&id).is_none() {
            return Ok(false);
        }
        t.user_roles.retain(|_, ur| ur.role_id != id);
        t.role_permissions.retain(|_, rp| rp.role_id != id);
        Ok(true)
    }

    async fn insert_permission(
        &self,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Permission, StoreError> {
        let mut t = self.tables.write().await;
        if t.permission_name_taken(None, name) {
            return Err(StoreError::Conflict("permissions.name".to_string()));
        }

        let id = t.allocate_id();
        let permission = Permission {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        t.permissions.insert(id, permission.clone());
        Ok(permission)
    }

    async fn permission_by_id(&self, id: i32) -> Result<Option<Permission>, StoreError> {
        Ok(self.tables.read().await.permissions.get(&id).cloned())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        Ok(self.tables.read().await.permissions.values().cloned().collect())
    }

    async fn update_permission(
        &self,
        id: i32,
        update: PermissionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Permission>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(mut permission) = t.permissions.get(&id).cloned() else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            if t.permission_name_taken(Some(id), &name) {
                return Err(StoreError::Conflict("permissions.name".to_string()));
            }
            permission.name = name;
        }
        if let Some(description) = update.description {
            permission.description = Some(description);
        }
        permission.updated_at = now;

        t.permissions.insert(id, permission.clone());
        Ok(Some(permission))
    }

    async fn delete_permission(&self, id: i32) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        if !t.permissions.contains_key(&id) {
            return Ok(false);
        }
        if let Some(endpoint) = t.endpoints.values().find(|e| e.permission_id == id) {
            return Err(StoreError::Conflict(format!(
                "permission {} is required by endpoint '{}'",
                id, endpoint.endpoint_name
            )));
        }

        t.permissions.remove(&id);
        t.role_permissions.retain(|_, rp| rp.permission_id != id);
        Ok(true)
    }

    async fn insert_user_role(
        &self,
        user_id: i32,
        role_id: i32,
        now: DateTime<Utc>,
    ) -> Result<UserRole, StoreError> {
        let mut t = self.tables.write().await;
        t.ensure_user(user_id)?;
        t.ensure_role(role_id)?;
        if t
            .user_roles
            .values()
            .any(|ur| ur.user_id == user_id && ur.role_id == role_id)
        {
            return Err(StoreError::Conflict("user_roles.user_id, user_roles.role_id".to_string()));
        }

        let id = t.allocate_id();
        let row = UserRole {
            id,
            user_id,
            role_id,
            created_at: now,
        };
        t.user_roles.insert(id, row.clone());
        Ok(row)
    }

    async fn delete_user_role(&self, user_id: i32, role_id: i32) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.user_roles.len();
        t.user_roles
            .retain(|_, ur| !(ur.user_id == user_id && ur.role_id == role_id));
        Ok(t.user_roles.len() < before)
    }

    async fn list_user_roles(&self) -> Result<Vec<UserRole>, StoreError> {
        Ok(self.tables.read().await.user_roles.values().cloned().collect())
    }

    async fn roles_for_user(&self, user_id: i32) -> Result<Vec<Role>, StoreError> {
        let t = self.tables.read().await;
        let mut roles: Vec<Role> = t
            .user_roles
            .values()
            .filter(|ur| ur.user_id == user_id)
            .filter_map(|ur| t.roles.get(&ur.role_id).cloned())
            .collect();
        roles.sort_by_key(|r| r.id);
        Ok(roles)
    }

    async fn insert_role_permission(
        &self,
        role_id: i32,
        permission_id: i32,
        now: DateTime<Utc>,
    ) -> Result<RolePermission, StoreError> {
        let mut t = self.tables.write().await;
        t.ensure_role(role_id)?;
        t.ensure_permission(permission_id)?;
        if t
            .role_permissions
            .values()
            .any(|rp| rp.role_id == role_id && rp.permission_id == permission_id)
        {
            return Err(StoreError::Conflict(
                "role_permissions.role_id, role_permissions.permission_id".to_string(),
            ));
        }

        let id = t.allocate_id();
        let row = RolePermission {
            id,
            role_id,
            permission_id,
            created_at: now,
        };
        t.role_permissions.insert(id, row.clone());
        Ok(row)
    }

    async fn delete_role_permission(
        &self,
        role_id: i32,
        permission_id: i32,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.role_permissions.len();
        t.role_permissions
            .retain(|_, rp| !(rp.role_id == role_id && rp.permission_id == permission_id));
        Ok(t.role_permissions.len() < before)
    }

    async fn list_role_permissions(&self) -> Result<Vec<RolePermission>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .role_permissions
            .values()
            .cloned()
            .collect())
    }

    async fn permissions_for_role(&self, role_id: i32) -> Result<Vec<Permission>, StoreError> {
        let t = self.tables.read().await;
        let mut permissions: Vec<Permission> = t
            .role_permissions
            .values()
            .filter(|rp| rp.role_id == role_id)
            .filter_map(|rp| t.permissions.get(&rp.permission_id).cloned())
            .collect();
        permissions.sort_by_key(|p| p.id);
        Ok(permissions)
    }

    async fn effective_permissions(&self, user_id: i32) -> Result<Vec<Permission>, StoreError> {
        let t = self.tables.read().await;
        let mut permissions: Vec<Permission> = t
            .user_roles
            .values()
            .filter(|ur| ur.user_id == user_id)
            .flat_map(|ur| {
                t.role_permissions
                    .values()
                    .filter(move |rp| rp.role_id == ur.role_id)
            })
            .filter_map(|rp| t.permissions.get(&rp.permission_id).cloned())
            .collect();
        permissions.sort_by_key(|p| p.id);
        permissions.dedup_by_key(|p| p.id);
        Ok(permissions)
    }

    async fn insert_endpoint(
        &self,
        endpoint_name: &str,
        permission_id: i32,
        now: DateTime<Utc>,
    ) -> Result<EndpointPermission, StoreError> {
        let mut t = self.tables.write().await;
        t.ensure_permission(permission_id)?;
        if t.endpoint_name_taken(None, endpoint_name) {
            return Err(StoreError::Conflict(
                "endpoint_permissions.endpoint_name".to_string(),
            ));
        }

        let id = t.allocate_id();
        let row = EndpointPermission {
            id,
            endpoint_name: endpoint_name.to_string(),
            permission_id,
            created_at: now,
            updated_at: now,
        };
        t.endpoints.insert(id, row.clone());
        Ok(row)
    }

    async fn endpoint_by_id(&self, id: i32) -> Result<Option<EndpointPermission>, StoreError> {
        Ok(self.tables.read().await.endpoints.get(&id).cloned())
    }

    async fn endpoint_by_name(
        &self,
        endpoint_name: &str,
    ) -> Result<Option<EndpointPermission>, StoreError> {
        let t = self.tables.read().await;
        Ok(t
            .endpoints
            .values()
            .find(|e| e.endpoint_name == endpoint_name)
            .cloned())
    }

    async fn list_endpoints(&self) -> Result<Vec<EndpointPermission>, StoreError> {
        Ok(self.tables.read().await.endpoints.values().cloned().collect())
    }

    async fn update_endpoint(
        &self,
        id: i32,
        update: EndpointUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<EndpointPermission>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(mut endpoint) = t.endpoints.get(&id).cloned() else {
            return Ok(None);
        };

        if let Some(name) = update.endpoint_name {
            if t.endpoint_name_taken(Some(id), &name) {
                return Err(StoreError::Conflict(
                    "endpoint_permissions.endpoint_name".to_string(),
                ));
            }
            endpoint.endpoint_name = name;
        }
        if let Some(permission_id) = update.permission_id {
            t.ensure_permission(permission_id)?;
            endpoint.permission_id = permission_id;
        }
        endpoint.updated_at = now;

        t.endpoints.insert(id, endpoint.clone());
        Ok(Some(endpoint))
    }

    async fn delete_endpoint(&self, id: i32) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.endpoints.remove(&id).is_some())
    }
}
