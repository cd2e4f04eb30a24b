//! Role-based access control over users, roles, permissions and endpoints.
//!
//! ```text
//! user ──< user_roles >── role ──< role_permissions >── permission
//!                                                          │
//!                              endpoint_permissions ───────┘
//! ```
//!
//! A user may call an endpoint when any of its roles grants the single
//! permission the endpoint is mapped to. Unmapped endpoints are denied.
//!
//! Effective permission sets are cached per user and the whole cache is
//! dropped on any mutation that could change one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use validator::Validate;

use crate::clock::SharedClock;
use crate::config::RbacConfig;
use crate::error::WardenError;
use crate::store::{
    CredentialStore, EndpointPermission, EndpointUpdate, Permission, PermissionUpdate, RbacStore,
    Role, RolePermission, RoleUpdate, SharedStore, StoreError, UserRole,
};

/// Body for creating a role or a permission.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewGrantable {
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub name: String,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Granted,
    EndpointUnmapped,
    MissingPermission,
}

/// Outcome of an authorization check with the facts that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationDecision {
    pub granted: bool,
    pub user_id: i32,
    pub endpoint: String,
    /// Name of the permission the endpoint requires, if it is mapped.
    pub required_permission: Option<String>,
    pub reason: DecisionReason,
}

#[derive(Clone, Debug)]
struct CachedPermissions {
    permission_ids: HashSet<i32>,
    cached_at: Instant,
}

#[derive(Clone)]
pub struct RbacService {
    inner: Arc<RbacInner>,
}

struct RbacInner {
    store: SharedStore,
    clock: SharedClock,
    /// user id → effective permission ids
    cache: RwLock<HashMap<i32, CachedPermissions>>,
    cache_ttl: std::time::Duration,
    /// Bumped by every invalidation, under the cache write lock. A set read
    /// from the store is only cached if no invalidation happened meanwhile.
    generation: AtomicU64,
}

fn conflict_as(message: &str) -> impl FnOnce(StoreError) -> WardenError + '_ {
    move |err| match err {
        StoreError::Conflict(_) => WardenError::Conflict(message.to_string()),
        other => other.into(),
    }
}

impl RbacService {
    pub fn new(config: &RbacConfig, store: SharedStore, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(RbacInner {
                store,
                clock,
                cache: RwLock::new(HashMap::new()),
                cache_ttl: config.cache_ttl,
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    // ═══ Decisions ═══

    /// Whether `user_id` may call `endpoint`.
    pub async fn authorize(&self, user_id: i32, endpoint: &str) -> Result<bool, WardenError> {
        Ok(self.authorize_explained(user_id, endpoint).await?.granted)
    }

    pub async fn authorize_explained(
        &self,
        user_id: i32,
        endpoint: &str,
    ) -> Result<AuthorizationDecision, WardenError> {
        let decision =
            |granted: bool, required_permission: Option<String>, reason: DecisionReason| {
                AuthorizationDecision {
                    granted,
                    user_id,
                    endpoint: endpoint.to_string(),
                    required_permission,
                    reason,
                }
            };

        let Some(mapping) = self.store().endpoint_by_name(endpoint).await? else {
            return Ok(decision(false, None, DecisionReason::EndpointUnmapped));
        };
        let required = self
            .store()
            .permission_by_id(mapping.permission_id)
            .await?
            .map(|p| p.name);

        let held = self.permission_ids_for_user(user_id).await?;
        if held.contains(&mapping.permission_id) {
            Ok(decision(true, required, DecisionReason::Granted))
        } else {
            Ok(decision(false, required, DecisionReason::MissingPermission))
        }
    }

    /// Names of every permission the user holds through its roles, sorted.
    pub async fn effective_permissions(&self, user_id: i32) -> Result<Vec<String>, WardenError> {
        let mut names: Vec<String> = self
            .store()
            .effective_permissions(user_id)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn permission_ids_for_user(&self, user_id: i32) -> Result<HashSet<i32>, WardenError> {
        let ttl = self.inner.cache_ttl;
        if !ttl.is_zero() {
            let cache = self.inner.cache.read().await;
            if let Some(cached) = cache.get(&user_id) {
                if cached.cached_at.elapsed() < ttl {
                    return Ok(cached.permission_ids.clone());
                }
            }
        }

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let permission_ids: HashSet<i32> = self
            .store()
            .effective_permissions(user_id)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        if !ttl.is_zero() {
            self.cache_permissions(user_id, generation, permission_ids.clone())
                .await;
        }

        Ok(permission_ids)
    }

    /// Cache a set read at `generation`, unless it has been invalidated since.
    async fn cache_permissions(&self, user_id: i32, generation: u64, ids: HashSet<i32>) {
        let mut cache = self.inner.cache.write().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(user_id, "permission set went stale while loading; not cached");
            return;
        }
        cache.insert(
            user_id,
            CachedPermissions {
                permission_ids: ids,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every cached permission set.
    pub async fn invalidate_all(&self) {
        let mut cache = self.inner.cache.write().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }

    // ═══ Roles ═══

    pub async fn create_role(&self, new: NewGrantable) -> Result<Role, WardenError> {
        new.validate()?;
        let role = self
            .store()
            .insert_role(&new.name, new.description.as_deref(), self.inner.clock.now())
            .await
            .map_err(conflict_as("Role name already exists"))?;
        tracing::info!(role_id = role.id, name = %role.name, "role created");
        Ok(role)
    }

    pub async fn get_role(&self, id: i32) -> Result<Role, WardenError> {
        self.store()
            .role_by_id(id)
            .await?
            .ok_or_else(|| WardenError::NotFound("Role not found".to_string()))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, WardenError> {
        Ok(self.store().list_roles().await?)
    }

    pub async fn update_role(&self, id: i32, update: RoleUpdate) -> Result<Role, WardenError> {
        update.validate()?;
        self.store()
            .update_role(id, update, self.inner.clock.now())
            .await
            .map_err(conflict_as("Role name already exists"))?
            .ok_or_else(|| WardenError::NotFound("Role not found".to_string()))
    }

    pub async fn delete_role(&self, id: i32) -> Result<(), WardenError> {
        if !self.store().delete_role(id).await? {
            return Err(WardenError::NotFound("Role not found".to_string()));
        }
        self.invalidate_all().await;
        tracing::info!(role_id = id, "role deleted");
        Ok(())
    }

    // ═══ Permissions ═══

    pub async fn create_permission(&self, new: NewGrantable) -> Result<Permission, WardenError> {
        new.validate()?;
        let permission = self
            .store()
            .insert_permission(&new.name, new.description.as_deref(), self.inner.clock.now())
            .await
            .map_err(conflict_as("Permission name already exists"))?;
        tracing::info!(permission_id = permission.id, name = %permission.name, "permission created");
        Ok(permission)
    }

    pub async fn get_permission(&self, id: i32) -> Result<Permission, WardenError> {
        self.store()
            .permission_by_id(id)
            .await?
            .ok_or_else(|| WardenError::NotFound("Permission not found".to_string()))
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, WardenError> {
        Ok(self.store().list_permissions().await?)
    }

    pub async fn update_permission(
        &self,
        id: i32,
        update: PermissionUpdate,
    ) -> Result<Permission, WardenError> {
        update.validate()?;
        self.store()
            .update_permission(id, update, self.inner.clock.now())
            .await
            .map_err(conflict_as("Permission name already exists"))?
            .ok_or_else(|| WardenError::NotFound("Permission not found".to_string()))
    }

    /// Fails with `Conflict` while an endpoint is still mapped to it.
    pub async fn delete_permission(&self, id: i32) -> Result<(), WardenError> {
        if !self.store().delete_permission(id).await? {
            return Err(WardenError::NotFound("Permission not found".to_string()));
        }
        self.invalidate_all().await;
        tracing::info!(permission_id = id, "permission deleted");
        Ok(())
    }

    // ═══ Associations ═══

    pub async fn assign_role(&self, user_id: i32, role_id: i32) -> Result<UserRole, WardenError> {
        if self.store().user_by_id(user_id).await?.is_none() {
            return Err(WardenError::NotFound(format!("User {} not found", user_id)));
        }
        if self.store().role_by_id(role_id).await?.is_none() {
            return Err(WardenError::NotFound(format!("Role {} not found", role_id)));
        }

        let row = self
            .store()
            .insert_user_role(user_id, role_id, self.inner.clock.now())
            .await
            .map_err(conflict_as("User already has this role"))?;
        self.invalidate_all().await;
        tracing::info!(user_id, role_id, "role assigned");
        Ok(row)
    }

    pub async fn revoke_role(&self, user_id: i32, role_id: i32) -> Result<(), WardenError> {
        if !self.store().delete_user_role(user_id, role_id).await? {
            return Err(WardenError::NotFound(
                "User does not have this role".to_string(),
            ));
        }
        self.invalidate_all().await;
        tracing::info!(user_id, role_id, "role revoked");
        Ok(())
    }

    pub async fn assign_permission(
        &self,
        role_id: i32,
        permission_id: i32,
    ) -> Result<RolePermission, WardenError> {
        if self.store().role_by_id(role_id).await?.is_none() {
            return Err(WardenError::NotFound(format!("Role {} not found", role_id)));
        }
        if self.store().permission_by_id(permission_id).await?.is_none() {
            return Err(WardenError::NotFound(format!(
                "Permission {} not found",
                permission_id
            )));
        }

        let row = self
            .store()
            .insert_role_permission(role_id, permission_id, self.inner.clock.now())
            .await
            .map_err(conflict_as("Role already has this permission"))?;
        self.invalidate_all().await;
        tracing::info!(role_id, permission_id, "permission granted to role");
        Ok(row)
    }

    pub async fn revoke_permission(
        &self,
        role_id: i32,
        permission_id: i32,
    ) -> Result<(), WardenError> {
        if !self
            .store()
            .delete_role_permission(role_id, permission_id)
            .await?
        {
            return Err(WardenError::NotFound(
                "Role does not have this permission".to_string(),
            ));
        }
        self.invalidate_all().await;
        tracing::info!(role_id, permission_id, "permission withdrawn from role");
        Ok(())
    }

    pub async fn list_user_roles(&self) -> Result<Vec<UserRole>, WardenError> {
        Ok(self.store().list_user_roles().await?)
    }

    pub async fn roles_for_user(&self, user_id: i32) -> Result<Vec<Role>, WardenError> {
        if self.store().user_by_id(user_id).await?.is_none() {
            return Err(WardenError::NotFound("User not found".to_string()));
        }
        Ok(self.store().roles_for_user(user_id).await?)
    }

    pub async fn list_role_permissions(&self) -> Result<Vec<RolePermission>, WardenError> {
        Ok(self.store().list_role_permissions().await?)
    }

    pub async fn permissions_for_role(&self, role_id: i32) -> Result<Vec<Permission>, WardenError> {
        if self.store().role_by_id(role_id).await?.is_none() {
            return Err(WardenError::NotFound("Role not found".to_string()));
        }
        Ok(self.store().permissions_for_role(role_id).await?)
    }

    // ═══ Endpoint mappings ═══

    /// Require `permission_id` for calls to `endpoint_name`.
    pub async fn map_endpoint(
        &self,
        endpoint_name: &str,
        permission_id: i32,
    ) -> Result<EndpointPermission, WardenError> {
        if endpoint_name.trim().is_empty() {
            return Err(WardenError::Validation(
                "endpoint_name must not be empty".to_string(),
            ));
        }
        if self.store().permission_by_id(permission_id).await?.is_none() {
            return Err(WardenError::InvalidPermission(permission_id));
        }

        let mapping = self
            .store()
            .insert_endpoint(endpoint_name, permission_id, self.inner.clock.now())
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => {
                    WardenError::Conflict("Endpoint is already mapped".to_string())
                }
                StoreError::MissingReference(_) => WardenError::InvalidPermission(permission_id),
                other => other.into(),
            })?;
        tracing::info!(endpoint = %mapping.endpoint_name, permission_id, "endpoint mapped");
        Ok(mapping)
    }

    pub async fn get_endpoint(&self, id: i32) -> Result<EndpointPermission, WardenError> {
        self.store()
            .endpoint_by_id(id)
            .await?
            .ok_or_else(|| WardenError::NotFound("Endpoint permission not found".to_string()))
    }

    pub async fn list_endpoints(&self) -> Result<Vec<EndpointPermission>, WardenError> {
        Ok(self.store().list_endpoints().await?)
    }

    pub async fn update_endpoint(
        &self,
        id: i32,
        update: EndpointUpdate,
    ) -> Result<EndpointPermission, WardenError> {
        update.validate()?;
        if let Some(permission_id) = update.permission_id {
            if self.store().permission_by_id(permission_id).await?.is_none() {
                return Err(WardenError::InvalidPermission(permission_id));
            }
        }

        self.store()
            .update_endpoint(id, update, self.inner.clock.now())
            .await
            .map_err(conflict_as("Endpoint is already mapped"))?
            .ok_or_else(|| WardenError::NotFound("Endpoint permission not found".to_string()))
    }

    pub async fn unmap_endpoint(&self, id: i32) -> Result<(), WardenError> {
        if !self.store().delete_endpoint(id).await? {
            return Err(WardenError::NotFound(
                "Endpoint permission not found".to_string(),
            ));
        }
        tracing::info!(endpoint_id = id, "endpoint unmapped");
        Ok(())
    }
}
