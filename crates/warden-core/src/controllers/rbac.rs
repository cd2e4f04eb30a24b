//! Admin endpoints for roles, permissions, their associations and endpoint
//! mappings.

use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};
use serde::Deserialize;

use crate::auth::NewGrantable;
use crate::error::WardenError;
use crate::extractors::Json;
use crate::response::{ApiResponse, MessageResponse};
use crate::store::{
    EndpointPermission, EndpointUpdate, Permission, PermissionUpdate, Role, RolePermission,
    RoleUpdate, UserRole,
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct UserRoleRequest {
    pub user_id: i32,
    pub role_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct RolePermissionRequest {
    pub role_id: i32,
    pub permission_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct EndpointRequest {
    pub endpoint_name: String,
    pub permission_id: i32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route(
            "/roles/{id}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/roles/{id}/permissions", get(role_permissions))
        .route("/permissions", get(list_permissions).post(create_permission))
        .route(
            "/permissions/{id}",
            get(get_permission)
                .put(update_permission)
                .delete(delete_permission),
        )
        .route(
            "/user-roles",
            get(list_user_roles).post(assign_role).delete(revoke_role),
        )
        .route(
            "/role-permissions",
            get(list_role_permissions)
                .post(assign_permission)
                .delete(revoke_permission),
        )
        .route(
            "/endpoint-permissions",
            get(list_endpoints).post(map_endpoint),
        )
        .route(
            "/endpoint-permissions/{id}",
            get(get_endpoint).put(update_endpoint).delete(unmap_endpoint),
        )
}

// ── Roles ──

async fn list_roles(State(state): State<AppState>) -> Result<ApiResponse<Vec<Role>>, WardenError> {
    Ok(ApiResponse::success(state.rbac.list_roles().await?))
}

async fn create_role(
    State(state): State<AppState>,
    Json(payload): Json<NewGrantable>,
) -> Result<ApiResponse<Role>, WardenError> {
    Ok(ApiResponse::created(state.rbac.create_role(payload).await?))
}

async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<Role>, WardenError> {
    Ok(ApiResponse::success(state.rbac.get_role(id).await?))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<RoleUpdate>,
) -> Result<ApiResponse<Role>, WardenError> {
    Ok(ApiResponse::success(state.rbac.update_role(id, payload).await?))
}

async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<MessageResponse>, WardenError> {
    state.rbac.delete_role(id).await?;
    Ok(ApiResponse::success(MessageResponse::new("Role deleted")))
}

async fn role_permissions(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<Vec<Permission>>, WardenError> {
    Ok(ApiResponse::success(state.rbac.permissions_for_role(id).await?))
}

// ── Permissions ──

async fn list_permissions(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<Permission>>, WardenError> {
    Ok(ApiResponse::success(state.rbac.list_permissions().await?))
}

async fn create_permission(
    State(state): State<AppState>,
    Json(payload): Json<NewGrantable>,
) -> Result<ApiResponse<Permission>, WardenError> {
    Ok(ApiResponse::created(
        state.rbac.create_permission(payload).await?,
    ))
}

async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<Permission>, WardenError> {
    Ok(ApiResponse::success(state.rbac.get_permission(id).await?))
}

async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<PermissionUpdate>,
) -> Result<ApiResponse<Permission>, WardenError> {
    Ok(ApiResponse::success(
        state.rbac.update_permission(id, payload).await?,
    ))
}

async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<MessageResponse>, WardenError> {
    state.rbac.delete_permission(id).await?;
    Ok(ApiResponse::success(MessageResponse::new(
        "Permission deleted",
    )))
}

// ── Associations ──

async fn list_user_roles(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<UserRole>>, WardenError> {
    Ok(ApiResponse::success(state.rbac.list_user_roles().await?))
}

async fn assign_role(
    State(state): State<AppState>,
    Json(payload): Json<UserRoleRequest>,
) -> Result<ApiResponse<UserRole>, WardenError> {
    Ok(ApiResponse::created(
        state
            .rbac
            .assign_role(payload.user_id, payload.role_id)
            .await?,
    ))
}

async fn revoke_role(
    State(state): State<AppState>,
    Json(payload): Json<UserRoleRequest>,
) -> Result<ApiResponse<MessageResponse>, WardenError> {
    state
        .rbac
        .revoke_role(payload.user_id, payload.role_id)
        .await?;
    Ok(ApiResponse::success(MessageResponse::new(
        "Role removed from user",
    )))
}

async fn list_role_permissions(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<RolePermission>>, WardenError> {
    Ok(ApiResponse::success(
        state.rbac.list_role_permissions().await?,
    ))
}

async fn assign_permission(
    State(state): State<AppState>,
    Json(payload): Json<RolePermissionRequest>,
) -> Result<ApiResponse<RolePermission>, WardenError> {
    Ok(ApiResponse::created(
        state
            .rbac
            .assign_permission(payload.role_id, payload.permission_id)
            .await?,
    ))
}

async fn revoke_permission(
    State(state): State<AppState>,
    Json(payload): Json<RolePermissionRequest>,
) -> Result<ApiResponse<MessageResponse>, WardenError> {
    state
        .rbac
        .revoke_permission(payload.role_id, payload.permission_id)
        .await?;
    Ok(ApiResponse::success(MessageResponse::new(
        "Permission removed from role",
    )))
}

// ── Endpoint mappings ──

async fn list_endpoints(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<EndpointPermission>>, WardenError> {
    Ok(ApiResponse::success(state.rbac.list_endpoints().await?))
}

async fn map_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<EndpointRequest>,
) -> Result<ApiResponse<EndpointPermission>, WardenError> {
    Ok(ApiResponse::created(
        state
            .rbac
            .map_endpoint(&payload.endpoint_name, payload.permission_id)
            .await?,
    ))
}

async fn get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<EndpointPermission>, WardenError> {
    Ok(ApiResponse::success(state.rbac.get_endpoint(id).await?))
}

async fn update_endpoint(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<EndpointUpdate>,
) -> Result<ApiResponse<EndpointPermission>, WardenError> {
    Ok(ApiResponse::success(
        state.rbac.update_endpoint(id, payload).await?,
    ))
}

async fn unmap_endpoint(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<MessageResponse>, WardenError> {
    state.rbac.unmap_endpoint(id).await?;
    Ok(ApiResponse::success(MessageResponse::new(
        "Endpoint permission deleted",
    )))
}
