use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};
use serde::Deserialize;

use crate::auth::{NewAccount, UserUpdate};
use crate::error::WardenError;
use crate::extractors::Json;
use crate::models::UserResponse;
use crate::response::{ApiResponse, MessageResponse};
use crate::store::Role;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_active: Option<bool>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/roles", get(user_roles))
}

async fn list_users(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<UserResponse>>, WardenError> {
    let users = state.credentials.list_users().await?;
    Ok(ApiResponse::success(
        users.into_iter().map(UserResponse::from).collect(),
    ))
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<ApiResponse<UserResponse>, WardenError> {
    let account = NewAccount {
        username: payload.username,
        email: payload.email,
        password: payload.password,
    };
    let user = state
        .credentials
        .create_user(account, payload.is_active.unwrap_or(true))
        .await?;
    Ok(ApiResponse::created(user.into()))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<UserResponse>, WardenError> {
    let user = state.credentials.get_user(id).await?;
    Ok(ApiResponse::success(user.into()))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UserUpdate>,
) -> Result<ApiResponse<UserResponse>, WardenError> {
    let user = state.credentials.update_user(id, payload).await?;
    Ok(ApiResponse::success(user.into()))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<MessageResponse>, WardenError> {
    state.credentials.delete_user(id).await?;
    Ok(ApiResponse::success(MessageResponse::new("User deleted")))
}

async fn user_roles(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<Vec<Role>>, WardenError> {
    Ok(ApiResponse::success(state.rbac.roles_for_user(id).await?))
}
