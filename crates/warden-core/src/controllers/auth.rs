use axum::{
    Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::NewAccount;
use crate::error::WardenError;
use crate::extractors::{AuthUser, Json};
use crate::models::UserResponse;
use crate::response::{ApiResponse, MessageResponse};

use super::AppState;

// ── Request / Response types ──

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub reset_token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetLinkResponse {
    pub redirect_url: String,
}

const RESET_REQUESTED: &str =
    "If an account with that email exists, a password reset link has been sent.";

// ── Routes ──

/// Routes that need no token.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/reset-password/{token}", get(check_reset_token))
}

/// Routes that need an access token but no permission.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
}

// ── Handlers ──

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<NewAccount>,
) -> Result<ApiResponse<AuthResponse>, WardenError> {
    let (user, tokens) = state.credentials.register(payload).await?;
    Ok(ApiResponse::created(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: user.into(),
    }))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<ApiResponse<AuthResponse>, WardenError> {
    payload.validate()?;
    let (user, tokens) = state
        .credentials
        .login(&payload.email, &payload.password)
        .await?;
    Ok(ApiResponse::success(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: user.into(),
    }))
}

async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<ApiResponse<RefreshResponse>, WardenError> {
    let access_token = state.tokens.refresh(&payload.refresh_token).await?;
    Ok(ApiResponse::success(RefreshResponse { access_token }))
}

async fn logout(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<ApiResponse<MessageResponse>, WardenError> {
    state.credentials.logout(&principal.token).await?;
    tracing::info!(user_id = principal.user_id, "user logged out");
    Ok(ApiResponse::success(MessageResponse::new(
        "Successfully logged out",
    )))
}

async fn me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<ApiResponse<UserResponse>, WardenError> {
    let user = state.credentials.get_user(principal.user_id).await?;
    Ok(ApiResponse::success(user.into()))
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<ApiResponse<MessageResponse>, WardenError> {
    payload.validate()?;
    state.reset.initiate(&payload.email).await?;
    Ok(ApiResponse::success(MessageResponse::new(RESET_REQUESTED)))
}

async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<ApiResponse<MessageResponse>, WardenError> {
    state
        .reset
        .complete(&payload.reset_token, &payload.new_password)
        .await?;
    Ok(ApiResponse::success(MessageResponse::new(
        "Password has been reset successfully",
    )))
}

async fn check_reset_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<ApiResponse<ResetLinkResponse>, WardenError> {
    let redirect_url = state.reset.check(&token).await?;
    Ok(ApiResponse::success(ResetLinkResponse { redirect_url }))
}
