use axum::{extract::FromRequestParts, http::request::Parts};

use crate::auth::Principal;
use crate::error::{AuthFailure, WardenError};

/// The caller admitted by `login_required` or `rbac_required`.
///
/// Usage in handlers:
/// ```rust,ignore
/// async fn me(AuthUser(principal): AuthUser) -> impl IntoResponse {
///     // principal.user_id is the authenticated user's ID
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = WardenError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthUser)
            .ok_or(WardenError::Unauthenticated(AuthFailure::MissingToken))
    }
}
