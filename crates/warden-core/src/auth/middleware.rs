//! axum adapters for [`Authorizer`].
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/auth/me", get(me))
//!     .route_layer(from_fn_with_state(authorizer.clone(), login_required));
//!
//! Router::new()
//!     .route("/roles", get(list_roles))
//!     .route_layer(from_fn_with_state(authorizer, rbac_required));
//! ```
//!
//! `rbac_required` names the endpoint `"{METHOD} {matched route}"`, for
//! example `GET /api/v1/roles/{id}`, so it must be added with `route_layer`.

use axum::{
    extract::{MatchedPath, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::guard::Authorizer;
use crate::error::WardenError;

// owned, since a borrow of the request cannot be held across an await
fn authorization_header(req: &Request) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Endpoint name used for RBAC lookups.
pub fn endpoint_name(req: &Request) -> String {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    format!("{} {}", req.method(), path)
}

/// Require a valid access token. The [`super::guard::Principal`] is stored in
/// request extensions.
pub async fn login_required(
    State(authorizer): State<Authorizer>,
    mut req: Request,
    next: Next,
) -> Result<Response, WardenError> {
    let header = authorization_header(&req);
    let principal = authorizer.authenticate(header.as_deref()).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Require a valid access token whose subject is granted this endpoint.
pub async fn rbac_required(
    State(authorizer): State<Authorizer>,
    mut req: Request,
    next: Next,
) -> Result<Response, WardenError> {
    let endpoint = endpoint_name(&req);
    let header = authorization_header(&req);
    let principal = authorizer
        .authorize_request(header.as_deref(), &endpoint)
        .await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
