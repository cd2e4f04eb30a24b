use axum::{
    extract::{FromRequest, Request},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use crate::error::WardenError;

/// JSON body extractor whose rejections use the Warden error envelope.
///
/// Usage in handlers:
/// ```rust,ignore
/// async fn create_role(Json(payload): Json<NewGrantable>) -> impl IntoResponse {
///     // payload is deserialized from request body
/// }
/// ```
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = WardenError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if !is_json {
            return Err(WardenError::BadRequest(
                "Expected a JSON body (Content-Type: application/json)".to_string(),
            ));
        }

        let bytes = axum::body::to_bytes(req.into_body(), 64 * 1024)
            .await
            .map_err(|e| WardenError::BadRequest(format!("Failed to read body: {}", e)))?;

        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| WardenError::Validation(format!("Invalid JSON: {}", e)))?;

        Ok(Json(value))
    }
}

impl<T: serde::Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => (StatusCode::OK, [(CONTENT_TYPE, "application/json")], bytes).into_response(),
            Err(e) => WardenError::Internal(format!("Failed to serialize response: {}", e))
                .into_response(),
        }
    }
}
