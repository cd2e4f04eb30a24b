use axum::http::StatusCode;
use serde::Serialize;

use crate::error::ErrorDetail;

/// Standard API response wrapper.
///
/// All Warden endpoints return this format:
/// ```json
/// {
///   "success": true,
///   "data": { ... },
///   "error": null
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip)]
    status: StatusCode,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful (200) response with data.
    pub fn success(data: T) -> Self {
        ApiResponse {
            status: StatusCode::OK,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create a 201 response for a newly created resource.
    pub fn created(data: T) -> Self {
        ApiResponse {
            status: StatusCode::CREATED,
            ..Self::success(data)
        }
    }

    /// Create an error response.
    pub fn failure(status: StatusCode, error: ErrorDetail) -> ApiResponse<T> {
        ApiResponse {
            status,
            success: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> axum::response::IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        (self.status, axum::Json(self)).into_response()
    }
}

/// Plain message payload, used by endpoints with nothing else to return.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            message: message.into(),
        }
    }
}
