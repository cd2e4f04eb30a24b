use std::fmt;

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::auth::tokens::TokenError;
use crate::response::ApiResponse;
use crate::store::StoreError;

/// Why a request failed authentication.
///
/// Core callers can branch on the reason; the HTTP boundary renders every
/// variant as the same generic 401 so that clients cannot learn which check
/// rejected them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    Malformed,
    Expired,
    WrongKind,
    Revoked,
    UnknownSubject,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            AuthFailure::MissingToken => "token missing",
            AuthFailure::Malformed => "token malformed",
            AuthFailure::Expired => "token expired",
            AuthFailure::WrongKind => "wrong token type",
            AuthFailure::Revoked => "token revoked",
            AuthFailure::UnknownSubject => "token subject unavailable",
        };
        f.write_str(reason)
    }
}

/// Standard error type for Warden.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(AuthFailure),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission {0} does not exist")]
    InvalidPermission(i32),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation errors")]
    ValidationErrors(Vec<FieldError>),

    #[error("Email delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl WardenError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WardenError::NotFound(_) => StatusCode::NOT_FOUND,
            WardenError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WardenError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            WardenError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            WardenError::Forbidden(_) => StatusCode::FORBIDDEN,
            WardenError::Conflict(_) => StatusCode::CONFLICT,
            WardenError::InvalidPermission(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WardenError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WardenError::ValidationErrors(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WardenError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            WardenError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WardenError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            WardenError::NotFound(_) => "NOT_FOUND",
            WardenError::BadRequest(_) => "BAD_REQUEST",
            WardenError::Unauthenticated(_) => "UNAUTHORIZED",
            WardenError::InvalidCredentials => "UNAUTHORIZED",
            WardenError::Forbidden(_) => "FORBIDDEN",
            WardenError::Conflict(_) => "CONFLICT",
            WardenError::InvalidPermission(_) => "INVALID_PERMISSION",
            WardenError::Validation(_) => "VALIDATION_ERROR",
            WardenError::ValidationErrors(_) => "VALIDATION_ERROR",
            WardenError::DeliveryFailed(_) => "DELIVERY_FAILED",
            WardenError::Internal(_) => "INTERNAL_ERROR",
            WardenError::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// The message shown to API clients.
    ///
    /// Authentication failures, transport failures and internal errors are
    /// replaced with fixed text; the detailed cause is only logged.
    pub fn public_message(&self) -> String {
        match self {
            WardenError::Unauthenticated(_) => "Invalid or expired token".to_string(),
            WardenError::DeliveryFailed(_) => {
                "Failed to send reset email. Please try again later.".to_string()
            }
            WardenError::Internal(_) | WardenError::Store(_) => {
                "Internal server error".to_string()
            }
            WardenError::ValidationErrors(errs) => errs
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        }
    }

    /// Create a validation error with field-level details.
    pub fn validation_fields(errors: Vec<FieldError>) -> Self {
        WardenError::ValidationErrors(errors)
    }
}

impl From<StoreError> for WardenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(detail) => {
                tracing::debug!(%detail, "write hit a uniqueness constraint");
                WardenError::Conflict("Resource already exists".to_string())
            }
            StoreError::MissingReference(detail) => {
                tracing::debug!(%detail, "write referenced a missing row");
                WardenError::NotFound("Referenced resource not found".to_string())
            }
            other => WardenError::Store(other),
        }
    }
}

impl From<TokenError> for WardenError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::AlreadyInvalidFormat => {
                WardenError::Unauthenticated(AuthFailure::Malformed)
            }
            TokenError::Expired => WardenError::Unauthenticated(AuthFailure::Expired),
            TokenError::WrongKind { .. } => WardenError::Unauthenticated(AuthFailure::WrongKind),
            TokenError::Revoked => WardenError::Unauthenticated(AuthFailure::Revoked),
            TokenError::SubjectUnavailable => {
                WardenError::Unauthenticated(AuthFailure::UnknownSubject)
            }
            TokenError::Signing(msg) => WardenError::Internal(msg),
            TokenError::Store(e) => WardenError::from(e),
        }
    }
}

impl From<validator::ValidationErrors> for WardenError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = field.to_string();
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", e.code));
                    FieldError::with_code(field.clone(), message, e.code.to_string())
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        WardenError::ValidationErrors(fields)
    }
}

/// Error detail for API responses.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

/// Field-level validation error.
///
/// ```json
/// {
///   "field": "email",
///   "message": "must be a valid email address",
///   "code": "email"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
            code: None,
        }
    }

    /// Create a new field error with a code.
    pub fn with_code(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

impl axum::response::IntoResponse for WardenError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        } else if let WardenError::Unauthenticated(reason) = &self {
            tracing::debug!(%reason, "request rejected as unauthenticated");
        }

        let fields = match &self {
            WardenError::ValidationErrors(errs) => Some(errs.clone()),
            _ => None,
        };
        let body: ApiResponse<()> = ApiResponse::failure(
            status,
            ErrorDetail {
                code: self.error_code().to_string(),
                message: self.public_message(),
                fields,
            },
        );
        body.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_reasons_share_one_public_message() {
        let reasons = [
            AuthFailure::MissingToken,
            AuthFailure::Malformed,
            AuthFailure::Expired,
            AuthFailure::WrongKind,
            AuthFailure::Revoked,
        ];
        for reason in reasons {
            let err = WardenError::Unauthenticated(reason);
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert_eq!(err.public_message(), "Invalid or expired token");
        }
    }

    #[test]
    fn store_failures_hide_detail() {
        let err = WardenError::Store(StoreError::Database(sea_orm::DbErr::Custom(
            "relation \"users\" does not exist".to_string(),
        )));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn store_conflict_becomes_conflict() {
        let err = WardenError::from(StoreError::Conflict("username taken".to_string()));
        assert!(matches!(err, WardenError::Conflict(_)));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_reference_hides_database_text() {
        let err = WardenError::from(StoreError::MissingReference(
            "FOREIGN KEY constraint failed".to_string(),
        ));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(!err.public_message().contains("FOREIGN KEY"));
    }

    #[test]
    fn token_errors_collapse_to_unauthenticated() {
        assert!(matches!(
            WardenError::from(TokenError::Revoked),
            WardenError::Unauthenticated(AuthFailure::Revoked)
        ));
        assert!(matches!(
            WardenError::from(TokenError::Expired),
            WardenError::Unauthenticated(AuthFailure::Expired)
        ));
    }
}
