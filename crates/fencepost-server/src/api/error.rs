//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fencepost_core::FencepostError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Carries the HTTP status, a machine-readable code and a message, and
/// renders as an [`ErrorResponse`].
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    error_code: String,
    message: String,
    details: Option<serde_json::Value>,
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "not_within_office",
    "message": "You must be within the office premises to check in",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "not_within_office").
    #[schema(example = "not_within_office")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "You must be within the office premises to check in")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// An error with the given status, code and message.
    pub fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach details to the response body.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// 400 Bad Request.
    pub fn bad_request(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_code, message)
    }

    /// 401 Unauthorized: the session was logged out.
    pub fn session_logged_out() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "session_logged_out",
            "You were logged out after leaving the office. Log in again to continue.",
        )
    }

    /// 500 Internal Server Error.
    pub fn internal(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error_code, message)
    }

    /// The HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// The machine-readable error code.
    #[must_use]
    pub fn error_code(&self) -> &str {
        &self.error_code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = self.status.as_u16(),
                error_code = %self.error_code,
                message = %self.message,
                details = ?self.details,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            error: self.error_code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Convert from the core's unified error.
impl From<FencepostError> for ApiError {
    fn from(err: FencepostError) -> Self {
        let status =
            StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let api = Self::new(status, err.error_code().to_ascii_lowercase(), err.to_string());
        if err.is_recoverable() {
            api.with_details(serde_json::json!({ "retryable": true }))
        } else {
            api
        }
    }
}

impl From<fencepost_core::LocationError> for ApiError {
    fn from(err: fencepost_core::LocationError) -> Self {
        Self::from(FencepostError::from(err))
    }
}

impl From<fencepost_core::AttendanceError> for ApiError {
    fn from(err: fencepost_core::AttendanceError) -> Self {
        Self::from(FencepostError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fencepost_core::{AttendanceError, LocationError};

    #[test]
    fn test_attendance_errors_map_to_client_statuses() {
        let err = ApiError::from(AttendanceError::NotWithinOffice);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.error_code(), "not_within_office");

        let err = ApiError::from(AttendanceError::AlreadyCheckedIn);
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_transient_location_error_is_marked_retryable() {
        let err = ApiError::from(LocationError::TimedOut);
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.details, Some(serde_json::json!({ "retryable": true })));

        let err = ApiError::from(LocationError::PermissionDenied);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(err.details.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }
}
