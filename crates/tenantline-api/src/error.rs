//! API error types and JSON error response formatting.
//!
//! ApiError gives every endpoint the same JSON error shape and maps dialogue
//! and registry errors onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tenantline_dialogue::DialogueError;
use tenantline_registry::RegistryError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - unknown call.
    NotFound(String),
    /// 409 Conflict - the call has already ended.
    Conflict(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 503 Service Unavailable - registry feed not configured or unreachable.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DialogueError> for ApiError {
    fn from(err: DialogueError) -> Self {
        match &err {
            DialogueError::CallNotFound(_) => ApiError::NotFound(err.to_string()),
            DialogueError::CallClosed(_) => ApiError::Conflict(err.to_string()),
            DialogueError::UtteranceTooLong(_) => ApiError::BadRequest(err.to_string()),
            DialogueError::Collaborator(_) => ApiError::ServiceUnavailable(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_dialogue_error_mapping() {
        let id = Uuid::new_v4();
        assert!(matches!(
            ApiError::from(DialogueError::CallNotFound(id)),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(DialogueError::CallClosed(id)),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(DialogueError::UtteranceTooLong(2000)),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(DialogueError::Storage("lock".to_string())),
            ApiError::Internal(_)
        ));
        assert!(matches!(
            ApiError::from(DialogueError::Collaborator("ticket system down".to_string())),
            ApiError::ServiceUnavailable(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        let resp = ApiError::NotFound("missing".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = ApiError::ServiceUnavailable("no feed".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
