//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping pipeline errors to appropriate HTTP status codes.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pmo_action::DecisionError;
use pmo_core::error::PmoError;
use serde::Serialize;
use uuid::Uuid;

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
    /// 401 Unauthorized - missing or unknown bearer token.
    Unauthorized(String),
    /// 403 Forbidden - the actor's role lacks the capability.
    Forbidden(String),
    /// 404 Not Found - resource does not exist in the caller's organization.
    NotFound(String),
    /// 409 Conflict - duplicate proposal or superseded decision.
    Conflict(String),
    /// 500 with the id of the FAILED execution row that was recorded.
    ExecutionFailed { execution_id: Uuid, message: String },
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ExecutionFailed {
                execution_id,
                message,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "execution_failed",
                message,
                Some(serde_json::json!({ "executionId": execution_id })),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DecisionError> for ApiError {
    fn from(err: DecisionError) -> Self {
        let message = err.to_string();
        match err {
            DecisionError::InvalidDecisionKind(_)
            | DecisionError::InvalidRequest(_)
            | DecisionError::DecisionNotExecutable(_) => ApiError::BadRequest(message),
            DecisionError::ProposalNotFound(_) | DecisionError::DecisionNotFound(_) => {
                ApiError::NotFound(message)
            }
            DecisionError::Forbidden(_) => ApiError::Forbidden(message),
            DecisionError::DecisionSuperseded { .. } | DecisionError::ProposalConflict(_) => {
                ApiError::Conflict(message)
            }
            DecisionError::ExecutionHandlerFailure {
                execution_id,
                message,
            } => ApiError::ExecutionFailed {
                execution_id,
                message,
            },
            DecisionError::Storage(e) => ApiError::from(e),
        }
    }
}

impl From<PmoError> for ApiError {
    fn from(err: PmoError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmo_core::access::Permission;

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_kind_is_bad_request() {
        let resp = ApiError::from(DecisionError::InvalidDecisionKind("INVALID_STATUS".into()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "bad_request");
        assert!(json["message"].as_str().unwrap().contains("Invalid decision"));
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (DecisionError::ProposalNotFound("ap-1".into()), StatusCode::NOT_FOUND),
            (DecisionError::DecisionNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (DecisionError::Forbidden(Permission::RecordDecision), StatusCode::FORBIDDEN),
            (DecisionError::DecisionNotExecutable(Uuid::nil()), StatusCode::BAD_REQUEST),
            (
                DecisionError::DecisionSuperseded {
                    decision_id: Uuid::nil(),
                    latest_id: Uuid::nil(),
                },
                StatusCode::CONFLICT,
            ),
            (DecisionError::ProposalConflict("ap-1".into()), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_execution_failure_carries_execution_id() {
        let id = Uuid::new_v4();
        let resp = ApiError::from(DecisionError::ExecutionHandlerFailure {
            execution_id: id,
            message: "project not found".into(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "execution_failed");
        assert_eq!(json["details"]["executionId"], id.to_string());
    }

    #[tokio::test]
    async fn test_storage_error_sanitized() {
        let err: ApiError =
            DecisionError::Storage(PmoError::Storage("sqlite: disk full at /var/db".into())).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = body_json(resp).await.to_string();
        assert!(!text.contains("sqlite"));
        assert!(text.contains("An internal error occurred"));
    }
}
