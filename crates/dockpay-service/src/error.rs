//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::reconcile::ReconcileError;

/// API error type.
///
/// Ledger store failures are dependency failures on every route and map to
/// `424 Failed Dependency`, the same status a webhook gets when reconciliation
/// cannot reach the store. `Internal` is reserved for the service's own
/// misconfiguration.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request: invalid input, failed verification or malformed payload.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A dependency (provider API, notification service, store) failed.
    #[error("failed dependency: {0}")]
    FailedDependency(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Self::FailedDependency(msg) => (
                StatusCode::FAILED_DEPENDENCY,
                "upstream_failure",
                msg.clone(),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<dockpay_store::StoreError> for ApiError {
    fn from(err: dockpay_store::StoreError) -> Self {
        tracing::error!(error = %err, "Ledger store failure");
        Self::FailedDependency(err.to_string())
    }
}

impl From<dockpay_core::DecodeError> for ApiError {
    fn from(err: dockpay_core::DecodeError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<dockpay_core::FeeError> for ApiError {
    fn from(err: dockpay_core::FeeError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<crate::stripe::StripeError> for ApiError {
    fn from(err: crate::stripe::StripeError) -> Self {
        Self::FailedDependency(err.to_string())
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        if err.is_upstream() {
            Self::FailedDependency(err.to_string())
        } else {
            Self::BadRequest(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_dependency_is_424() {
        let response = ApiError::FailedDependency("stripe down".into()).into_response();
        assert_eq!(response.status(), StatusCode::FAILED_DEPENDENCY);
    }

    #[test]
    fn store_failure_matches_webhook_status() {
        let direct = ApiError::from(dockpay_store::StoreError::Database("io".into()));
        let via_reconcile = ApiError::from(ReconcileError::Store(
            dockpay_store::StoreError::Database("io".into()),
        ));
        assert_eq!(direct.into_response().status(), StatusCode::FAILED_DEPENDENCY);
        assert_eq!(via_reconcile.into_response().status(), StatusCode::FAILED_DEPENDENCY);
    }

    #[test]
    fn internal_hides_message() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
