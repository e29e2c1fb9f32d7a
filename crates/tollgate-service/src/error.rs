//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tollgate_core::MeterError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The ledger cannot answer right now; retry later.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

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
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Self::ServiceUnavailable(msg) => {
                tracing::warn!(error = %msg, "Ledger unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "The usage ledger is temporarily unavailable".to_string(),
                )
            }
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

impl From<MeterError> for ApiError {
    fn from(err: MeterError) -> Self {
        match err {
            MeterError::ServiceUnavailable(msg) => Self::ServiceUnavailable(msg),
            MeterError::Serialization(msg) | MeterError::Configuration(msg) => Self::Internal(msg),
            other @ (MeterError::DuplicateProvider { .. }
            | MeterError::DuplicateEndpoint { .. }
            | MeterError::InvalidEndpoint { .. }
            | MeterError::InvalidBudget(_)
            | MeterError::InvalidSubscription(_)
            | MeterError::InvalidFormat(_)
            | MeterError::InvalidGrouping(_)
            | MeterError::InvalidPeriod(_)
            | MeterError::InvalidDateRange { .. }
            | MeterError::InvalidId(_)) => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<tollgate_store::StoreError> for ApiError {
    fn from(err: tollgate_store::StoreError) -> Self {
        Self::from(MeterError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_errors_map_to_client_or_server_faults() {
        assert!(matches!(
            ApiError::from(MeterError::InvalidFormat("xml".into())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(MeterError::ServiceUnavailable("down".into())),
            ApiError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            ApiError::from(MeterError::Serialization("eof".into())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn unavailable_renders_503() {
        let response = ApiError::ServiceUnavailable("rocksdb closed".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
