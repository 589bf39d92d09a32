//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;
use trade_store::RepositoryError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The caller did not identify themselves.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga execution error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::NotFound(_) => StatusCode::NOT_FOUND,
        SagaError::InvalidStatus { .. } | SagaError::NotCounterparty { .. } => {
            StatusCode::CONFLICT
        }
        SagaError::LockFailed { .. } | SagaError::ExchangeFailed { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SagaError::Repository(repo_err) => match repo_err {
            RepositoryError::ConcurrencyConflict { .. } | RepositoryError::AlreadyExists(_) => {
                StatusCode::CONFLICT
            }
            RepositoryError::InvalidToken(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
