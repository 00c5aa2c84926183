//! Tenfold — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use tenfold_core::error::GameError;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message, safe for the client boundary.
    pub message: String,
}

/// HTTP-layer wrapper around `GameError` that implements `IntoResponse`.
/// The body carries `client_detail()`, never the raw error text, so
/// provider and storage internals stay on the server side.
#[derive(Debug)]
pub struct ApiError(pub GameError);

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            GameError::SessionBusy => (StatusCode::CONFLICT, "session_busy"),
            GameError::InvalidAction(_) => (StatusCode::BAD_REQUEST, "invalid_action"),
            GameError::ProviderExhausted => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            GameError::StorageFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_failure")
            }
            GameError::StreamAbort => (StatusCode::INTERNAL_SERVER_ERROR, "stream_abort"),
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.client_detail().to_owned(),
        };

        (status, Json(body)).into_response()
    }
}
