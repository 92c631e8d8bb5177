//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reservation_core::{CoreError, Failure, FailureClass, PortError};
use serde::Serialize;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A classified rejection (authentication, permission, validation, not found).
    #[error("{0}")]
    Rejected(#[from] Failure),

    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while running the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a failure to sign a token.
    #[error("Token Error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Rejected(failure) => ApiError::Rejected(failure),
            CoreError::Port(port) => ApiError::Port(port),
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
    pub code: String,
}

pub fn status_for(class: FailureClass) -> StatusCode {
    match class {
        FailureClass::Authentication => StatusCode::UNAUTHORIZED,
        FailureClass::Permission => StatusCode::FORBIDDEN,
        FailureClass::Validation => StatusCode::BAD_REQUEST,
        FailureClass::NotFound => StatusCode::NOT_FOUND,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Rejected(failure) => {
                match failure.class() {
                    FailureClass::Authentication | FailureClass::Permission => {
                        warn!(code = failure.code(), "Request rejected: {}", failure.detail)
                    }
                    _ => debug!(code = failure.code(), "Request rejected: {}", failure.detail),
                }
                (
                    status_for(failure.class()),
                    ErrorBody {
                        code: failure.code().to_string(),
                        detail: failure.detail,
                    },
                )
            }
            ApiError::Port(PortError::NotFound(what)) => {
                debug!("Port lookup failed: {}", what);
                (
                    StatusCode::NOT_FOUND,
                    ErrorBody {
                        detail: "Not found.".to_string(),
                        code: "not_found".to_string(),
                    },
                )
            }
            other => {
                error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        detail: "An internal error occurred.".to_string(),
                        code: "internal_error".to_string(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
