//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mtfw_builder::BuildError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `false`; the web client branches on it.
    pub success: bool,
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub error: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    /// The build ran and failed; carries the compiler's stderr or the reason.
    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Core(#[from] mtfw_core::Error),

    #[error("build error: {0}")]
    Build(#[from] BuildError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Conflict(_) => "conflict",
            Self::BuildFailed(_) => "build_failed",
            Self::Internal(_) => "internal_error",
            Self::Core(_) => "invalid_input",
            Self::Build(e) => e.reason(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BuildFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Build(e) => match e {
                BuildError::Config(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Message sent to the client. I/O failures are logged in full but
    /// reported without paths.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".to_string()
            }
            Self::Build(BuildError::Io(e)) => {
                tracing::error!(error = %e, "I/O error while handling request");
                "Internal server error".to_string()
            }
            Self::Build(BuildError::Config(msg)) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Classify a failed build: bad input stays a 400, everything the
    /// pipeline itself produced becomes `BuildFailed`.
    pub fn from_build_failure(err: BuildError) -> Self {
        match err {
            BuildError::Config(msg) => Self::BadRequest(msg),
            BuildError::Io(_) => Self::Build(err),
            other => Self::BuildFailed(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            code: self.code().to_string(),
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
