//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid form: {0}")]
    InvalidForm(String),

    #[error("invalid channel count: {0:?} (expected a non-negative integer)")]
    InvalidChannelCount(String),

    #[error("invalid build id: {0}")]
    InvalidBuildId(String),

    #[error("invalid version file: {0}")]
    InvalidVersionFile(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
