//! Build error types.

use thiserror::Error;

/// Errors raised while building firmware or maintaining the build tree.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// The compiler exited non-zero. Carries its stderr verbatim.
    #[error("{stderr}")]
    CompileFailed { stderr: String },

    #[error("compilation timed out after {0} seconds")]
    CompileTimedOut(u64),

    #[error("Build completed but firmware file not found in any location")]
    ArtifactNotFound,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("update failed: {0}")]
    Update(String),
}

impl BuildError {
    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Toolchain(_) => "toolchain",
            Self::CompileFailed { .. } => "compile_failed",
            Self::CompileTimedOut(_) => "compile_timeout",
            Self::ArtifactNotFound => "artifact_not_found",
            Self::Config(_) => "config",
            Self::Update(_) => "update",
        }
    }
}

impl From<mtfw_core::Error> for BuildError {
    fn from(e: mtfw_core::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for build operations.
pub type BuildResult<T> = std::result::Result<T, BuildError>;
