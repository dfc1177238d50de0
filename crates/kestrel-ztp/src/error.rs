//! Error types for artifact rendering

use thiserror::Error;

/// Error type for rendering operations
#[derive(Debug, Error)]
pub enum ZtpError {
    /// Template missing, failed to parse, or failed to render
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Filesystem failure while loading or writing an artifact
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rendering operations
pub type Result<T> = std::result::Result<T, ZtpError>;
