//! Error types for varanno

use thiserror::Error;

/// Result type alias for varanno operations
pub type Result<T> = std::result::Result<T, VarannoError>;

/// Errors raised outside the annotation path itself: configuration,
/// persistence, and serialization.
#[derive(Error, Debug)]
pub enum VarannoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Annotation store error: {0}")]
    Store(String),
}

impl VarannoError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
