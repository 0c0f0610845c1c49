//! Error types for escalate-core.

use thiserror::Error;

/// Result type alias using escalate-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during escalation operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Judge transport error (HTTP failure, timeout, bad status)
    #[error("Judge transport error: {0}")]
    Transport(String),

    /// Structured judge output failed parsing or schema validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Dataset file I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error is worth retrying (transport and validation
    /// failures are both transient from the caller's perspective).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Validation(_))
    }
}
