//! Error types for the Windowguard service.

use thiserror::Error;

/// Main error type for Windowguard operations.
#[derive(Error, Debug)]
pub enum WindowGuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No limiter is registered under the requested policy name
    #[error("Unknown rate limit policy: {0}")]
    UnknownPolicy(String),

    /// Malformed request from an HTTP caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The identifier has exhausted its quota for the current window
    #[error("Rate limit exceeded. Retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for WindowGuardError {
    fn from(err: ::config::ConfigError) -> Self {
        WindowGuardError::Config(err.to_string())
    }
}

/// Result type alias for Windowguard operations.
pub type Result<T> = std::result::Result<T, WindowGuardError>;
