//! Error types for chatrelay

use thiserror::Error;

/// Main error type for chatrelay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),

    /// Generator client construction errors
    #[error("Generator error: {0}")]
    Generator(String),

    /// Fetcher client construction errors
    #[error("Fetcher error: {0}")]
    Fetcher(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for chatrelay operations
pub type Result<T> = std::result::Result<T, RelayError>;
