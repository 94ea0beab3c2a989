//! Error types for walstream core library.

use thiserror::Error;

/// Result type alias using walstream Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for walstream operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
