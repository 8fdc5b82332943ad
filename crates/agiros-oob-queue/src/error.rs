//! Error types for queue persistence

use thiserror::Error;

/// Errors raised while writing the queue
#[derive(Error, Debug)]
pub enum QueueError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON rendering error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Package not present in the queue
    #[error("Package not in queue: {name}")]
    UnknownPackage { name: String },
}

/// Result type alias for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;
