//! Error types for process execution and batch orchestration

use agiros_oob_queue::QueueError;
use agiros_oob_tracks::TracksError;
use thiserror::Error;

/// Build-specific error types
#[derive(Error, Debug)]
pub enum BuildError {
    /// Required directory or file is missing
    #[error("Environment error: {reason}")]
    Environment { reason: String },

    /// A program could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Build execution failed
    #[error("Build execution failed for package {package}: {reason}")]
    BuildExecution { package: String, reason: String },

    /// Queue storage error
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Track descriptor or gbp.conf error
    #[error("Tracks error: {0}")]
    Tracks(#[from] TracksError),

    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] agiros_oob_core::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an environment error
    pub fn environment(reason: impl Into<String>) -> Self {
        Self::Environment { reason: reason.into() }
    }

    /// Create a build execution error
    pub fn build_failed(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BuildExecution { package: package.into(), reason: reason.into() }
    }

    /// Whether the error comes from the surroundings rather than a build
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::Environment { .. } | Self::Spawn { .. })
    }
}
