//! Error types for track descriptor handling

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading descriptors or writing gbp.conf
#[derive(Error, Debug)]
pub enum TracksError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No distro section matched
    #[error("No track section matches distro '{distro}'")]
    SectionNotFound { distro: String },

    /// No tracks file next to a package
    #[error("No tracks.yaml found for {}", path.display())]
    TracksNotFound { path: PathBuf },

    /// package.xml could not be parsed
    #[error("Manifest error: {message}")]
    Manifest { message: String },

    /// Package directory is missing
    #[error("Package directory does not exist: {}", path.display())]
    MissingDirectory { path: PathBuf },
}

/// Result type alias for track operations
pub type Result<T> = std::result::Result<T, TracksError>;

impl TracksError {
    /// Create a manifest error
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest { message: message.into() }
    }

    /// Whether the error means "nothing to do for this package" rather than
    /// a broken environment
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::SectionNotFound { .. } | Self::TracksNotFound { .. })
    }
}
