//! Error types for configuration loading

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or validating pipeline configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML could not be parsed into the expected shape
    #[error("Invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of its permitted range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// File type name not recognised
    #[error("Unknown file type: {0}")]
    UnknownFileType(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
