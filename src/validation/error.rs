//! Error types for report persistence

use std::path::PathBuf;
use thiserror::Error;

/// Errors writing a quality report or run log to disk
#[derive(Error, Debug)]
pub enum ReportError {
    /// IO error with path context
    #[error("IO error with {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Write pretty JSON, creating the parent directory first
pub(crate) fn write_json<T: serde::Serialize>(path: PathBuf, value: &T) -> Result<PathBuf, ReportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, json).map_err(|e| ReportError::io(&path, e))?;
    Ok(path)
}
