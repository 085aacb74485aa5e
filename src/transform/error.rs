//! Error types for header mapping and cell conversion
//!
//! Neither error aborts a file: the normalizer turns them into WARNING
//! issues and carries on with the remaining columns and rows.

use thiserror::Error;

use crate::models::ColumnType;

/// A raw header that cannot be turned into a canonical column name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Header '{header}' does not sanitize to a valid column name")]
pub struct MappingError {
    pub header: String,
}

/// A cell that cannot be converted to its declared type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Value does not parse as the target type
    #[error("Cannot convert '{value}' to {target}")]
    Type { value: String, target: ColumnType },

    /// Duration text matches none of the accepted forms
    #[error("Unrecognised duration '{0}'")]
    Duration(String),
}

impl ConversionError {
    pub fn type_error(value: impl Into<String>, target: ColumnType) -> Self {
        Self::Type {
            value: value.into(),
            target,
        }
    }

    /// The offending input
    pub fn value(&self) -> &str {
        match self {
            ConversionError::Type { value, .. } => value,
            ConversionError::Duration(value) => value,
        }
    }
}
