//! Error types for backfill runs and their collaborators
//!
//! Collaborator errors ([`ExtractionError`], [`LoadError`]) report whether
//! they are transient so retries stay inside the collaborator boundary.
//! A date that still fails after retries is recorded on the run as data;
//! only run-level failures surface as [`BackfillError`].

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::ConfigError;
use crate::validation::ReportError;

/// Errors from the extraction collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Network or source hiccup, worth retrying
    #[error("Transient extraction failure: {0}")]
    Transient(String),

    /// Nothing exported for the requested date
    #[error("No export found for {0}")]
    NotFound(NaiveDate),

    /// Export present but unreadable
    #[error("Malformed export: {0}")]
    Malformed(String),
}

impl ExtractionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractionError::Transient(_))
    }
}

impl From<csv::Error> for ExtractionError {
    fn from(err: csv::Error) -> Self {
        ExtractionError::Malformed(err.to_string())
    }
}

/// Errors from the loader collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Warehouse unavailable or throttled, worth retrying
    #[error("Transient load failure: {0}")]
    Transient(String),

    /// Warehouse refused the rows
    #[error("Load rejected for {table}: {message}")]
    Rejected { table: String, message: String },
}

impl LoadError {
    pub fn rejected(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, LoadError::Transient(_))
    }
}

/// Run-level failures
#[derive(Error, Debug)]
pub enum BackfillError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listing candidate dates failed
    #[error("Date discovery failed: {0}")]
    Discovery(#[source] ExtractionError),

    /// Date range with start after end
    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// Worker pool could not be built
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Writing the run log failed
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// A date was folded into the run twice
    #[error("Duplicate result for {0}")]
    DuplicateResult(NaiveDate),

    /// Illegal state machine transition
    #[error("Invalid transition for {date}: {from} -> {to}")]
    InvalidTransition {
        date: NaiveDate,
        from: String,
        to: String,
    },
}

/// Result type for backfill operations
pub type BackfillResult<T> = Result<T, BackfillError>;

impl BackfillError {
    /// Check if retrying the whole run may help
    pub fn is_recoverable(&self) -> bool {
        match self {
            BackfillError::Discovery(e) => e.is_transient(),
            BackfillError::Report(ReportError::Io { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            BackfillError::Config(e) => {
                format!("Configuration error: {e}\n\nHint: Check your pipeline configuration file.")
            }
            BackfillError::Discovery(e) => {
                format!(
                    "Could not list available dates: {e}\n\nHint: Check connectivity to the export source."
                )
            }
            BackfillError::InvalidRange { start, end } => {
                format!(
                    "Invalid date range: {start} is after {end}\n\nHint: Swap the start and end dates."
                )
            }
            BackfillError::Report(e) => {
                format!(
                    "Could not write report: {e}\n\nHint: Check that the reports directory is writable."
                )
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExtractionError::Transient("timeout".into()).is_transient());
        assert!(!ExtractionError::Malformed("bad csv".into()).is_transient());
        assert!(LoadError::Transient("throttled".into()).is_transient());
        assert!(!LoadError::rejected("order_details", "schema").is_transient());
    }

    #[test]
    fn test_user_message() {
        let err = BackfillError::Discovery(ExtractionError::Transient("timeout".into()));
        assert!(err.is_recoverable());
        let msg = err.user_message();
        assert!(msg.contains("timeout"));
        assert!(msg.contains("Hint:"));

        let err = BackfillError::Config(ConfigError::Invalid("max_workers must be > 0".into()));
        assert!(!err.is_recoverable());
        assert!(err.user_message().contains("max_workers"));
    }

    #[test]
    fn test_csv_error_is_malformed() {
        let err = csv::ReaderBuilder::new()
            .from_reader("a,b\n1,2,3\n".as_bytes())
            .records()
            .find_map(Result::err)
            .unwrap();
        assert!(matches!(ExtractionError::from(err), ExtractionError::Malformed(_)));
    }
}
