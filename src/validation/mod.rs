//! Schema enforcement, data validation and per-date quality reports

pub mod error;
pub mod issue;
pub mod quality;
pub mod rules;
pub mod schema;

pub use error::ReportError;
pub use issue::{IssueCategory, Rule, Severity, ValidationIssue, max_severity};
pub use quality::{
    FileReport, QualityChecker, QualityOutcome, QualityReport, Recommendation, VolumeBaseline,
};
pub use rules::DataValidator;
pub use schema::{SchemaEnforcement, enforce_schema};
