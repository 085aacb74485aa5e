//! POS ETL - Daily export ingestion and historical backfill
//!
//! Provides unified building blocks for:
//! - Column/type normalization of raw POS exports
//! - Schema enforcement and data validation
//! - Per-date quality reports with cross-file checks
//! - Business closure detection
//! - Parallel, idempotent backfill orchestration

pub mod backfill;
pub mod calendar;
pub mod config;
pub mod models;
pub mod transform;
pub mod validation;

// Re-export commonly used types
pub use backfill::{
    AbortHandle, BackfillError, BackfillManager, BackfillRequest, BackfillResult, BackfillRun,
    DateOutcome, DateProcessingResult, DateSelection, DateState, ExtractionError, Extractor,
    LoadError, LoadPayload, LoadReceipt, Loader, RetryingExtractor, RetryingLoader,
};
pub use calendar::{BusinessCalendar, ClosureDecision, ClosureReason, ClosureRecord, DateMetadata};
pub use config::{
    ConfigError, FileType, FileTypeConfig, FileTypeRegistry, PipelineConfig, RetryPolicy,
};
pub use models::{ColumnType, RawTable, TransformedTable, Value};
pub use transform::{NormalizedFile, normalize, sanitize};
pub use validation::{
    QualityChecker, QualityReport, Severity, ValidationIssue, enforce_schema,
};
