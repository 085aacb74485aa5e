//! Pipeline configuration
//!
//! Two immutable values drive the pipeline:
//!
//! - [`FileTypeRegistry`]: per-export column mappings, target schemas and rules
//! - [`PipelineConfig`]: worker settings, closure and quality thresholds, retries
//!
//! Both load from TOML and fall back to built-in defaults.

pub mod error;
pub mod file_types;
pub mod settings;
mod standard;

pub use error::{ConfigError, ConfigResult};
pub use file_types::{
    CardDigitsRule, CategoryRule, ColumnMapping, ColumnSpec, FileType, FileTypeConfig,
    FileTypeRegistry, LengthRule, MonetaryRule, PROCESSING_DATE_COLUMN, RangeRule,
    ReferentialRule, SpecialRule, ValidationRules,
};
pub use settings::{
    BackfillSettings, ClosureThresholds, PipelineConfig, QualityThresholds, RetryPolicy,
};
