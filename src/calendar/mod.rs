//! Business calendar: closure detection and synthetic closure records
//!
//! A date with no or negligible POS activity is not left empty in the
//! warehouse. Instead every target table receives one zero-valued record
//! flagged with `closure_indicator = true`, so daily reporting stays
//! continuous.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{
    ClosureThresholds, FileType, FileTypeConfig, FileTypeRegistry, PROCESSING_DATE_COLUMN,
};
use crate::models::{ColumnType, Value};

/// Placeholder written to identifier columns of closure records
pub const CLOSURE_PLACEHOLDER: &str = "CLOSURE_RECORD";
pub const CLOSURE_INDICATOR_COLUMN: &str = "closure_indicator";
pub const CLOSURE_REASON_COLUMN: &str = "closure_reason";

/// Lightweight per-date activity estimate, available without downloading files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateMetadata {
    pub files_found: usize,
    pub estimated_records: u64,
    pub estimated_sales: f64,
}

impl DateMetadata {
    pub fn new(files_found: usize, estimated_records: u64, estimated_sales: f64) -> Self {
        Self {
            files_found,
            estimated_records,
            estimated_sales,
        }
    }
}

/// Why a date was classified as a closure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureReason {
    NoFiles,
    InsufficientFiles,
    LowActivity,
    LowSales,
}

impl ClosureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClosureReason::NoFiles => "no_files",
            ClosureReason::InsufficientFiles => "insufficient_files",
            ClosureReason::LowActivity => "low_activity",
            ClosureReason::LowSales => "low_sales",
        }
    }

    /// Human-readable text stored on closure records
    pub fn description(&self) -> &'static str {
        match self {
            ClosureReason::NoFiles => "no data files found",
            ClosureReason::InsufficientFiles => "too few data files found",
            ClosureReason::LowActivity => "minimal activity detected",
            ClosureReason::LowSales => "no sales activity",
        }
    }
}

impl fmt::Display for ClosureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A synthetic zero-activity row for one target table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosureRecord {
    pub file_type: FileType,
    pub table_name: &'static str,
    pub fields: BTreeMap<String, Value>,
}

impl ClosureRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

/// Result of evaluating one date
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureDecision {
    pub is_closure: bool,
    pub reason: Option<ClosureReason>,
    /// One record per configured table when `is_closure`
    pub closure_records: Vec<ClosureRecord>,
}

/// Classifies dates as open or closed and builds closure records
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    thresholds: ClosureThresholds,
    registry: Arc<FileTypeRegistry>,
}

impl BusinessCalendar {
    pub fn new(thresholds: ClosureThresholds, registry: Arc<FileTypeRegistry>) -> Self {
        Self {
            thresholds,
            registry,
        }
    }

    pub fn thresholds(&self) -> &ClosureThresholds {
        &self.thresholds
    }

    /// First matching condition wins:
    /// no files, too few files, too few records, too little sales.
    pub fn detect(&self, meta: &DateMetadata) -> Option<ClosureReason> {
        if meta.files_found == 0 {
            Some(ClosureReason::NoFiles)
        } else if meta.files_found < self.thresholds.min_files_threshold {
            Some(ClosureReason::InsufficientFiles)
        } else if meta.estimated_records < self.thresholds.min_records_threshold {
            Some(ClosureReason::LowActivity)
        } else if meta.estimated_sales < self.thresholds.min_sales_threshold {
            Some(ClosureReason::LowSales)
        } else {
            None
        }
    }

    pub fn evaluate(&self, date: NaiveDate, meta: &DateMetadata) -> ClosureDecision {
        match self.detect(meta) {
            Some(reason) => {
                info!(
                    date = %date,
                    reason = %reason,
                    files_found = meta.files_found,
                    estimated_records = meta.estimated_records,
                    estimated_sales = meta.estimated_sales,
                    "Closure detected"
                );
                ClosureDecision {
                    is_closure: true,
                    reason: Some(reason),
                    closure_records: self.generate_closure_records(date, reason),
                }
            }
            None => {
                debug!(date = %date, files_found = meta.files_found, "Normal business day");
                ClosureDecision {
                    is_closure: false,
                    reason: None,
                    closure_records: Vec::new(),
                }
            }
        }
    }

    /// Exactly one record per configured table, in file type order
    pub fn generate_closure_records(
        &self,
        date: NaiveDate,
        reason: ClosureReason,
    ) -> Vec<ClosureRecord> {
        self.registry
            .iter()
            .map(|config| self.closure_record(config, date, reason))
            .collect()
    }

    fn closure_record(
        &self,
        config: &FileTypeConfig,
        date: NaiveDate,
        reason: ClosureReason,
    ) -> ClosureRecord {
        let identifiers = self.identifier_columns(config);
        let mut fields = BTreeMap::new();

        for spec in &config.schema {
            let value = match spec.column_type {
                ColumnType::Integer => Value::Integer(0),
                ColumnType::Float => Value::Float(0.0),
                ColumnType::String if identifiers.contains(spec.name.as_str()) => {
                    Value::String(CLOSURE_PLACEHOLDER.to_string())
                }
                _ => continue,
            };
            fields.insert(spec.name.clone(), value);
        }

        if let Some(label) = &config.closure_label_column {
            fields.insert(
                label.clone(),
                Value::String(format!("Business Closed - {}", reason.description())),
            );
        }
        fields.insert(PROCESSING_DATE_COLUMN.to_string(), Value::Date(date));
        fields.insert(CLOSURE_INDICATOR_COLUMN.to_string(), Value::Boolean(true));
        fields.insert(
            CLOSURE_REASON_COLUMN.to_string(),
            Value::String(reason.as_str().to_string()),
        );

        ClosureRecord {
            file_type: config.file_type,
            table_name: config.table_name(),
            fields,
        }
    }

    /// Key, required and cross-file join columns of a table
    fn identifier_columns<'a>(&'a self, config: &'a FileTypeConfig) -> BTreeSet<&'a str> {
        let mut columns: BTreeSet<&str> = config
            .rules
            .key_columns
            .iter()
            .map(String::as_str)
            .chain(config.required_columns())
            .collect();
        for rule in self.registry.referential_rules() {
            if rule.parent == config.file_type {
                columns.insert(&rule.parent_key);
            }
            if rule.child == config.file_type {
                columns.insert(&rule.child_key);
            }
        }
        columns
    }
}
