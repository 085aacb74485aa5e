//! Collaborator interfaces consumed by the backfill pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{ExtractionError, LoadError};
use crate::calendar::{ClosureRecord, DateMetadata};
use crate::config::FileType;
use crate::models::{RawTable, TransformedTable};

/// Source of daily POS exports
///
/// Implementations are called from worker threads and must be thread-safe.
pub trait Extractor: Send + Sync {
    /// Dates for which exports exist
    fn list_available_dates(&self) -> Result<Vec<NaiveDate>, ExtractionError>;

    /// Activity estimate without downloading file contents
    fn get_metadata(&self, date: NaiveDate) -> Result<DateMetadata, ExtractionError>;

    /// Every export present for `date`
    fn fetch_files(&self, date: NaiveDate) -> Result<BTreeMap<FileType, RawTable>, ExtractionError>;
}

/// Rows handed to the warehouse
#[derive(Debug, Clone, Copy)]
pub enum LoadPayload<'a> {
    Table(&'a TransformedTable),
    Closure(&'a [ClosureRecord]),
}

impl LoadPayload<'_> {
    pub fn row_count(&self) -> usize {
        match self {
            LoadPayload::Table(table) => table.row_count(),
            LoadPayload::Closure(records) => records.len(),
        }
    }
}

/// Acknowledgement of a load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReceipt {
    pub rows_written: usize,
}

/// Warehouse sink
pub trait Loader: Send + Sync {
    /// Whether the warehouse already holds data for `date`
    fn has_data(&self, date: NaiveDate) -> Result<bool, LoadError>;

    fn load(&self, table_name: &str, payload: LoadPayload<'_>) -> Result<LoadReceipt, LoadError>;
}

impl<T: Extractor + ?Sized> Extractor for std::sync::Arc<T> {
    fn list_available_dates(&self) -> Result<Vec<NaiveDate>, ExtractionError> {
        (**self).list_available_dates()
    }

    fn get_metadata(&self, date: NaiveDate) -> Result<DateMetadata, ExtractionError> {
        (**self).get_metadata(date)
    }

    fn fetch_files(&self, date: NaiveDate) -> Result<BTreeMap<FileType, RawTable>, ExtractionError> {
        (**self).fetch_files(date)
    }
}

impl<T: Loader + ?Sized> Loader for std::sync::Arc<T> {
    fn has_data(&self, date: NaiveDate) -> Result<bool, LoadError> {
        (**self).has_data(date)
    }

    fn load(&self, table_name: &str, payload: LoadPayload<'_>) -> Result<LoadReceipt, LoadError> {
        (**self).load(table_name, payload)
    }
}
