//! Retry wrappers for the extraction and loader collaborators

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

use super::error::{ExtractionError, LoadError};
use super::ports::{Extractor, LoadPayload, LoadReceipt, Loader};
use crate::calendar::DateMetadata;
use crate::config::{FileType, RetryPolicy};
use crate::models::RawTable;

/// Run `op` until it succeeds, fails permanently or exhausts `policy`
pub fn with_retry<T, E, F>(
    policy: &RetryPolicy,
    operation: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Extractor that retries transient errors
#[derive(Debug, Clone)]
pub struct RetryingExtractor<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: Extractor> RetryingExtractor<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Extractor> Extractor for RetryingExtractor<E> {
    fn list_available_dates(&self) -> Result<Vec<NaiveDate>, ExtractionError> {
        with_retry(
            &self.policy,
            "list_available_dates",
            ExtractionError::is_transient,
            || self.inner.list_available_dates(),
        )
    }

    fn get_metadata(&self, date: NaiveDate) -> Result<DateMetadata, ExtractionError> {
        with_retry(&self.policy, "get_metadata", ExtractionError::is_transient, || {
            self.inner.get_metadata(date)
        })
    }

    fn fetch_files(&self, date: NaiveDate) -> Result<BTreeMap<FileType, RawTable>, ExtractionError> {
        with_retry(&self.policy, "fetch_files", ExtractionError::is_transient, || {
            self.inner.fetch_files(date)
        })
    }
}

/// Loader that retries transient errors
#[derive(Debug, Clone)]
pub struct RetryingLoader<L> {
    inner: L,
    policy: RetryPolicy,
}

impl<L: Loader> RetryingLoader<L> {
    pub fn new(inner: L, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: Loader> Loader for RetryingLoader<L> {
    fn has_data(&self, date: NaiveDate) -> Result<bool, LoadError> {
        with_retry(&self.policy, "has_data", LoadError::is_transient, || {
            self.inner.has_data(date)
        })
    }

    fn load(&self, table_name: &str, payload: LoadPayload<'_>) -> Result<LoadReceipt, LoadError> {
        with_retry(&self.policy, "load", LoadError::is_transient, || {
            self.inner.load(table_name, payload)
        })
    }
}
