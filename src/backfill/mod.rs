//! Backfill orchestration
//!
//! - [`BackfillManager`]: discovers dates, filters existing ones and
//!   dispatches the rest onto a bounded worker pool
//! - [`DatePipeline`]: the per-date state machine, closure or normal path
//! - [`Extractor`] / [`Loader`]: collaborator interfaces, with retrying
//!   wrappers for transient failures
//! - [`BackfillRun`]: the persisted run log

pub mod error;
pub mod manager;
pub mod pipeline;
pub mod ports;
pub mod retry;
pub mod run;

pub use error::{BackfillError, BackfillResult, ExtractionError, LoadError};
pub use manager::{AbortHandle, BackfillManager, BackfillPlan, BackfillRequest, DateSelection};
pub use pipeline::DatePipeline;
pub use ports::{Extractor, LoadPayload, LoadReceipt, Loader};
pub use retry::{RetryingExtractor, RetryingLoader, with_retry};
pub use run::{
    BackfillRun, DateOutcome, DateProcessingResult, DateState, RunStatus, StateTrail,
};
