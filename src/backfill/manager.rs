//! Backfill orchestration across many dates
//!
//! The coordinator thread discovers and filters dates, dispatches them in
//! fixed-size batches onto a bounded worker pool, and folds the immutable
//! per-date results it receives over a channel into the [`BackfillRun`].
//! Workers never touch the aggregate.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeSet, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::error::{BackfillError, BackfillResult};
use super::pipeline::DatePipeline;
use super::ports::{Extractor, Loader};
use super::retry::{RetryingExtractor, RetryingLoader};
use super::run::{BackfillRun, DateOutcome, DateProcessingResult, DateState, RunStatus};
use crate::config::{FileTypeRegistry, PipelineConfig};
use crate::validation::VolumeBaseline;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const ABANDONED_REASON: &str = "abandoned after drain timeout; load may have completed";

/// Which dates a run should consider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSelection {
    /// Every date the extractor lists
    All,
    /// Listed dates within an inclusive range
    Range { start: NaiveDate, end: NaiveDate },
    /// Exactly these dates, listed or not
    Dates(Vec<NaiveDate>),
}

/// Parameters of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillRequest {
    pub selection: DateSelection,
    /// Reprocess dates the warehouse already holds
    pub force: bool,
}

impl BackfillRequest {
    pub fn all() -> Self {
        Self {
            selection: DateSelection::All,
            force: false,
        }
    }

    pub fn range(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            selection: DateSelection::Range { start, end },
            force: false,
        }
    }

    pub fn dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            selection: DateSelection::Dates(dates.into_iter().collect()),
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Dates a run would process, after skip filtering
#[derive(Debug, Clone, Default)]
pub struct BackfillPlan {
    pub to_process: Vec<NaiveDate>,
    pub skipped: Vec<NaiveDate>,
    /// Dates whose existence check failed; recorded as failed
    pub failed_checks: Vec<DateProcessingResult>,
}

/// Cooperative abort signal shared with the coordinator and workers
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

enum WorkerMessage {
    Done(Box<DateProcessingResult>),
    /// Dequeued after an abort; never started
    NotStarted(NaiveDate),
}

/// Drives a backfill over the extraction and loader collaborators
///
/// Both collaborators are wrapped with the configured [`RetryPolicy`], so a
/// date only fails once its transient errors exhaust the retries.
///
/// [`RetryPolicy`]: crate::config::RetryPolicy
pub struct BackfillManager<E, L> {
    config: PipelineConfig,
    pipeline: Arc<DatePipeline>,
    extractor: Arc<RetryingExtractor<E>>,
    loader: Arc<RetryingLoader<L>>,
    abort: AbortHandle,
}

impl<E, L> BackfillManager<E, L>
where
    E: Extractor + 'static,
    L: Loader + 'static,
{
    pub fn new(
        config: PipelineConfig,
        registry: FileTypeRegistry,
        extractor: E,
        loader: L,
    ) -> BackfillResult<Self> {
        config.validate()?;
        registry.validate()?;
        let pipeline = DatePipeline::new(&config, Arc::new(registry));
        let extractor = RetryingExtractor::new(extractor, config.retry.clone());
        let loader = RetryingLoader::new(loader, config.retry.clone());
        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            extractor: Arc::new(extractor),
            loader: Arc::new(loader),
            abort: AbortHandle::default(),
        })
    }

    /// Share an abort signal owned elsewhere, e.g. by a signal handler
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Pin "now" for future-timestamp checks
    pub fn with_reference_time(mut self, reference_time: NaiveDateTime) -> Self {
        let pipeline = self.pipeline.as_ref().clone().with_reference_time(reference_time);
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn extractor(&self) -> &E {
        self.extractor.inner()
    }

    pub fn loader(&self) -> &L {
        self.loader.inner()
    }

    /// Handle to stop dispatching further dates
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Candidate dates, deduplicated and sorted
    fn candidates(&self, selection: &DateSelection) -> BackfillResult<Vec<NaiveDate>> {
        let dates: BTreeSet<NaiveDate> = match selection {
            DateSelection::All => self.list_dates()?.into_iter().collect(),
            DateSelection::Range { start, end } => {
                if start > end {
                    return Err(BackfillError::InvalidRange {
                        start: *start,
                        end: *end,
                    });
                }
                self.list_dates()?
                    .into_iter()
                    .filter(|d| d >= start && d <= end)
                    .collect()
            }
            DateSelection::Dates(dates) => dates.iter().copied().collect(),
        };
        Ok(dates.into_iter().collect())
    }

    fn list_dates(&self) -> BackfillResult<Vec<NaiveDate>> {
        self.extractor
            .list_available_dates()
            .map_err(BackfillError::Discovery)
    }

    /// Resolve candidates and apply skip filtering, without processing anything
    pub fn plan(&self, request: &BackfillRequest) -> BackfillResult<BackfillPlan> {
        let candidates = self.candidates(&request.selection)?;
        let mut plan = BackfillPlan::default();

        if !self.config.backfill.skip_existing || request.force {
            plan.to_process = candidates;
            return Ok(plan);
        }

        for date in candidates {
            match self.loader.has_data(date) {
                Ok(true) => {
                    debug!(date = %date, "Already loaded; skipping");
                    plan.skipped.push(date);
                }
                Ok(false) => plan.to_process.push(date),
                Err(e) => {
                    warn!(date = %date, error = %e, "Existence check failed");
                    plan.failed_checks.push(DateProcessingResult::failed(
                        date,
                        format!("existence check failed: {e}"),
                        vec![DateState::Pending, DateState::Failed],
                    ));
                }
            }
        }
        Ok(plan)
    }

    /// Dates a run would process, without dispatching any work
    pub fn dry_run(&self, request: &BackfillRequest) -> BackfillResult<Vec<NaiveDate>> {
        let plan = self.plan(request)?;
        info!(
            dates = plan.to_process.len(),
            skipped = plan.skipped.len(),
            "Dry run"
        );
        Ok(plan.to_process)
    }

    pub fn run(&self, request: &BackfillRequest) -> BackfillResult<BackfillRun> {
        let mut run = BackfillRun::new(Uuid::new_v4().to_string(), self.config.config_hash());
        let _span = info_span!("backfill_run", run_id = %run.run_id).entered();

        let plan = self.plan(request)?;
        info!(
            dates = plan.to_process.len(),
            skipped = plan.skipped.len(),
            max_workers = self.config.backfill.max_workers,
            batch_size = self.config.backfill.batch_size,
            force = request.force,
            "Starting backfill"
        );
        run.skipped = plan.skipped;
        for result in plan.failed_checks {
            run.record(result)?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.backfill.max_workers)
            .thread_name(|i| format!("backfill-worker-{i}"))
            .build()
            .map_err(|e| BackfillError::WorkerPool(e.to_string()))?;

        let mut baseline = Arc::new(VolumeBaseline::new(self.config.quality.volume_window));
        let batches: Vec<&[NaiveDate]> = plan
            .to_process
            .chunks(self.config.backfill.batch_size)
            .collect();
        let mut aborted = false;

        for (index, batch) in batches.iter().enumerate() {
            if self.abort.is_aborted() {
                aborted = true;
                run.not_started.extend_from_slice(batch);
                continue;
            }
            debug!(batch = index + 1, of = batches.len(), dates = batch.len(), "Dispatching batch");
            let results = self.run_batch(&pool, batch, &baseline, &mut run);

            let snapshot = Arc::make_mut(&mut baseline);
            for result in results {
                if result.outcome == DateOutcome::Succeeded {
                    for (file_type, rows) in &result.file_rows {
                        if !result.blocked_files.contains(file_type) {
                            snapshot.record(*file_type, result.date, *rows);
                        }
                    }
                }
                run.record(result)?;
            }
            if self.abort.is_aborted() {
                aborted = true;
            }
        }

        run.finish(if aborted {
            RunStatus::Aborted
        } else {
            RunStatus::Completed
        });
        info!(
            succeeded = run.succeeded_count(),
            closures = run.closure_count(),
            failed = run.failed_count(),
            skipped = run.skipped.len(),
            not_started = run.not_started.len(),
            records = run.records_total(),
            duration = %run.duration_formatted(),
            "Backfill finished"
        );

        if let Some(dir) = &self.config.backfill.reports_dir {
            let path = run.save(dir)?;
            info!(path = %path.display(), "Run log saved");
        }
        Ok(run)
    }

    /// Dispatch one batch and collect its results on this thread
    fn run_batch(
        &self,
        pool: &rayon::ThreadPool,
        batch: &[NaiveDate],
        baseline: &Arc<VolumeBaseline>,
        run: &mut BackfillRun,
    ) -> Vec<DateProcessingResult> {
        let (tx, rx) = mpsc::channel();
        for &date in batch {
            let tx = tx.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let extractor = Arc::clone(&self.extractor);
            let loader = Arc::clone(&self.loader);
            let baseline = Arc::clone(baseline);
            let abort = self.abort.clone();
            pool.spawn(move || {
                let message = if abort.is_aborted() {
                    WorkerMessage::NotStarted(date)
                } else {
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        pipeline.process(extractor.as_ref(), loader.as_ref(), date, &baseline)
                    }));
                    let result = outcome.unwrap_or_else(|_| {
                        DateProcessingResult::failed(
                            date,
                            "worker panicked",
                            vec![DateState::Pending, DateState::Failed],
                        )
                    });
                    WorkerMessage::Done(Box::new(result))
                };
                // The coordinator may have stopped listening after a drain timeout
                let _ = tx.send(message);
            });
        }
        drop(tx);

        let mut in_flight: HashSet<NaiveDate> = batch.iter().copied().collect();
        let mut results = Vec::with_capacity(batch.len());
        let mut drain_deadline: Option<Instant> = None;

        while !in_flight.is_empty() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(WorkerMessage::Done(result)) => {
                    in_flight.remove(&result.date);
                    results.push(*result);
                }
                Ok(WorkerMessage::NotStarted(date)) => {
                    in_flight.remove(&date);
                    run.not_started.push(date);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !self.abort.is_aborted() {
                        continue;
                    }
                    let deadline = *drain_deadline.get_or_insert_with(|| {
                        warn!(in_flight = in_flight.len(), "Abort requested; draining");
                        Instant::now() + self.config.backfill.drain_timeout()
                    });
                    if Instant::now() >= deadline {
                        error!(in_flight = in_flight.len(), "Drain timeout exceeded");
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Whatever is still in flight is abandoned, not silently dropped
        let mut abandoned: Vec<NaiveDate> = in_flight.into_iter().collect();
        abandoned.sort();
        for date in abandoned {
            results.push(DateProcessingResult::failed(
                date,
                ABANDONED_REASON,
                vec![DateState::Pending, DateState::Failed],
            ));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backfill::error::{ExtractionError, LoadError};
    use crate::backfill::ports::{LoadPayload, LoadReceipt};
    use crate::calendar::DateMetadata;
    use crate::config::{FileType, RetryPolicy};
    use crate::models::RawTable;
    use std::collections::BTreeMap;

    struct Listing(Vec<NaiveDate>);

    impl Extractor for Listing {
        fn list_available_dates(&self) -> Result<Vec<NaiveDate>, ExtractionError> {
            Ok(self.0.clone())
        }

        fn get_metadata(&self, _date: NaiveDate) -> Result<DateMetadata, ExtractionError> {
            Ok(DateMetadata::default())
        }

        fn fetch_files(
            &self,
            _date: NaiveDate,
        ) -> Result<BTreeMap<FileType, RawTable>, ExtractionError> {
            Ok(BTreeMap::new())
        }
    }

    struct Existing(Vec<NaiveDate>);

    impl Loader for Existing {
        fn has_data(&self, date: NaiveDate) -> Result<bool, LoadError> {
            if date.format("%d").to_string() == "13" {
                return Err(LoadError::Transient("unreachable".into()));
            }
            Ok(self.0.contains(&date))
        }

        fn load(&self, _table: &str, payload: LoadPayload<'_>) -> Result<LoadReceipt, LoadError> {
            Ok(LoadReceipt {
                rows_written: payload.row_count(),
            })
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    fn manager(listed: &[u32], existing: &[u32]) -> BackfillManager<Listing, Existing> {
        BackfillManager::new(
            PipelineConfig::default().with_retry(RetryPolicy::immediate(2)),
            FileTypeRegistry::standard(),
            Listing(listed.iter().map(|d| day(*d)).collect()),
            Existing(existing.iter().map(|d| day(*d)).collect()),
        )
        .unwrap()
    }

    #[test]
    fn test_candidates_are_deduplicated_and_sorted() {
        let m = manager(&[3, 1, 2, 1], &[]);
        let plan = m.plan(&BackfillRequest::all()).unwrap();
        assert_eq!(plan.to_process, vec![day(1), day(2), day(3)]);
    }

    #[test]
    fn test_range_intersects_listing() {
        let m = manager(&[1, 5, 9, 20], &[]);
        let plan = m.plan(&BackfillRequest::range(day(2), day(9))).unwrap();
        assert_eq!(plan.to_process, vec![day(5), day(9)]);

        assert!(matches!(
            m.plan(&BackfillRequest::range(day(9), day(2))),
            Err(BackfillError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_skip_existing_and_force() {
        let m = manager(&[1, 2, 3], &[2]);
        let plan = m.plan(&BackfillRequest::all()).unwrap();
        assert_eq!(plan.to_process, vec![day(1), day(3)]);
        assert_eq!(plan.skipped, vec![day(2)]);

        let forced = m.plan(&BackfillRequest::all().with_force(true)).unwrap();
        assert_eq!(forced.to_process, vec![day(1), day(2), day(3)]);
        assert!(forced.skipped.is_empty());
    }

    #[test]
    fn test_existence_check_error_fails_date() {
        let m = manager(&[12, 13], &[]);
        let plan = m.plan(&BackfillRequest::all()).unwrap();
        assert_eq!(plan.to_process, vec![day(12)]);
        assert_eq!(plan.failed_checks.len(), 1);
        assert_eq!(plan.failed_checks[0].date, day(13));
    }

    #[test]
    fn test_explicit_dates_bypass_listing() {
        let m = manager(&[], &[]);
        assert_eq!(
            m.dry_run(&BackfillRequest::dates([day(4), day(4), day(2)])).unwrap(),
            vec![day(2), day(4)]
        );
    }

    #[test]
    fn test_abort_before_run_dispatches_nothing() {
        let m = manager(&[1, 2, 3], &[]);
        m.abort_handle().abort();
        let run = m.run(&BackfillRequest::all()).unwrap();
        assert_eq!(run.status, RunStatus::Aborted);
        assert_eq!(run.total_dates(), 0);
        assert_eq!(run.not_started, vec![day(1), day(2), day(3)]);
    }

    #[test]
    fn test_run_records_every_date() {
        let m = manager(&[1, 2, 3, 4, 5], &[]);
        let run = m.run(&BackfillRequest::all()).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.total_dates(), 5);
        // default metadata reports no files
        assert_eq!(run.closure_count(), 5);
    }
}
