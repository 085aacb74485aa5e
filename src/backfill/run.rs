//! Per-date results and the run-level aggregate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::error::{BackfillError, BackfillResult};
use crate::calendar::ClosureReason;
use crate::config::FileType;
use crate::validation::error::write_json;
use crate::validation::{QualityReport, ReportError, Severity};

/// Position of a date in the processing state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateState {
    Pending,
    Analyzing,
    ClosureDetected,
    Normal,
    Extracted,
    Transformed,
    Validated,
    LoadedClosure,
    LoadedSuccess,
    Failed,
}

impl DateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateState::Pending => "PENDING",
            DateState::Analyzing => "ANALYZING",
            DateState::ClosureDetected => "CLOSURE_DETECTED",
            DateState::Normal => "NORMAL",
            DateState::Extracted => "EXTRACTED",
            DateState::Transformed => "TRANSFORMED",
            DateState::Validated => "VALIDATED",
            DateState::LoadedClosure => "LOADED_CLOSURE",
            DateState::LoadedSuccess => "LOADED_SUCCESS",
            DateState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DateState::LoadedClosure | DateState::LoadedSuccess | DateState::Failed
        )
    }

    /// Legal moves; any non-terminal state may fail
    pub fn can_transition_to(&self, next: DateState) -> bool {
        use DateState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Pending, Analyzing)
            | (Analyzing, ClosureDetected)
            | (Analyzing, Normal)
            | (ClosureDetected, LoadedClosure)
            | (Normal, Extracted)
            | (Extracted, Transformed)
            | (Transformed, Validated)
            | (Validated, LoadedSuccess) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered path of one date through the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTrail {
    date: NaiveDate,
    states: Vec<DateState>,
}

impl StateTrail {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            states: vec![DateState::Pending],
        }
    }

    pub fn current(&self) -> DateState {
        self.states.last().copied().unwrap_or(DateState::Pending)
    }

    pub fn advance(&mut self, next: DateState) -> BackfillResult<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(BackfillError::InvalidTransition {
                date: self.date,
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        self.states.push(next);
        Ok(())
    }

    pub fn states(&self) -> &[DateState] {
        &self.states
    }

    pub fn into_states(self) -> Vec<DateState> {
        self.states
    }
}

/// Terminal classification of a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOutcome {
    Succeeded,
    Closure,
    Failed,
}

impl fmt::Display for DateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateOutcome::Succeeded => write!(f, "succeeded"),
            DateOutcome::Closure => write!(f, "closure"),
            DateOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Immutable result of one date, produced by a worker
#[derive(Debug, Clone, Serialize)]
pub struct DateProcessingResult {
    pub date: NaiveDate,
    pub outcome: DateOutcome,
    pub records_loaded: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closure_reason: Option<ClosureReason>,
    /// Quality status of the date, absent for closures and early failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_status: Option<Severity>,
    /// Rows per file after normalization
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub file_rows: BTreeMap<FileType, usize>,
    /// Files withheld from loading by CRITICAL schema violations
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_files: Vec<FileType>,
    pub states: Vec<DateState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    /// Full quality report; persisted separately
    #[serde(skip)]
    pub quality_report: Option<QualityReport>,
}

impl DateProcessingResult {
    /// Empty result for `date`; failed until an outcome is set
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            outcome: DateOutcome::Failed,
            records_loaded: 0,
            duration_ms: 0,
            failure_reason: None,
            closure_reason: None,
            overall_status: None,
            file_rows: BTreeMap::new(),
            blocked_files: Vec::new(),
            states: Vec::new(),
            report_path: None,
            quality_report: None,
        }
    }

    /// A date that failed before or during the pipeline
    pub fn failed(date: NaiveDate, reason: impl Into<String>, states: Vec<DateState>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            states,
            ..Self::new(date)
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == DateOutcome::Failed
    }
}

/// Lifecycle of a backfill run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    /// Stopped by an abort signal; not every date was dispatched
    Aborted,
}

/// Aggregate of one backfill run, folded on the coordinating thread
#[derive(Debug, Clone)]
pub struct BackfillRun {
    pub run_id: String,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Dates skipped because the warehouse already held them
    pub skipped: Vec<NaiveDate>,
    /// Dates never dispatched because of an abort or drain timeout
    pub not_started: Vec<NaiveDate>,
    results: BTreeMap<NaiveDate, DateProcessingResult>,
}

impl BackfillRun {
    pub fn new(run_id: impl Into<String>, config_hash: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            config_hash: config_hash.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            skipped: Vec::new(),
            not_started: Vec::new(),
            results: BTreeMap::new(),
        }
    }

    /// Fold one date result into the aggregate
    pub fn record(&mut self, result: DateProcessingResult) -> BackfillResult<()> {
        if self.results.contains_key(&result.date) {
            return Err(BackfillError::DuplicateResult(result.date));
        }
        self.results.insert(result.date, result);
        Ok(())
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn results(&self) -> impl Iterator<Item = &DateProcessingResult> {
        self.results.values()
    }

    pub fn result(&self, date: NaiveDate) -> Option<&DateProcessingResult> {
        self.results.get(&date)
    }

    pub fn total_dates(&self) -> usize {
        self.results.len()
    }

    fn count(&self, outcome: DateOutcome) -> usize {
        self.results().filter(|r| r.outcome == outcome).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(DateOutcome::Succeeded)
    }

    pub fn closure_count(&self) -> usize {
        self.count(DateOutcome::Closure)
    }

    pub fn failed_count(&self) -> usize {
        self.count(DateOutcome::Failed)
    }

    pub fn records_total(&self) -> usize {
        self.results().map(|r| r.records_loaded).sum()
    }

    /// Failed dates with their reasons, in date order
    pub fn failed_dates(&self) -> Vec<(NaiveDate, &str)> {
        self.results()
            .filter(|r| r.is_failed())
            .map(|r| (r.date, r.failure_reason.as_deref().unwrap_or("unknown")))
            .collect()
    }

    pub fn closure_dates(&self) -> Vec<NaiveDate> {
        self.results()
            .filter(|r| r.outcome == DateOutcome::Closure)
            .map(|r| r.date)
            .collect()
    }

    /// Share of processed dates that did not fail, in percent
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        (self.total_dates() - self.failed_count()) as f64 / self.total_dates() as f64 * 100.0
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    /// Duration as HH:MM:SS
    pub fn duration_formatted(&self) -> String {
        let secs = self.duration().num_seconds().max(0);
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    /// Default run log location under a reports directory
    pub fn default_path(reports_dir: &Path, run_id: &str) -> PathBuf {
        reports_dir.join(format!("backfill_{run_id}.json"))
    }

    /// Save the run log as pretty JSON under `reports_dir`
    pub fn save(&self, reports_dir: &Path) -> Result<PathBuf, ReportError> {
        write_json(Self::default_path(reports_dir, &self.run_id), self)
    }
}

#[derive(Serialize)]
struct RunTotals {
    dates: usize,
    succeeded: usize,
    closures: usize,
    failed: usize,
    skipped: usize,
    not_started: usize,
    records_loaded: usize,
    success_rate: f64,
}

#[derive(Serialize)]
struct FailedDate<'a> {
    date: NaiveDate,
    reason: &'a str,
}

#[derive(Serialize)]
struct BackfillRunView<'a> {
    run_id: &'a str,
    config_hash: &'a str,
    status: RunStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    duration: String,
    totals: RunTotals,
    failed_dates: Vec<FailedDate<'a>>,
    closure_dates: Vec<NaiveDate>,
    skipped: &'a [NaiveDate],
    not_started: &'a [NaiveDate],
    results: Vec<&'a DateProcessingResult>,
}

impl Serialize for BackfillRun {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BackfillRunView {
            run_id: &self.run_id,
            config_hash: &self.config_hash,
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration: self.duration_formatted(),
            totals: RunTotals {
                dates: self.total_dates(),
                succeeded: self.succeeded_count(),
                closures: self.closure_count(),
                failed: self.failed_count(),
                skipped: self.skipped.len(),
                not_started: self.not_started.len(),
                records_loaded: self.records_total(),
                success_rate: self.success_rate(),
            },
            failed_dates: self
                .failed_dates()
                .into_iter()
                .map(|(date, reason)| FailedDate { date, reason })
                .collect(),
            closure_dates: self.closure_dates(),
            skipped: &self.skipped,
            not_started: &self.not_started,
            results: self.results().collect(),
        }
        .serialize(serializer)
    }
}
