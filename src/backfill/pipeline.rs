//! Processing of a single business date
//!
//! Runs synchronously inside one worker: closure detection, then either the
//! closure path (synthetic records) or the normal path (extract, normalize,
//! check, load). Every failure is captured in the returned
//! [`DateProcessingResult`]; nothing here panics or returns `Err`.

use chrono::{NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

use super::ports::{Extractor, LoadPayload, Loader};
use super::run::{DateOutcome, DateProcessingResult, DateState, StateTrail};
use crate::calendar::BusinessCalendar;
use crate::config::{FileTypeRegistry, PipelineConfig};
use crate::transform::{NormalizedFile, normalize};
use crate::validation::{QualityChecker, VolumeBaseline};

/// Everything a worker needs to process a date; shared read-only
#[derive(Debug, Clone)]
pub struct DatePipeline {
    registry: Arc<FileTypeRegistry>,
    calendar: BusinessCalendar,
    checker: QualityChecker,
    reports_dir: Option<PathBuf>,
}

impl DatePipeline {
    pub fn new(config: &PipelineConfig, registry: Arc<FileTypeRegistry>) -> Self {
        Self {
            calendar: BusinessCalendar::new(config.closure.clone(), registry.clone()),
            checker: QualityChecker::new(registry.clone(), config.quality.clone())
                .with_validation(config.backfill.validation_enabled),
            reports_dir: config.backfill.reports_dir.clone(),
            registry,
        }
    }

    /// Pin "now" for future-timestamp checks
    pub fn with_reference_time(mut self, reference_time: NaiveDateTime) -> Self {
        self.checker = self.checker.with_reference_time(reference_time);
        self
    }

    pub fn process(
        &self,
        extractor: &dyn Extractor,
        loader: &dyn Loader,
        date: NaiveDate,
        baseline: &VolumeBaseline,
    ) -> DateProcessingResult {
        let _span = info_span!("backfill_date", date = %date).entered();
        let start = Instant::now();
        let mut trail = StateTrail::new(date);
        let mut result = DateProcessingResult::new(date);

        match self.execute(extractor, loader, date, baseline, &mut trail, &mut result) {
            Ok(outcome) => {
                result.outcome = outcome;
                info!(
                    outcome = %outcome,
                    records = result.records_loaded,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Date processed"
                );
            }
            Err(reason) => {
                if let Err(e) = trail.advance(DateState::Failed) {
                    error!(error = %e, "Could not record failure state");
                }
                error!(state = %trail.current(), reason = %reason, "Date failed");
                result.outcome = DateOutcome::Failed;
                result.failure_reason = Some(reason);
            }
        }

        result.states = trail.into_states();
        result.with_duration_ms(start.elapsed().as_millis() as u64)
    }

    fn execute(
        &self,
        extractor: &dyn Extractor,
        loader: &dyn Loader,
        date: NaiveDate,
        baseline: &VolumeBaseline,
        trail: &mut StateTrail,
        result: &mut DateProcessingResult,
    ) -> Result<DateOutcome, String> {
        advance(trail, DateState::Analyzing)?;
        let meta = extractor
            .get_metadata(date)
            .map_err(|e| format!("metadata unavailable: {e}"))?;
        let decision = self.calendar.evaluate(date, &meta);

        if let Some(reason) = decision.reason {
            advance(trail, DateState::ClosureDetected)?;
            result.closure_reason = Some(reason);
            for record in &decision.closure_records {
                let receipt = loader
                    .load(record.table_name, LoadPayload::Closure(std::slice::from_ref(record)))
                    .map_err(|e| format!("closure load into {} failed: {e}", record.table_name))?;
                result.records_loaded += receipt.rows_written;
            }
            advance(trail, DateState::LoadedClosure)?;
            return Ok(DateOutcome::Closure);
        }

        advance(trail, DateState::Normal)?;
        let raw_files = extractor
            .fetch_files(date)
            .map_err(|e| format!("extraction failed: {e}"))?;
        advance(trail, DateState::Extracted)?;

        let mut normalized: Vec<NormalizedFile> = Vec::with_capacity(raw_files.len());
        for (file_type, raw) in &raw_files {
            let Some(config) = self.registry.get(*file_type) else {
                warn!(file = file_type.file_name(), "No configuration for file; ignored");
                continue;
            };
            let file = normalize(raw, config, date);
            debug!(
                file = file_type.file_name(),
                rows = file.table.row_count(),
                warnings = file.issues.len(),
                "File normalized"
            );
            result.file_rows.insert(*file_type, file.table.row_count());
            normalized.push(file);
        }
        advance(trail, DateState::Transformed)?;

        let outcome = self.checker.check(date, normalized, baseline);
        let report = outcome.report;
        result.overall_status = Some(report.overall_status());
        result.blocked_files = report
            .files
            .iter()
            .filter(|f| !f.loadable)
            .map(|f| f.file_type)
            .collect();
        for file_type in &result.blocked_files {
            warn!(file = file_type.file_name(), "File blocked by CRITICAL schema violation");
        }
        if let Some(dir) = &self.reports_dir {
            match report.save(dir) {
                Ok(path) => result.report_path = Some(path),
                Err(e) => warn!(error = %e, "Could not save quality report"),
            }
        }
        result.quality_report = Some(report);
        advance(trail, DateState::Validated)?;

        if outcome.loadable.is_empty() {
            return Err("no loadable files".to_string());
        }
        for table in &outcome.loadable {
            let receipt = loader
                .load(table.table_name(), LoadPayload::Table(table))
                .map_err(|e| format!("load into {} failed: {e}", table.table_name()))?;
            result.records_loaded += receipt.rows_written;
        }
        advance(trail, DateState::LoadedSuccess)?;
        Ok(DateOutcome::Succeeded)
    }
}

fn advance(trail: &mut StateTrail, state: DateState) -> Result<(), String> {
    trail.advance(state).map_err(|e| e.to_string())
}
