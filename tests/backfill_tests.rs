//! End-to-end backfill tests against in-memory collaborators

use chrono::NaiveDate;
use pos_etl::backfill::{
    AbortHandle, BackfillManager, BackfillRequest, DateOutcome, DateState, ExtractionError,
    Extractor, LoadError, LoadPayload, LoadReceipt, Loader, RunStatus,
};
use pos_etl::calendar::{ClosureReason, DateMetadata};
use pos_etl::config::{FileType, FileTypeRegistry, PipelineConfig, RetryPolicy};
use pos_etl::models::{RawTable, TransformedTable, Value};
use pos_etl::validation::{Rule, Severity};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;
use std::sync::mpsc;
use std::time::Duration;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
}

fn busy() -> DateMetadata {
    DateMetadata::new(7, 500, 4_200.0)
}

fn csv(data: &str) -> RawTable {
    RawTable::from_csv_str(data).unwrap()
}

fn orders() -> RawTable {
    csv("Location,Order Id,Opened,Total,Duration (Opened to Paid)\n\
         Main,o1,04/02/24 11:05 AM,25.00,\"45 minutes\"\n\
         Main,o2,04/02/24 12:10 PM,31.50,\"1 hour, 5 minutes\"\n")
}

fn payments() -> RawTable {
    csv("Payment Id,Order Id,Amount\np1,o1,25.00\np2,o2,31.50\n")
}

/// `count` orders, all on the same day
fn many_orders(count: usize) -> RawTable {
    let mut data = String::from("Location,Order Id,Opened,Total\n");
    for i in 0..count {
        data.push_str(&format!("Main,o{i},04/01/24 11:05 AM,25.00\n"));
    }
    csv(&data)
}

/// Extractor serving fixed files per date and recording every call
#[derive(Default)]
struct FakeExtractor {
    dates: BTreeMap<NaiveDate, (DateMetadata, BTreeMap<FileType, RawTable>)>,
    failing: HashSet<NaiveDate>,
    /// Dates whose next metadata request fails transiently
    blips: Mutex<HashSet<NaiveDate>>,
    /// Fired from inside the first metadata request
    abort_on_metadata: Option<AbortHandle>,
    /// Holds metadata requests until released or timed out
    gate: Option<Mutex<mpsc::Receiver<()>>>,
    calls: Mutex<Vec<NaiveDate>>,
}

impl FakeExtractor {
    fn with_date(
        mut self,
        date: NaiveDate,
        meta: DateMetadata,
        files: impl IntoIterator<Item = (FileType, RawTable)>,
    ) -> Self {
        self.dates.insert(date, (meta, files.into_iter().collect()));
        self
    }

    fn with_failure(mut self, date: NaiveDate) -> Self {
        self.failing.insert(date);
        self.dates.insert(date, (busy(), BTreeMap::new()));
        self
    }

    fn with_blip(self, date: NaiveDate) -> Self {
        self.blips.lock().unwrap().insert(date);
        self
    }

    fn touched(&self) -> BTreeSet<NaiveDate> {
        self.calls.lock().unwrap().iter().copied().collect()
    }
}

impl Extractor for FakeExtractor {
    fn list_available_dates(&self) -> Result<Vec<NaiveDate>, ExtractionError> {
        Ok(self.dates.keys().copied().collect())
    }

    fn get_metadata(&self, date: NaiveDate) -> Result<DateMetadata, ExtractionError> {
        self.calls.lock().unwrap().push(date);
        if self.blips.lock().unwrap().remove(&date) {
            return Err(ExtractionError::Transient("connection reset".into()));
        }
        if let Some(abort) = &self.abort_on_metadata {
            abort.abort();
        }
        if let Some(gate) = &self.gate {
            let _ = gate.lock().unwrap().recv_timeout(Duration::from_secs(10));
        }
        self.dates
            .get(&date)
            .map(|(meta, _)| meta.clone())
            .ok_or(ExtractionError::NotFound(date))
    }

    fn fetch_files(&self, date: NaiveDate) -> Result<BTreeMap<FileType, RawTable>, ExtractionError> {
        self.calls.lock().unwrap().push(date);
        if self.failing.contains(&date) {
            return Err(ExtractionError::Malformed("truncated archive".into()));
        }
        self.dates
            .get(&date)
            .map(|(_, files)| files.clone())
            .ok_or(ExtractionError::NotFound(date))
    }
}

/// Loader keeping everything it receives; `reject_table` and `reject_dates`
/// refuse regular loads
#[derive(Default)]
struct FakeLoader {
    existing: HashSet<NaiveDate>,
    reject_table: Option<String>,
    reject_dates: HashSet<NaiveDate>,
    /// Regular loads that fail transiently before succeeding
    transient_failures: Mutex<u32>,
    tables: Mutex<Vec<TransformedTable>>,
    closure_rows: Mutex<Vec<(String, Value)>>,
}

impl FakeLoader {
    fn with_existing(mut self, date: NaiveDate) -> Self {
        self.existing.insert(date);
        self
    }

    fn loaded_tables(&self, date: NaiveDate) -> Vec<&'static str> {
        self.tables
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.processing_date() == date)
            .map(|t| t.table_name())
            .collect()
    }
}

impl Loader for FakeLoader {
    fn has_data(&self, date: NaiveDate) -> Result<bool, LoadError> {
        Ok(self.existing.contains(&date))
    }

    fn load(&self, table_name: &str, payload: LoadPayload<'_>) -> Result<LoadReceipt, LoadError> {
        match payload {
            LoadPayload::Table(_) if self.reject_table.as_deref() == Some(table_name) => {
                return Err(LoadError::rejected(table_name, "permission denied"));
            }
            LoadPayload::Table(table) if self.reject_dates.contains(&table.processing_date()) => {
                return Err(LoadError::rejected(table_name, "partition locked"));
            }
            LoadPayload::Table(_) if *self.transient_failures.lock().unwrap() > 0 => {
                *self.transient_failures.lock().unwrap() -= 1;
                return Err(LoadError::Transient("throttled".into()));
            }
            LoadPayload::Table(table) => self.tables.lock().unwrap().push(table.clone()),
            LoadPayload::Closure(records) => {
                let mut rows = self.closure_rows.lock().unwrap();
                for record in records {
                    let date = record.get("processing_date").cloned().unwrap_or(Value::Null);
                    rows.push((table_name.to_string(), date));
                }
            }
        }
        Ok(LoadReceipt {
            rows_written: payload.row_count(),
        })
    }
}

fn manager(
    config: PipelineConfig,
    extractor: FakeExtractor,
    loader: FakeLoader,
) -> BackfillManager<FakeExtractor, FakeLoader> {
    BackfillManager::new(config, FileTypeRegistry::standard(), extractor, loader)
        .unwrap()
        .with_reference_time(day(30).and_hms_opt(0, 0, 0).unwrap())
}

mod closure_tests {
    use super::*;

    #[test]
    fn test_zero_files_loads_one_closure_record_per_table() {
        let extractor = FakeExtractor::default().with_date(day(1), DateMetadata::default(), []);
        let m = manager(PipelineConfig::default(), extractor, FakeLoader::default());

        let run = m.run(&BackfillRequest::all()).unwrap();
        let result = run.result(day(1)).unwrap();
        assert_eq!(result.outcome, DateOutcome::Closure);
        assert_eq!(result.closure_reason, Some(ClosureReason::NoFiles));
        assert_eq!(result.records_loaded, 7);
        assert_eq!(
            result.states,
            vec![
                DateState::Pending,
                DateState::Analyzing,
                DateState::ClosureDetected,
                DateState::LoadedClosure
            ]
        );

        let rows = m.loader().closure_rows.lock().unwrap();
        let tables: BTreeSet<&str> = rows.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(rows.len(), 7);
        assert_eq!(tables.len(), 7);
        assert!(rows.iter().all(|(_, d)| *d == Value::Date(day(1))));
        assert!(m.extractor().calls.lock().unwrap().len() == 1, "files must not be fetched");
    }

    #[test]
    fn test_low_activity_is_closure() {
        let extractor = FakeExtractor::default().with_date(
            day(2),
            DateMetadata::new(7, 3, 400.0),
            [(FileType::OrderDetails, orders())],
        );
        let m = manager(PipelineConfig::default(), extractor, FakeLoader::default());
        let run = m.run(&BackfillRequest::all()).unwrap();
        assert_eq!(
            run.result(day(2)).unwrap().closure_reason,
            Some(ClosureReason::LowActivity)
        );
        assert_eq!(run.closure_dates(), vec![day(2)]);
    }
}

mod normal_path_tests {
    use super::*;

    #[test]
    fn test_header_with_punctuation_maps_to_integer_column() {
        let items = csv("Menu Item,Item Qty (incl voids),Net Amount\nBurger,12,96.00\n");
        let extractor =
            FakeExtractor::default().with_date(day(3), busy(), [(FileType::AllItemsReport, items)]);
        let m = manager(PipelineConfig::default(), extractor, FakeLoader::default());

        let run = m.run(&BackfillRequest::all()).unwrap();
        assert_eq!(run.result(day(3)).unwrap().outcome, DateOutcome::Succeeded);

        let tables = m.loader().tables.lock().unwrap();
        let table = tables
            .iter()
            .find(|t| t.file_type() == FileType::AllItemsReport)
            .unwrap();
        assert_eq!(table.value(0, "item_qty_incl_voids"), Some(&Value::Integer(12)));
        assert_eq!(table.value(0, "processing_date"), Some(&Value::Date(day(3))));
    }

    #[test]
    fn test_missing_required_column_blocks_only_that_file() {
        // Cash entries without the required "Entry Id"
        let cash = csv("Location,Action,Amount\nMain,Cash Drop,100.00\n");
        let extractor = FakeExtractor::default().with_date(
            day(4),
            busy(),
            [
                (FileType::OrderDetails, orders()),
                (FileType::PaymentDetails, payments()),
                (FileType::CashEntries, cash),
            ],
        );
        let m = manager(PipelineConfig::default(), extractor, FakeLoader::default());

        let run = m.run(&BackfillRequest::all()).unwrap();
        let result = run.result(day(4)).unwrap();
        assert_eq!(result.outcome, DateOutcome::Succeeded);
        assert_eq!(result.overall_status, Some(Severity::Critical));
        assert_eq!(result.blocked_files, vec![FileType::CashEntries]);

        let report = result.quality_report.as_ref().unwrap();
        let cash_report = report.file(FileType::CashEntries).unwrap();
        assert!(cash_report.issues.iter().any(|i| {
            i.rule == Rule::MissingRequiredColumn
                && i.severity == Severity::Critical
                && i.column.as_deref() == Some("entry_id")
        }));

        let loaded = m.loader().loaded_tables(day(4));
        assert!(loaded.contains(&"order_details"));
        assert!(loaded.contains(&"payment_details"));
        assert!(!loaded.contains(&"cash_entries"));
    }

    #[test]
    fn test_duration_column_in_minutes() {
        let extractor =
            FakeExtractor::default().with_date(day(5), busy(), [(FileType::OrderDetails, orders())]);
        let m = manager(PipelineConfig::default(), extractor, FakeLoader::default());
        m.run(&BackfillRequest::all()).unwrap();

        let tables = m.loader().tables.lock().unwrap();
        let table = &tables[0];
        assert_eq!(table.value(0, "duration_opened_to_paid"), Some(&Value::Float(45.0)));
        assert_eq!(table.value(1, "duration_opened_to_paid"), Some(&Value::Float(65.0)));
    }

    #[test]
    fn test_all_files_blocked_fails_date() {
        let cash = csv("Amount\n100.00\n");
        let extractor =
            FakeExtractor::default().with_date(day(6), busy(), [(FileType::CashEntries, cash)]);
        let m = manager(PipelineConfig::default(), extractor, FakeLoader::default());

        let run = m.run(&BackfillRequest::all()).unwrap();
        let result = run.result(day(6)).unwrap();
        assert_eq!(result.outcome, DateOutcome::Failed);
        assert_eq!(result.failure_reason.as_deref(), Some("no loadable files"));
        assert_eq!(result.states.last(), Some(&DateState::Failed));
    }
}

mod orchestration_tests {
    use super::*;

    fn mixed_extractor() -> FakeExtractor {
        let mut extractor = FakeExtractor::default();
        for d in 1..=10 {
            extractor = match d % 3 {
                0 => extractor.with_date(day(d), DateMetadata::default(), []),
                1 => extractor.with_date(
                    day(d),
                    busy(),
                    [
                        (FileType::OrderDetails, orders()),
                        (FileType::PaymentDetails, payments()),
                    ],
                ),
                _ => extractor.with_failure(day(d)),
            };
        }
        extractor
    }

    fn outcomes(max_workers: usize) -> Vec<(NaiveDate, DateOutcome, usize)> {
        let config = PipelineConfig::default()
            .with_max_workers(max_workers)
            .with_batch_size(4);
        let m = manager(config, mixed_extractor(), FakeLoader::default());
        let run = m.run(&BackfillRequest::all()).unwrap();
        assert_eq!(run.total_dates(), 10);
        run.results()
            .map(|r| (r.date, r.outcome, r.records_loaded))
            .collect()
    }

    #[test]
    fn test_outcomes_independent_of_worker_count() {
        assert_eq!(outcomes(1), outcomes(4));
    }

    #[test]
    fn test_failures_are_isolated() {
        let m = manager(PipelineConfig::default(), mixed_extractor(), FakeLoader::default());
        let run = m.run(&BackfillRequest::all()).unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.failed_count(), 3);
        assert_eq!(run.closure_count(), 3);
        assert_eq!(run.succeeded_count(), 4);
        let (date, reason) = run.failed_dates()[0];
        assert_eq!(date, day(2));
        assert!(reason.contains("truncated archive"));
    }

    #[test]
    fn test_load_error_fails_only_that_date() {
        let extractor = FakeExtractor::default()
            .with_date(day(1), busy(), [(FileType::OrderDetails, orders())])
            .with_date(day(2), DateMetadata::default(), []);
        let loader = FakeLoader {
            reject_table: Some("order_details".to_string()),
            ..FakeLoader::default()
        };
        let m = manager(PipelineConfig::default(), extractor, loader);

        let run = m.run(&BackfillRequest::all()).unwrap();
        assert_eq!(run.result(day(1)).unwrap().outcome, DateOutcome::Failed);
        assert!(run.result(day(1)).unwrap().failure_reason.as_deref().unwrap().contains("order_details"));
        assert_eq!(run.result(day(2)).unwrap().outcome, DateOutcome::Closure);
    }

    #[test]
    fn test_skip_existing_never_touches_extractor() {
        let extractor = FakeExtractor::default()
            .with_date(day(1), busy(), [(FileType::OrderDetails, orders())])
            .with_date(day(2), busy(), [(FileType::OrderDetails, orders())]);
        let loader = FakeLoader::default().with_existing(day(1));
        let m = manager(PipelineConfig::default(), extractor, loader);

        let run = m.run(&BackfillRequest::all()).unwrap();
        assert_eq!(run.skipped, vec![day(1)]);
        assert!(run.result(day(1)).is_none());
        assert_eq!(m.extractor().touched(), BTreeSet::from([day(2)]));
    }

    #[test]
    fn test_force_reprocesses_existing() {
        let extractor =
            FakeExtractor::default().with_date(day(1), busy(), [(FileType::OrderDetails, orders())]);
        let loader = FakeLoader::default().with_existing(day(1));
        let m = manager(PipelineConfig::default(), extractor, loader);

        let run = m.run(&BackfillRequest::all().with_force(true)).unwrap();
        assert!(run.skipped.is_empty());
        assert_eq!(run.result(day(1)).unwrap().outcome, DateOutcome::Succeeded);
    }

    #[test]
    fn test_dry_run_dispatches_nothing() {
        let m = manager(PipelineConfig::default(), mixed_extractor(), FakeLoader::default());
        let dates = m.dry_run(&BackfillRequest::range(day(2), day(4))).unwrap();
        assert_eq!(dates, vec![day(2), day(3), day(4)]);
        assert!(m.extractor().touched().is_empty());
    }
}

mod retry_tests {
    use super::*;

    fn retrying(attempts: u32) -> PipelineConfig {
        PipelineConfig::default().with_retry(RetryPolicy::immediate(attempts))
    }

    #[test]
    fn test_transient_metadata_error_is_retried() {
        let extractor = FakeExtractor::default()
            .with_date(day(1), busy(), [(FileType::OrderDetails, orders())])
            .with_blip(day(1));
        let m = manager(retrying(3), extractor, FakeLoader::default());

        let run = m.run(&BackfillRequest::all()).unwrap();
        let result = run.result(day(1)).unwrap();
        assert_eq!(result.outcome, DateOutcome::Succeeded, "{:?}", result.failure_reason);
        assert_eq!(m.loader().loaded_tables(day(1)), vec!["order_details"]);
    }

    #[test]
    fn test_transient_load_error_is_retried() {
        let extractor =
            FakeExtractor::default().with_date(day(1), busy(), [(FileType::OrderDetails, orders())]);
        let loader = FakeLoader {
            transient_failures: Mutex::new(2),
            ..FakeLoader::default()
        };
        let m = manager(retrying(3), extractor, loader);

        let run = m.run(&BackfillRequest::all()).unwrap();
        assert_eq!(run.result(day(1)).unwrap().outcome, DateOutcome::Succeeded);
        assert_eq!(*m.loader().transient_failures.lock().unwrap(), 0);
    }

    #[test]
    fn test_date_fails_once_retries_are_exhausted() {
        let extractor = FakeExtractor::default()
            .with_date(day(1), busy(), [(FileType::OrderDetails, orders())])
            .with_blip(day(1));
        let m = manager(retrying(1), extractor, FakeLoader::default());

        let run = m.run(&BackfillRequest::all()).unwrap();
        let result = run.result(day(1)).unwrap();
        assert_eq!(result.outcome, DateOutcome::Failed);
        assert!(result.failure_reason.as_deref().unwrap().contains("connection reset"));
    }
}

mod baseline_tests {
    use super::*;

    fn volume_flagged(loader: FakeLoader) -> bool {
        let extractor = FakeExtractor::default()
            .with_date(day(1), busy(), [(FileType::OrderDetails, many_orders(100))])
            .with_date(day(2), busy(), [(FileType::OrderDetails, many_orders(2))]);
        let config = PipelineConfig::default().with_batch_size(1);
        let m = manager(config, extractor, loader);

        let run = m.run(&BackfillRequest::all()).unwrap();
        let report = run.result(day(2)).unwrap().quality_report.clone().unwrap();
        report.cross_file.iter().any(|i| i.rule == Rule::VolumeDeviation)
    }

    #[test]
    fn test_successful_date_feeds_volume_baseline() {
        assert!(volume_flagged(FakeLoader::default()));
    }

    #[test]
    fn test_failed_date_is_left_out_of_volume_baseline() {
        let loader = FakeLoader {
            reject_dates: HashSet::from([day(1)]),
            ..FakeLoader::default()
        };
        assert!(!volume_flagged(loader));
    }
}

mod abort_tests {
    use super::*;

    fn closures(days: std::ops::RangeInclusive<u32>) -> FakeExtractor {
        days.fold(FakeExtractor::default(), |e, d| {
            e.with_date(day(d), DateMetadata::default(), [])
        })
    }

    #[test]
    fn test_abort_mid_run_finishes_in_flight_date() {
        let dir = tempfile::tempdir().unwrap();
        let abort = AbortHandle::default();
        let extractor = FakeExtractor {
            abort_on_metadata: Some(abort.clone()),
            ..closures(1..=5)
        };
        let config = PipelineConfig::default()
            .with_max_workers(1)
            .with_batch_size(2)
            .with_reports_dir(dir.path());
        let m = manager(config, extractor, FakeLoader::default()).with_abort_handle(abort);

        let run = m.run(&BackfillRequest::all()).unwrap();
        assert_eq!(run.status, RunStatus::Aborted);
        assert_eq!(run.total_dates(), 1);
        let finished = run.results().next().unwrap();
        assert_eq!(finished.outcome, DateOutcome::Closure);
        assert_eq!(finished.records_loaded, 7);

        let mut accounted: BTreeSet<NaiveDate> = run.not_started.iter().copied().collect();
        assert_eq!(accounted.len(), 4);
        assert!(accounted.insert(finished.date));
        assert_eq!(accounted, (1..=5).map(day).collect::<BTreeSet<_>>());

        let log_path = dir.path().join(format!("backfill_{}.json", run.run_id));
        let log: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(log_path).unwrap()).unwrap();
        assert_eq!(log["status"], "aborted");
        assert_eq!(log["totals"]["not_started"], 4);
        assert_eq!(log["results"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_drain_timeout_records_in_flight_date_as_failed() {
        let (release, gate) = mpsc::channel();
        let abort = AbortHandle::default();
        let extractor = FakeExtractor {
            abort_on_metadata: Some(abort.clone()),
            gate: Some(Mutex::new(gate)),
            ..closures(1..=1)
        };
        let config = PipelineConfig::default()
            .with_max_workers(1)
            .with_drain_timeout(Duration::ZERO);
        let m = manager(config, extractor, FakeLoader::default()).with_abort_handle(abort);

        let run = m.run(&BackfillRequest::all()).unwrap();
        let _ = release.send(());

        assert_eq!(run.status, RunStatus::Aborted);
        let result = run.result(day(1)).unwrap();
        assert_eq!(result.outcome, DateOutcome::Failed);
        let reason = result.failure_reason.as_deref().unwrap();
        assert!(reason.starts_with("abandoned after drain timeout"));
        assert!(reason.contains("load may have completed"));
        assert_eq!(result.states, vec![DateState::Pending, DateState::Failed]);
    }
}

mod persistence_tests {
    use super::*;

    #[test]
    fn test_reports_written_under_reports_dir() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::default()
            .with_date(day(8), busy(), [(FileType::OrderDetails, orders())])
            .with_date(day(9), DateMetadata::default(), []);
        let config = PipelineConfig::default().with_reports_dir(dir.path());
        let m = manager(config, extractor, FakeLoader::default());

        let run = m.run(&BackfillRequest::all()).unwrap();

        let quality_path = dir.path().join("quality").join("2024-04-08.json");
        assert_eq!(run.result(day(8)).unwrap().report_path.as_ref(), Some(&quality_path));
        let quality: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&quality_path).unwrap()).unwrap();
        assert_eq!(quality["date"], "2024-04-08");
        assert!(quality["overall_status"].is_string());
        assert!(quality["files"].is_array());

        // closures produce no quality report
        assert!(!dir.path().join("quality").join("2024-04-09.json").exists());

        let log_path = dir.path().join(format!("backfill_{}.json", run.run_id));
        let log: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(log_path).unwrap()).unwrap();
        assert_eq!(log["totals"]["dates"], 2);
        assert_eq!(log["closure_dates"][0], "2024-04-09");
        assert_eq!(log["config_hash"], m.config().config_hash());
    }
}
