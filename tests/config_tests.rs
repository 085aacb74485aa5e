//! Configuration loading tests

use pos_etl::calendar::{BusinessCalendar, ClosureReason};
use pos_etl::config::{ConfigError, FileType, FileTypeRegistry, PipelineConfig};
use pos_etl::models::{RawTable, Value};
use pos_etl::transform::normalize;
use std::sync::Arc;

const REGISTRY: &str = r#"
[[file_types]]
file_type = "CashEntries"
closure_label_column = "action"
columns = [
    { source = "Entry Id", target = "entry_id" },
    { source = "Action", target = "action" },
    { source = "Amount", target = "amount" },
]
schema = [
    { name = "entry_id", type = "STRING", nullable = false },
    { name = "action", type = "STRING" },
    { name = "amount", type = "FLOAT" },
    { name = "processing_date", type = "DATE", nullable = false },
]

[file_types.rules]
key_columns = ["entry_id"]
"#;

const SETTINGS: &str = r#"
[backfill]
max_workers = 2
batch_size = 5

[closure]
min_files_threshold = 1

[retry]
max_attempts = 5
"#;

fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_settings_and_registry_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::load(&write(&dir, "pipeline.toml", SETTINGS)).unwrap();
    let registry = FileTypeRegistry::load(&write(&dir, "file_types.toml", REGISTRY)).unwrap();

    assert_eq!(config.backfill.max_workers, 2);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.closure.min_records_threshold, 10);
    assert_eq!(registry.len(), 1);

    let raw = RawTable::from_csv_str("Entry Id,Action,Amount\ne1,Cash Drop,\"$1,200.00\"\n").unwrap();
    let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let file = normalize(&raw, registry.get(FileType::CashEntries).unwrap(), date);
    assert_eq!(file.table.value(0, "amount"), Some(&Value::Float(1200.0)));
}

#[test]
fn test_closure_records_follow_configured_tables() {
    let registry = Arc::new(FileTypeRegistry::from_toml_str(REGISTRY).unwrap());
    let config = PipelineConfig::from_toml_str(SETTINGS).unwrap();
    let calendar = BusinessCalendar::new(config.closure, registry);

    let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let records = calendar.generate_closure_records(date, ClosureReason::NoFiles);
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].get("entry_id"),
        Some(&Value::String("CLOSURE_RECORD".into()))
    );
    assert_eq!(
        records[0].get("action"),
        Some(&Value::String("Business Closed - no data files found".into()))
    );
}

#[test]
fn test_missing_file_reports_path() {
    let err = PipelineConfig::load(std::path::Path::new("/nonexistent/pipeline.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("/nonexistent/pipeline.toml"));
}
