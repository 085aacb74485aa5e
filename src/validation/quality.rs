//! Per-date quality check: per-file validation, then cross-file checks

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{FileType, FileTypeRegistry, QualityThresholds, ReferentialRule};
use crate::models::TransformedTable;
use crate::transform::NormalizedFile;

use super::error::{ReportError, write_json};
use super::issue::{Rule, Severity, ValidationIssue, max_severity};
use super::rules::DataValidator;
use super::schema::enforce_schema;

/// Row counts of recently processed dates, per file type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeBaseline {
    window: usize,
    history: BTreeMap<FileType, BTreeMap<NaiveDate, usize>>,
}

impl VolumeBaseline {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            history: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, file_type: FileType, date: NaiveDate, rows: usize) {
        self.history.entry(file_type).or_default().insert(date, rows);
    }

    /// Mean row count over the last `window` dates strictly before `date`
    pub fn mean_before(&self, file_type: FileType, date: NaiveDate) -> Option<f64> {
        let counts: Vec<usize> = self
            .history
            .get(&file_type)?
            .range(..date)
            .rev()
            .take(self.window)
            .map(|(_, rows)| *rows)
            .collect();
        if counts.is_empty() {
            return None;
        }
        Some(counts.iter().sum::<usize>() as f64 / counts.len() as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.history.values().all(BTreeMap::is_empty)
    }
}

/// Issues for one file of a date
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_type: FileType,
    pub rows: usize,
    /// False when schema enforcement found a CRITICAL violation
    pub loadable: bool,
    pub issues: Vec<ValidationIssue>,
}

impl FileReport {
    pub fn status(&self) -> Severity {
        max_severity(&self.issues)
    }
}

/// Remediation keyed by the rule that triggered it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub rule: Rule,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileType>,
    pub action: String,
}

/// Aggregated quality findings for one business date
#[derive(Debug, Clone)]
pub struct QualityReport {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
    pub cross_file: Vec<ValidationIssue>,
    pub recommendations: Vec<Recommendation>,
}

impl QualityReport {
    /// Every issue in the report, per-file first
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.files
            .iter()
            .flat_map(|f| f.issues.iter())
            .chain(self.cross_file.iter())
    }

    /// Maximum severity over all contained issues
    pub fn overall_status(&self) -> Severity {
        max_severity(self.issues())
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues().filter(|i| i.severity == severity).count()
    }

    pub fn file(&self, file_type: FileType) -> Option<&FileReport> {
        self.files.iter().find(|f| f.file_type == file_type)
    }

    /// Issues grouped by severity
    pub fn issues_by_severity(&self) -> BTreeMap<Severity, Vec<&ValidationIssue>> {
        let mut grouped: BTreeMap<Severity, Vec<&ValidationIssue>> = BTreeMap::new();
        for issue in self.issues() {
            grouped.entry(issue.severity).or_default().push(issue);
        }
        grouped
    }

    /// Default location under a reports directory
    pub fn default_path(reports_dir: &Path, date: NaiveDate) -> PathBuf {
        reports_dir
            .join("quality")
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Save report as pretty JSON under `reports_dir`
    pub fn save(&self, reports_dir: &Path) -> Result<PathBuf, ReportError> {
        write_json(Self::default_path(reports_dir, self.date), self)
    }
}

#[derive(Serialize)]
struct SeverityCounts {
    ok: usize,
    warning: usize,
    critical: usize,
}

/// Most severe group first
#[derive(Serialize)]
struct IssueGroups<'a> {
    critical: Vec<&'a ValidationIssue>,
    warning: Vec<&'a ValidationIssue>,
    ok: Vec<&'a ValidationIssue>,
}

#[derive(Serialize)]
struct QualityReportView<'a> {
    date: NaiveDate,
    generated_at: DateTime<Utc>,
    overall_status: Severity,
    summary: SeverityCounts,
    issues_by_severity: IssueGroups<'a>,
    files: &'a [FileReport],
    cross_file: &'a [ValidationIssue],
    recommendations: &'a [Recommendation],
}

impl Serialize for QualityReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut grouped = self.issues_by_severity();
        let mut take = |severity| grouped.remove(&severity).unwrap_or_default();
        QualityReportView {
            date: self.date,
            generated_at: self.generated_at,
            overall_status: self.overall_status(),
            summary: SeverityCounts {
                ok: self.count(Severity::Ok),
                warning: self.count(Severity::Warning),
                critical: self.count(Severity::Critical),
            },
            issues_by_severity: IssueGroups {
                critical: take(Severity::Critical),
                warning: take(Severity::Warning),
                ok: take(Severity::Ok),
            },
            files: &self.files,
            cross_file: &self.cross_file,
            recommendations: &self.recommendations,
        }
        .serialize(serializer)
    }
}

/// Quality report plus the tables cleared for loading
#[derive(Debug, Clone)]
pub struct QualityOutcome {
    pub report: QualityReport,
    /// Schema-corrected tables without CRITICAL schema violations
    pub loadable: Vec<TransformedTable>,
}

/// Runs schema enforcement and data validation over every file of a date,
/// then referential and volume checks across them
#[derive(Debug, Clone)]
pub struct QualityChecker {
    registry: Arc<FileTypeRegistry>,
    thresholds: QualityThresholds,
    validator: DataValidator,
    validation_enabled: bool,
}

impl QualityChecker {
    pub fn new(registry: Arc<FileTypeRegistry>, thresholds: QualityThresholds) -> Self {
        let validator = DataValidator::new(thresholds.clone());
        Self {
            registry,
            thresholds,
            validator,
            validation_enabled: true,
        }
    }

    pub fn with_reference_time(mut self, reference_time: NaiveDateTime) -> Self {
        self.validator = self.validator.with_reference_time(reference_time);
        self
    }

    /// When disabled only schema enforcement runs
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation_enabled = enabled;
        self
    }

    pub fn check(
        &self,
        date: NaiveDate,
        files: Vec<NormalizedFile>,
        baseline: &VolumeBaseline,
    ) -> QualityOutcome {
        let mut reports = Vec::with_capacity(files.len());
        let mut tables: BTreeMap<FileType, TransformedTable> = BTreeMap::new();

        // Phase 1: each file on its own
        for file in files {
            let file_type = file.table.file_type();
            let Some(config) = self.registry.get(file_type) else {
                warn!(file = file_type.file_name(), "No configuration for file; skipped");
                continue;
            };

            let mut issues = file.issues;
            let enforcement = enforce_schema(file.table, &config.schema);
            issues.extend(enforcement.violations);
            let table = enforcement.corrected_table;

            if self.validation_enabled {
                issues.extend(self.validator.validate(&table, &config.rules));
            }

            debug!(
                file = file_type.file_name(),
                rows = table.row_count(),
                issues = issues.len(),
                compliant = enforcement.compliant,
                "File checked"
            );
            reports.push(FileReport {
                file_type,
                rows: table.row_count(),
                loadable: enforcement.compliant,
                issues,
            });
            tables.insert(file_type, table);
        }
        reports.sort_by_key(|r| r.file_type);

        // Phase 2: across files, once every table is materialized
        let mut cross_file = Vec::new();
        if self.validation_enabled {
            for rule in self.registry.referential_rules() {
                if let Some(issue) = self.check_referential(rule, &tables) {
                    cross_file.push(issue);
                }
            }
            for report in &reports {
                if let Some(issue) = self.check_volume(report, date, baseline) {
                    cross_file.push(issue);
                }
            }
        }

        let recommendations = recommend(&reports, &cross_file);
        let loadable_types: HashSet<FileType> = reports
            .iter()
            .filter(|r| r.loadable)
            .map(|r| r.file_type)
            .collect();
        let loadable = tables
            .into_iter()
            .filter(|(ft, _)| loadable_types.contains(ft))
            .map(|(_, table)| table)
            .collect();

        QualityOutcome {
            report: QualityReport {
                date,
                generated_at: Utc::now(),
                files: reports,
                cross_file,
                recommendations,
            },
            loadable,
        }
    }

    fn check_referential(
        &self,
        rule: &ReferentialRule,
        tables: &BTreeMap<FileType, TransformedTable>,
    ) -> Option<ValidationIssue> {
        let parent = tables.get(&rule.parent)?.column(&rule.parent_key)?;
        let child = tables.get(&rule.child)?.column(&rule.child_key)?;

        let parent_keys: HashSet<String> = parent.values.iter().filter_map(|v| v.as_key()).collect();
        let mut referenced = 0usize;
        let mut orphans = Vec::new();
        for (row, value) in child.values.iter().enumerate() {
            if let Some(key) = value.as_key() {
                referenced += 1;
                if !parent_keys.contains(&key) {
                    orphans.push(row);
                }
            }
        }
        if referenced == 0 {
            return None;
        }

        let rate = orphans.len() as f64 / referenced as f64;
        if rate <= self.thresholds.orphan_rate_threshold {
            return None;
        }
        Some(
            ValidationIssue::warning(
                Rule::ReferentialOrphans,
                format!(
                    "{}: {} of {} {}.{} value(s) ({:.1}%) have no match in {}.{}",
                    rule.name,
                    orphans.len(),
                    referenced,
                    rule.child,
                    rule.child_key,
                    rate * 100.0,
                    rule.parent,
                    rule.parent_key
                ),
            )
            .with_file(rule.child)
            .with_column(rule.child_key.clone())
            .with_rows(orphans),
        )
    }

    fn check_volume(
        &self,
        report: &FileReport,
        date: NaiveDate,
        baseline: &VolumeBaseline,
    ) -> Option<ValidationIssue> {
        let mean = baseline.mean_before(report.file_type, date)?;
        if mean <= 0.0 {
            return None;
        }
        let deviation = (report.rows as f64 - mean).abs() / mean * 100.0;
        if deviation <= self.thresholds.volume_deviation_pct {
            return None;
        }
        Some(
            ValidationIssue::warning(
                Rule::VolumeDeviation,
                format!(
                    "{} rows vs trailing mean of {:.1} ({:.1}% deviation, limit {:.1}%)",
                    report.rows, mean, deviation, self.thresholds.volume_deviation_pct
                ),
            )
            .with_file(report.file_type),
        )
    }
}

/// One recommendation per (rule, file) at WARNING or above, most severe first
fn recommend(reports: &[FileReport], cross_file: &[ValidationIssue]) -> Vec<Recommendation> {
    let mut keyed: BTreeMap<(Rule, Option<FileType>), Severity> = BTreeMap::new();
    let per_file = reports
        .iter()
        .flat_map(|r| r.issues.iter().map(move |i| (i, Some(r.file_type))));
    let across = cross_file.iter().map(|i| (i, i.file));

    for (issue, file) in per_file.chain(across) {
        if issue.severity < Severity::Warning {
            continue;
        }
        let entry = keyed.entry((issue.rule, file)).or_default();
        *entry = (*entry).max(issue.severity);
    }

    let mut recommendations: Vec<Recommendation> = keyed
        .into_iter()
        .map(|((rule, file), severity)| Recommendation {
            rule,
            severity,
            file,
            action: match file {
                Some(ft) => format!("{}: {}", ft, rule.remediation()),
                None => rule.remediation().to_string(),
            },
        })
        .collect();
    recommendations.sort_by(|a, b| b.severity.cmp(&a.severity));
    recommendations
}
