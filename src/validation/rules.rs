//! Business rules and statistical anomaly checks within one file

use chrono::{NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::config::{PROCESSING_DATE_COLUMN, QualityThresholds, ValidationRules};
use crate::models::{Column, TransformedTable, Value};
use crate::transform::convert::is_boolean_token;

use super::issue::{Rule, ValidationIssue};

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\s\-\(\)\+\.]+$").unwrap());

const GUEST_COUNT_MIN: f64 = 1.0;
const GUEST_COUNT_MAX: f64 = 50.0;

/// Applies range, format, ordering and anomaly rules to a single table
#[derive(Debug, Clone)]
pub struct DataValidator {
    thresholds: QualityThresholds,
    reference_time: NaiveDateTime,
}

impl DataValidator {
    /// Create a validator that treats the current UTC time as "now"
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self {
            thresholds,
            reference_time: Utc::now().naive_utc(),
        }
    }

    /// Timestamps after this instant are reported as future-dated
    pub fn with_reference_time(mut self, reference_time: NaiveDateTime) -> Self {
        self.reference_time = reference_time;
        self
    }

    /// Run every configured rule; business rules first, then anomaly checks
    pub fn validate(&self, table: &TransformedTable, rules: &ValidationRules) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        self.check_monetary(table, rules, &mut issues);
        self.check_ranges(table, rules, &mut issues);
        self.check_formats(table, rules, &mut issues);
        self.check_categories(table, rules, &mut issues);
        self.check_sequences(table, rules, &mut issues);

        self.check_future_timestamps(table, &mut issues);
        self.check_outliers(table, &mut issues);
        self.check_duplicates(table, rules, &mut issues);
        self.check_null_rates(table, &mut issues);

        issues
    }

    fn check_monetary(
        &self,
        table: &TransformedTable,
        rules: &ValidationRules,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for rule in &rules.monetary {
            let Some(column) = table.column(&rule.column) else {
                continue;
            };
            let ceiling = self
                .thresholds
                .monetary_soft_ceiling
                .unwrap_or(rule.soft_ceiling);
            let above = numeric_rows(column, |v| v > ceiling);
            if !above.is_empty() {
                issues.push(
                    ValidationIssue::warning(
                        Rule::MonetarySoftCeiling,
                        format!(
                            "{} value(s) in '{}' exceed ${:.2}",
                            above.len(),
                            rule.column,
                            ceiling
                        ),
                    )
                    .with_column(rule.column.clone())
                    .with_rows(above),
                );
            }
            if !rule.allow_negative {
                let negative = numeric_rows(column, |v| v < 0.0);
                if !negative.is_empty() {
                    issues.push(
                        ValidationIssue::critical(
                            Rule::NegativeAmount,
                            format!("{} negative value(s) in '{}'", negative.len(), rule.column),
                        )
                        .with_column(rule.column.clone())
                        .with_rows(negative),
                    );
                }
            }
        }
    }

    fn check_ranges(
        &self,
        table: &TransformedTable,
        rules: &ValidationRules,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for rule in &rules.ranges {
            if let Some(column) = table.column(&rule.column) {
                let rows = numeric_rows(column, |v| v < rule.min || v > rule.max);
                push_rows(
                    issues,
                    Rule::ValueOutOfRange,
                    column,
                    rows,
                    &format!("outside {}..={}", rule.min, rule.max),
                );
            }
        }

        for name in &rules.percentage_columns {
            if let Some(column) = table.column(name) {
                let rows = numeric_rows(column, |v| !(0.0..=100.0).contains(&v));
                push_rows(issues, Rule::PercentageOutOfRange, column, rows, "outside 0..=100");
            }
        }

        if let Some(column) = rules.guest_count_column.as_deref().and_then(|c| table.column(c)) {
            let rows = numeric_rows(column, |v| !(GUEST_COUNT_MIN..=GUEST_COUNT_MAX).contains(&v));
            push_rows(issues, Rule::GuestCountOutOfRange, column, rows, "outside 1..=50");
        }
    }

    fn check_formats(
        &self,
        table: &TransformedTable,
        rules: &ValidationRules,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for name in &rules.email_columns {
            if let Some(column) = table.column(name) {
                let rows = text_rows(column, |s| !EMAIL.is_match(s.trim()));
                push_rows(issues, Rule::InvalidEmail, column, rows, "not valid email addresses");
            }
        }

        for name in &rules.phone_columns {
            if let Some(column) = table.column(name) {
                let rows = text_rows(column, |s| !PHONE.is_match(s.trim()));
                push_rows(issues, Rule::InvalidPhone, column, rows, "not valid phone numbers");
            }
        }

        for rule in &rules.card_digits {
            if let Some(column) = table.column(&rule.column) {
                let rows = matching_rows(column, |v| {
                    v.as_key().is_some_and(|key| {
                        key.len() != rule.length || !key.chars().all(|c| c.is_ascii_digit())
                    })
                });
                push_rows(
                    issues,
                    Rule::InvalidCardDigits,
                    column,
                    rows,
                    &format!("not exactly {} digits", rule.length),
                );
            }
        }

        for name in &rules.boolean_columns {
            if let Some(column) = table.column(name) {
                let rows = matching_rows(column, |v| match v {
                    Value::Null | Value::Boolean(_) => false,
                    Value::String(s) => !s.trim().is_empty() && !is_boolean_token(s),
                    Value::Integer(i) => *i != 0 && *i != 1,
                    _ => true,
                });
                push_rows(issues, Rule::InvalidBoolean, column, rows, "not boolean tokens");
            }
        }

        for rule in &rules.max_lengths {
            if let Some(column) = table.column(&rule.column) {
                let rows = text_rows(column, |s| s.chars().count() > rule.max_len);
                push_rows(
                    issues,
                    Rule::StringTooLong,
                    column,
                    rows,
                    &format!("longer than {} characters", rule.max_len),
                );
            }
        }
    }

    fn check_categories(
        &self,
        table: &TransformedTable,
        rules: &ValidationRules,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for rule in &rules.categories {
            let Some(column) = table.column(&rule.column) else {
                continue;
            };
            let allowed: HashSet<&str> = rule.allowed.iter().map(String::as_str).collect();
            let rows = text_rows(column, |s| !allowed.contains(s.trim()));
            if rows.is_empty() {
                continue;
            }
            let mut unexpected: Vec<String> = rows
                .iter()
                .filter_map(|&r| column.values[r].as_str().map(|s| s.trim().to_string()))
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            unexpected.sort();
            unexpected.truncate(5);
            issues.push(
                ValidationIssue::warning(
                    Rule::InvalidCategory,
                    format!(
                        "{} value(s) in '{}' outside the allowed set (e.g. {})",
                        rows.len(),
                        rule.column,
                        unexpected.join(", ")
                    ),
                )
                .with_column(rule.column.clone())
                .with_rows(rows),
            );
        }
    }

    fn check_sequences(
        &self,
        table: &TransformedTable,
        rules: &ValidationRules,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for sequence in &rules.sequences {
            let columns: Option<Vec<&Column>> =
                sequence.iter().map(|name| table.column(name)).collect();
            let Some(columns) = columns else {
                continue;
            };
            if columns.len() < 2 {
                continue;
            }

            let mut rows = Vec::new();
            for row in 0..table.row_count() {
                let points: Option<Vec<NaiveDateTime>> =
                    columns.iter().map(|c| c.values[row].as_datetime()).collect();
                // only rows with every point present are checked
                let Some(points) = points else {
                    continue;
                };
                if points.windows(2).any(|w| w[0] > w[1]) {
                    rows.push(row);
                }
            }

            if !rows.is_empty() {
                issues.push(
                    ValidationIssue::warning(
                        Rule::OrderingViolation,
                        format!(
                            "{} row(s) violate {}",
                            rows.len(),
                            sequence.join(" <= ")
                        ),
                    )
                    .with_column(sequence.join(","))
                    .with_rows(rows),
                );
            }
        }
    }

    fn check_future_timestamps(&self, table: &TransformedTable, issues: &mut Vec<ValidationIssue>) {
        let today = self.reference_time.date();
        for column in table.columns() {
            if !column.column_type.is_temporal() {
                continue;
            }
            let rows = matching_rows(column, |v| match v {
                Value::Date(d) => *d > today,
                Value::DateTime(dt) => *dt > self.reference_time,
                _ => false,
            });
            if !rows.is_empty() {
                issues.push(
                    ValidationIssue::critical(
                        Rule::FutureTimestamp,
                        format!(
                            "{} value(s) in '{}' are after {}",
                            rows.len(),
                            column.name,
                            self.reference_time.format("%Y-%m-%d %H:%M:%S")
                        ),
                    )
                    .with_column(column.name.clone())
                    .with_rows(rows),
                );
            }
        }
    }

    fn check_outliers(&self, table: &TransformedTable, issues: &mut Vec<ValidationIssue>) {
        for column in table.columns() {
            if !column.column_type.is_numeric() {
                continue;
            }
            let points: Vec<(usize, f64)> = column
                .values
                .iter()
                .enumerate()
                .filter_map(|(row, v)| v.as_f64().map(|x| (row, x)))
                .collect();
            if points.len() < self.thresholds.iqr_min_samples.max(1) {
                continue;
            }

            let mut sorted: Vec<f64> = points.iter().map(|(_, x)| *x).collect();
            sorted.sort_by(f64::total_cmp);
            let q1 = quantile(&sorted, 0.25);
            let q3 = quantile(&sorted, 0.75);
            let spread = (q3 - q1) * self.thresholds.iqr_multiplier;
            let (lower, upper) = (q1 - spread, q3 + spread);

            let rows: Vec<usize> = points
                .iter()
                .filter(|(_, x)| *x < lower || *x > upper)
                .map(|(row, _)| *row)
                .collect();
            if !rows.is_empty() {
                issues.push(
                    ValidationIssue::warning(
                        Rule::Outlier,
                        format!(
                            "{} outlier(s) in '{}' outside [{:.2}, {:.2}]",
                            rows.len(),
                            column.name,
                            lower,
                            upper
                        ),
                    )
                    .with_column(column.name.clone())
                    .with_rows(rows),
                );
            }
        }
    }

    fn check_duplicates(
        &self,
        table: &TransformedTable,
        rules: &ValidationRules,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let columns = table.columns();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut duplicate_rows = Vec::new();
        for row in 0..table.row_count() {
            let fingerprint = columns
                .iter()
                .map(|c| c.values[row].fingerprint())
                .collect::<Vec<_>>()
                .join("\u{1f}");
            if seen.insert(fingerprint, row).is_some() {
                duplicate_rows.push(row);
            }
        }
        if !duplicate_rows.is_empty() {
            issues.push(
                ValidationIssue::warning(
                    Rule::DuplicateRows,
                    format!("{} fully duplicated row(s)", duplicate_rows.len()),
                )
                .with_rows(duplicate_rows),
            );
        }

        if rules.key_columns.is_empty() {
            return;
        }
        let key_columns: Option<Vec<&Column>> =
            rules.key_columns.iter().map(|k| table.column(k)).collect();
        let Some(key_columns) = key_columns else {
            return;
        };
        let mut keys = HashSet::new();
        let mut duplicate_keys = Vec::new();
        for row in 0..table.row_count() {
            let key: Option<Vec<String>> =
                key_columns.iter().map(|c| c.values[row].as_key()).collect();
            if let Some(key) = key {
                if !keys.insert(key) {
                    duplicate_keys.push(row);
                }
            }
        }
        if !duplicate_keys.is_empty() {
            let key_name = rules.key_columns.join(",");
            issues.push(
                ValidationIssue::warning(
                    Rule::DuplicateKey,
                    format!(
                        "{} row(s) repeat an existing '{}' key",
                        duplicate_keys.len(),
                        key_name
                    ),
                )
                .with_column(key_name)
                .with_rows(duplicate_keys),
            );
        }
    }

    fn check_null_rates(&self, table: &TransformedTable, issues: &mut Vec<ValidationIssue>) {
        let total = table.row_count();
        if total == 0 {
            return;
        }
        for column in table.columns() {
            if column.name == PROCESSING_DATE_COLUMN {
                continue;
            }
            let missing = column.values.iter().filter(|v| v.is_missing()).count();
            let rate = missing as f64 / total as f64;
            if rate > self.thresholds.null_rate_threshold {
                issues.push(
                    ValidationIssue::warning(
                        Rule::ExcessiveNulls,
                        format!(
                            "'{}' is {:.1}% empty (threshold {:.1}%)",
                            column.name,
                            rate * 100.0,
                            self.thresholds.null_rate_threshold * 100.0
                        ),
                    )
                    .with_column(column.name.clone()),
                );
            }
        }
    }
}

/// Linear-interpolated quantile of sorted, non-empty data
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn matching_rows(column: &Column, pred: impl Fn(&Value) -> bool) -> Vec<usize> {
    column
        .values
        .iter()
        .enumerate()
        .filter(|(_, v)| pred(v))
        .map(|(row, _)| row)
        .collect()
}

fn numeric_rows(column: &Column, pred: impl Fn(f64) -> bool) -> Vec<usize> {
    matching_rows(column, |v| v.as_f64().is_some_and(&pred))
}

/// Rows holding a non-blank string that satisfies `pred`
fn text_rows(column: &Column, pred: impl Fn(&str) -> bool) -> Vec<usize> {
    matching_rows(column, |v| {
        v.as_str().is_some_and(|s| !s.trim().is_empty() && pred(s))
    })
}

fn push_rows(
    issues: &mut Vec<ValidationIssue>,
    rule: Rule,
    column: &Column,
    rows: Vec<usize>,
    what: &str,
) {
    if rows.is_empty() {
        return;
    }
    issues.push(
        ValidationIssue::warning(
            rule,
            format!("{} value(s) in '{}' {}", rows.len(), column.name, what),
        )
        .with_column(column.name.clone())
        .with_rows(rows),
    );
}
