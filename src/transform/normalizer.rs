//! Raw export to canonical, typed table

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::debug;

use super::convert::parse_cell;
use super::duration::parse_duration_minutes;
use super::error::ConversionError;
use super::sanitize::sanitize_header;
use crate::config::{FileTypeConfig, PROCESSING_DATE_COLUMN, SpecialRule};
use crate::models::{Column, ColumnType, RawTable, TransformedTable, Value};
use crate::validation::{Rule, ValidationIssue};

/// A transformed table plus the warnings raised while building it
#[derive(Debug, Clone)]
pub struct NormalizedFile {
    pub table: TransformedTable,
    pub issues: Vec<ValidationIssue>,
}

/// How a raw header resolved to a canonical column
struct ResolvedColumn<'a> {
    index: usize,
    header: &'a str,
    name: String,
    mapped: bool,
}

/// Map a raw table onto the canonical shape declared by `config`.
///
/// Headers listed in the configured mapping take their canonical name
/// directly; other headers are sanitized and kept as STRING columns so the
/// schema stage can report them. Cell problems never abort: they become
/// null values with one WARNING per affected column. A `processing_date`
/// column holding `date` is appended to every table.
pub fn normalize(raw: &RawTable, config: &FileTypeConfig, date: NaiveDate) -> NormalizedFile {
    let mut issues = Vec::new();
    let resolved = resolve_headers(raw, config, &mut issues);

    let rows = raw.row_count();
    let mut table = TransformedTable::new(config.file_type, date, rows);

    for col in resolved {
        let declared = config
            .column_spec(&col.name)
            .map(|spec| spec.column_type)
            .unwrap_or(ColumnType::String);
        let special = config.special_rule(&col.name);

        let mut values = Vec::with_capacity(rows);
        let mut failed: Vec<usize> = Vec::new();
        let mut sample: Option<ConversionError> = None;

        for (row, cell) in raw.column_cells(col.index).enumerate() {
            let parsed = match special {
                Some(SpecialRule::DurationToMinutes { .. }) => {
                    parse_duration_minutes(cell).map(Value::Float)
                }
                None => parse_cell(cell, declared),
            };
            match parsed {
                Ok(value) => values.push(value),
                Err(err) => {
                    values.push(Value::Null);
                    failed.push(row);
                    if sample.is_none() {
                        sample = Some(err);
                    }
                }
            }
        }

        if let Some(err) = sample {
            let rule = match err {
                ConversionError::Duration(_) => Rule::DurationFormat,
                ConversionError::Type { .. } => Rule::TypeConversion,
            };
            issues.push(
                ValidationIssue::warning(
                    rule,
                    format!(
                        "{} value(s) in '{}' could not be converted to {} and were set to null (first: {})",
                        failed.len(),
                        col.header,
                        declared,
                        err
                    ),
                )
                .with_column(col.name.clone())
                .with_rows(failed),
            );
        }

        if !col.mapped {
            debug!(
                file = config.file_type.file_name(),
                header = col.header,
                column = %col.name,
                "Unmapped header kept under sanitized name"
            );
        }
        table.push_column(Column::new(col.name, declared, values));
    }

    table.push_column(Column::new(
        PROCESSING_DATE_COLUMN,
        ColumnType::Date,
        vec![Value::Date(date); rows],
    ));

    NormalizedFile { table, issues }
}

fn resolve_headers<'a>(
    raw: &'a RawTable,
    config: &FileTypeConfig,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<ResolvedColumn<'a>> {
    let mut seen: HashSet<String> = HashSet::from([PROCESSING_DATE_COLUMN.to_string()]);
    let mut resolved = Vec::new();

    for (index, header) in raw.headers().iter().enumerate() {
        let (name, mapped) = match config.canonical_name(header) {
            Some(name) => (name.to_string(), true),
            None => match sanitize_header(header) {
                Ok(name) => (name, false),
                Err(err) => {
                    issues.push(
                        ValidationIssue::warning(
                            Rule::UnmappableHeader,
                            format!("{err}; column dropped"),
                        )
                        .with_column(header.clone()),
                    );
                    continue;
                }
            },
        };

        if !seen.insert(name.clone()) {
            issues.push(
                ValidationIssue::warning(
                    Rule::DuplicateColumn,
                    format!("Header '{header}' resolves to existing column '{name}'; column dropped"),
                )
                .with_column(name),
            );
            continue;
        }

        resolved.push(ResolvedColumn {
            index,
            header: header.as_str(),
            name,
            mapped,
        });
    }
    resolved
}
