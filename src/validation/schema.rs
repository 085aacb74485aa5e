//! Target schema enforcement for transformed tables

use crate::config::ColumnSpec;
use crate::models::{Column, TransformedTable, Value};
use crate::transform::coerce;

use super::issue::{Rule, ValidationIssue};

/// Outcome of enforcing a target schema on one table
#[derive(Debug, Clone)]
pub struct SchemaEnforcement {
    /// False when any violation is CRITICAL; such a table is not loaded
    pub compliant: bool,
    pub violations: Vec<ValidationIssue>,
    /// Columns in schema order, extras dropped, types coerced where possible
    pub corrected_table: TransformedTable,
}

/// Validate and correct `table` against `schema`.
///
/// - missing required column: CRITICAL
/// - missing nullable column: WARNING, added as all-null
/// - undeclared column: WARNING, dropped
/// - type differs: coerced value by value; OK if every value coerces,
///   CRITICAL otherwise
/// - required column with missing values: CRITICAL
pub fn enforce_schema(table: TransformedTable, schema: &[ColumnSpec]) -> SchemaEnforcement {
    let mut source = table;
    let rows = source.row_count();
    let mut corrected =
        TransformedTable::new(source.file_type(), source.processing_date(), rows);
    let mut violations = Vec::new();

    for spec in schema {
        let Some(column) = source.take_column(&spec.name) else {
            if spec.nullable {
                violations.push(
                    ValidationIssue::warning(
                        Rule::MissingOptionalColumn,
                        format!(
                            "Column '{}' not present; filled with nulls",
                            spec.name
                        ),
                    )
                    .with_column(spec.name.clone()),
                );
                corrected.push_column(Column::filled(spec.name.clone(), spec.column_type, rows));
            } else {
                violations.push(
                    ValidationIssue::critical(
                        Rule::MissingRequiredColumn,
                        format!("Required column '{}' is missing", spec.name),
                    )
                    .with_column(spec.name.clone()),
                );
            }
            continue;
        };

        let column = if column.column_type == spec.column_type {
            column
        } else {
            coerce_column(column, spec, &mut violations)
        };

        if !spec.nullable {
            let missing = column.missing_rows();
            if !missing.is_empty() {
                violations.push(
                    ValidationIssue::critical(
                        Rule::RequiredNull,
                        format!(
                            "Required column '{}' is empty in {} row(s)",
                            spec.name,
                            missing.len()
                        ),
                    )
                    .with_column(spec.name.clone())
                    .with_rows(missing),
                );
            }
        }
        corrected.push_column(column);
    }

    for extra in source.columns() {
        violations.push(
            ValidationIssue::warning(
                Rule::ExtraColumn,
                format!("Column '{}' is not declared in the target schema; dropped", extra.name),
            )
            .with_column(extra.name.clone()),
        );
    }

    let compliant = !violations.iter().any(ValidationIssue::is_critical);
    SchemaEnforcement {
        compliant,
        violations,
        corrected_table: corrected,
    }
}

fn coerce_column(
    column: Column,
    spec: &ColumnSpec,
    violations: &mut Vec<ValidationIssue>,
) -> Column {
    let from = column.column_type;
    let mut failed = Vec::new();
    let values = column
        .values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            coerce(value, spec.column_type).unwrap_or_else(|_| {
                failed.push(row);
                Value::Null
            })
        })
        .collect();

    if failed.is_empty() {
        violations.push(
            ValidationIssue::ok(
                Rule::TypeCoerced,
                format!("Column '{}' coerced from {} to {}", spec.name, from, spec.column_type),
            )
            .with_column(spec.name.clone()),
        );
    } else {
        violations.push(
            ValidationIssue::critical(
                Rule::TypeMismatch,
                format!(
                    "Column '{}' is {} but {} value(s) cannot be represented as {}",
                    spec.name,
                    from,
                    failed.len(),
                    spec.column_type
                ),
            )
            .with_column(spec.name.clone())
            .with_rows(failed),
        );
    }
    Column::new(spec.name.clone(), spec.column_type, values)
}
