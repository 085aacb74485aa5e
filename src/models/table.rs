//! Raw and transformed table representations

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;

use super::value::{ColumnType, Value};
use crate::config::FileType;

/// Rows of an export exactly as received, keyed by the original headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Build a table from header and row literals
    pub fn from_rows<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut table = Self::new(headers.into_iter().map(Into::into).collect());
        for row in rows {
            table.push_row(row.into_iter().map(Into::into).collect());
        }
        table
    }

    /// Decode a CSV export. The first record is the header line.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let mut table = Self::new(headers);
        for record in rdr.records() {
            let record = record?;
            table.push_row(record.iter().map(|v| v.to_string()).collect());
        }
        Ok(table)
    }

    pub fn from_csv_str(data: &str) -> Result<Self, csv::Error> {
        Self::from_csv_reader(data.as_bytes())
    }

    /// Append a row; short rows are padded with empty cells, long rows truncated
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell by row index and original header
    pub fn get(&self, row: usize, header: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h == header)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// All cells of the column at header position `idx`
    pub fn column_cells(&self, idx: usize) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |r| r[idx].as_str())
    }
}

/// A named, typed column of a transformed table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            column_type,
            values,
        }
    }

    /// A column of `rows` missing values for its type
    pub fn filled(name: impl Into<String>, column_type: ColumnType, rows: usize) -> Self {
        Self::new(name, column_type, vec![Value::Null; rows])
    }

    /// Row indices whose value is missing
    pub fn missing_rows(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_missing())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Canonically named, fully typed rows for one file type and business date.
///
/// Stored column-wise. Every column holds exactly `row_count` values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedTable {
    file_type: FileType,
    processing_date: NaiveDate,
    row_count: usize,
    columns: Vec<Column>,
}

impl TransformedTable {
    pub fn new(file_type: FileType, processing_date: NaiveDate, row_count: usize) -> Self {
        Self {
            file_type,
            processing_date,
            row_count,
            columns: Vec::new(),
        }
    }

    pub(crate) fn push_column(&mut self, column: Column) {
        debug_assert_eq!(column.values.len(), self.row_count);
        self.columns.push(column);
    }

    pub(crate) fn take_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Target table for the loader
    pub fn table_name(&self) -> &'static str {
        self.file_type.table_name()
    }

    pub fn processing_date(&self) -> NaiveDate {
        self.processing_date
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    /// One row as (column, value) pairs in column order
    pub fn row(&self, idx: usize) -> Vec<(&str, &Value)> {
        self.columns
            .iter()
            .filter_map(|c| c.values.get(idx).map(|v| (c.name.as_str(), v)))
            .collect()
    }

    /// Rows as maps, the shape handed to warehouse clients
    pub fn records(&self) -> Vec<BTreeMap<String, Value>> {
        (0..self.row_count)
            .map(|i| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[i].clone()))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_table_from_csv() {
        let raw = RawTable::from_csv_str("Order Id,Amount\nA1,12.50\nA2\n").unwrap();
        assert_eq!(raw.headers(), &["Order Id".to_string(), "Amount".to_string()]);
        assert_eq!(raw.row_count(), 2);
        assert_eq!(raw.get(0, "Amount"), Some("12.50"));
        // short row is padded
        assert_eq!(raw.get(1, "Amount"), Some(""));
        assert_eq!(raw.get(0, "Missing"), None);
    }

    #[test]
    fn test_transformed_table_access() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let mut table = TransformedTable::new(FileType::OrderDetails, date, 2);
        table.push_column(Column::new(
            "order_id",
            ColumnType::String,
            vec![Value::String("A".into()), Value::String("B".into())],
        ));
        table.push_column(Column::filled("tip", ColumnType::Float, 2));

        assert_eq!(table.table_name(), "order_details");
        assert_eq!(table.column_names(), vec!["order_id", "tip"]);
        assert_eq!(table.value(1, "order_id"), Some(&Value::String("B".into())));
        assert_eq!(table.records()[0].get("tip"), Some(&Value::Null));

        let tip = table.take_column("tip").unwrap();
        assert_eq!(tip.missing_rows(), vec![0, 1]);
        assert!(!table.has_column("tip"));
    }
}
