//! Cell parsing and value coercion for declared column types

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use super::error::ConversionError;
use crate::models::{ColumnType, Value};

/// Accepted date layouts, tried in order. Two-digit years come first so
/// that `%Y` does not read `24` as year 24.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d-%b-%Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%y %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%y %I:%M:%S %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H:%M:%S%.f", "%I:%M %p", "%I:%M:%S %p"];

const TRUE_TOKENS: &[&str] = &["yes", "true", "1"];
const FALSE_TOKENS: &[&str] = &["no", "false", "0"];

/// Parse one raw cell into its declared type.
///
/// Empty or whitespace-only input yields the type's missing value and is
/// never an error. STRING cells are kept verbatim.
pub fn parse_cell(raw: &str, column_type: ColumnType) -> Result<Value, ConversionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(column_type.missing_value());
    }
    match column_type {
        ColumnType::String => Ok(Value::String(raw.to_string())),
        ColumnType::Integer => parse_integer(trimmed).map(Value::Integer),
        ColumnType::Float => parse_float(trimmed).map(Value::Float),
        ColumnType::Boolean => parse_boolean(trimmed).map(Value::Boolean),
        ColumnType::Date => parse_date(trimmed).map(Value::Date),
        ColumnType::DateTime => parse_datetime(trimmed).map(Value::DateTime),
        ColumnType::Time => parse_time(trimmed).map(Value::Time),
    }
}

fn strip_numeric(raw: &str, strip_percent: bool) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '$' | ' ') && !(strip_percent && *c == '%'))
        .collect()
}

/// Integers accept thousands separators, a currency sign, and whole floats
pub fn parse_integer(raw: &str) -> Result<i64, ConversionError> {
    let cleaned = strip_numeric(raw, false);
    if let Ok(i) = cleaned.parse::<i64>() {
        return Ok(i);
    }
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(ConversionError::type_error(raw, ColumnType::Integer)),
    }
}

pub fn parse_float(raw: &str) -> Result<f64, ConversionError> {
    strip_numeric(raw, true)
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| ConversionError::type_error(raw, ColumnType::Float))
}

pub fn parse_boolean(raw: &str) -> Result<bool, ConversionError> {
    let token = raw.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Ok(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Ok(false)
    } else {
        Err(ConversionError::type_error(raw, ColumnType::Boolean))
    }
}

/// Whether a string is one of the accepted boolean tokens
pub fn is_boolean_token(raw: &str) -> bool {
    parse_boolean(raw).is_ok()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ConversionError> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_datetime_only(raw).map(|dt| dt.date()))
        .ok_or_else(|| ConversionError::type_error(raw, ColumnType::Date))
}

fn parse_datetime_only(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// Datetimes also accept a bare date, read as midnight
pub fn parse_datetime(raw: &str) -> Result<NaiveDateTime, ConversionError> {
    parse_datetime_only(raw)
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| ConversionError::type_error(raw, ColumnType::DateTime))
}

pub fn parse_time(raw: &str) -> Result<NaiveTime, ConversionError> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| ConversionError::type_error(raw, ColumnType::Time))
}

/// Coerce an already typed value to another declared type.
///
/// Used by schema enforcement when a column's type differs from the target
/// schema. Missing values become the target's missing value.
pub fn coerce(value: &Value, target: ColumnType) -> Result<Value, ConversionError> {
    if value.is_missing() {
        return Ok(target.missing_value());
    }
    if value.column_type() == Some(target) {
        return Ok(value.clone());
    }
    let fail = || ConversionError::type_error(value.to_string(), target);
    match (value, target) {
        (Value::String(s), _) => parse_cell(s, target),
        (_, ColumnType::String) => Ok(Value::String(value.to_string())),
        (Value::Integer(i), ColumnType::Float) => Ok(Value::Float(*i as f64)),
        (Value::Float(f), ColumnType::Integer) if f.fract() == 0.0 => Ok(Value::Integer(*f as i64)),
        (Value::Integer(0), ColumnType::Boolean) => Ok(Value::Boolean(false)),
        (Value::Integer(1), ColumnType::Boolean) => Ok(Value::Boolean(true)),
        (Value::Date(d), ColumnType::DateTime) => {
            d.and_hms_opt(0, 0, 0).map(Value::DateTime).ok_or_else(fail)
        }
        (Value::DateTime(dt), ColumnType::Date) if dt.time() == NaiveTime::MIN => {
            Ok(Value::Date(dt.date()))
        }
        _ => Err(fail()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_cells_take_type_default() {
        assert_eq!(
            parse_cell("", ColumnType::String).unwrap(),
            Value::String(String::new())
        );
        assert_eq!(parse_cell("  ", ColumnType::Float).unwrap(), Value::Null);
        assert_eq!(parse_cell("", ColumnType::Date).unwrap(), Value::Null);
        assert_eq!(parse_cell("", ColumnType::Boolean).unwrap(), Value::Null);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_cell("12", ColumnType::Integer).unwrap(), Value::Integer(12));
        assert_eq!(parse_cell("1,200", ColumnType::Integer).unwrap(), Value::Integer(1200));
        assert_eq!(parse_cell("3.0", ColumnType::Integer).unwrap(), Value::Integer(3));
        assert!(parse_cell("3.5", ColumnType::Integer).is_err());
        assert_eq!(
            parse_cell("$1,234.50", ColumnType::Float).unwrap(),
            Value::Float(1234.5)
        );
        assert_eq!(parse_cell("45.5%", ColumnType::Float).unwrap(), Value::Float(45.5));
        assert!(parse_cell("n/a", ColumnType::Float).is_err());
    }

    #[test]
    fn test_identifiers_stay_verbatim() {
        assert_eq!(
            parse_cell("1.2E+15", ColumnType::String).unwrap(),
            Value::String("1.2E+15".into())
        );
        assert_eq!(
            parse_cell("000123", ColumnType::String).unwrap(),
            Value::String("000123".into())
        );
    }

    #[test]
    fn test_booleans() {
        for token in ["Yes", "TRUE", "1"] {
            assert_eq!(parse_cell(token, ColumnType::Boolean).unwrap(), Value::Boolean(true));
        }
        for token in ["no", "False", "0"] {
            assert_eq!(parse_cell(token, ColumnType::Boolean).unwrap(), Value::Boolean(false));
        }
        assert!(parse_cell("maybe", ColumnType::Boolean).is_err());
    }

    #[test]
    fn test_dates() {
        assert_eq!(parse_date("2024-01-15").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_date("01/15/24").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_date("01/15/2024").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_date("20240115").unwrap(), date(2024, 1, 15));
        assert!(parse_date("15th of January").is_err());
    }

    #[test]
    fn test_datetimes() {
        let expected = date(2024, 1, 15).and_hms_opt(18, 30, 0).unwrap();
        assert_eq!(parse_datetime("1/15/24 6:30 PM").unwrap(), expected);
        assert_eq!(parse_datetime("2024-01-15 18:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("2024-01-15T18:30:00").unwrap(), expected);
        assert_eq!(
            parse_datetime("2024-01-15").unwrap(),
            date(2024, 1, 15).and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_times() {
        assert_eq!(
            parse_time("6:05 PM").unwrap(),
            NaiveTime::from_hms_opt(18, 5, 0).unwrap()
        );
        assert_eq!(
            parse_time("18:05:30").unwrap(),
            NaiveTime::from_hms_opt(18, 5, 30).unwrap()
        );
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            coerce(&Value::String("12.5".into()), ColumnType::Float).unwrap(),
            Value::Float(12.5)
        );
        assert_eq!(
            coerce(&Value::Integer(7), ColumnType::Float).unwrap(),
            Value::Float(7.0)
        );
        assert_eq!(
            coerce(&Value::Float(7.0), ColumnType::Integer).unwrap(),
            Value::Integer(7)
        );
        assert_eq!(
            coerce(&Value::Integer(42), ColumnType::String).unwrap(),
            Value::String("42".into())
        );
        assert!(coerce(&Value::Boolean(true), ColumnType::Date).is_err());
        assert!(coerce(&Value::String("abc".into()), ColumnType::Integer).is_err());
        assert_eq!(coerce(&Value::Null, ColumnType::String).unwrap(), Value::String(String::new()));
    }
}
