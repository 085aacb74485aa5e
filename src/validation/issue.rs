//! Validation issues, severities and rule identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::FileType;

/// Ordered classification of an issue; reports take the maximum
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OK" => Ok(Severity::Ok),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Error family an issue belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Mapping,
    Conversion,
    Schema,
    BusinessRule,
    Anomaly,
    Referential,
}

/// Identifier of the rule that produced an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    // header mapping
    UnmappableHeader,
    DuplicateColumn,
    // cell conversion
    TypeConversion,
    DurationFormat,
    // schema
    MissingRequiredColumn,
    MissingOptionalColumn,
    ExtraColumn,
    TypeCoerced,
    TypeMismatch,
    RequiredNull,
    // business rules
    MonetarySoftCeiling,
    ValueOutOfRange,
    PercentageOutOfRange,
    GuestCountOutOfRange,
    InvalidEmail,
    InvalidPhone,
    InvalidCardDigits,
    InvalidBoolean,
    InvalidCategory,
    StringTooLong,
    OrderingViolation,
    // anomalies
    Outlier,
    DuplicateRows,
    DuplicateKey,
    NegativeAmount,
    FutureTimestamp,
    ExcessiveNulls,
    VolumeDeviation,
    // cross-file
    ReferentialOrphans,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::UnmappableHeader => "unmappable_header",
            Rule::DuplicateColumn => "duplicate_column",
            Rule::TypeConversion => "type_conversion",
            Rule::DurationFormat => "duration_format",
            Rule::MissingRequiredColumn => "missing_required_column",
            Rule::MissingOptionalColumn => "missing_optional_column",
            Rule::ExtraColumn => "extra_column",
            Rule::TypeCoerced => "type_coerced",
            Rule::TypeMismatch => "type_mismatch",
            Rule::RequiredNull => "required_null",
            Rule::MonetarySoftCeiling => "monetary_soft_ceiling",
            Rule::ValueOutOfRange => "value_out_of_range",
            Rule::PercentageOutOfRange => "percentage_out_of_range",
            Rule::GuestCountOutOfRange => "guest_count_out_of_range",
            Rule::InvalidEmail => "invalid_email",
            Rule::InvalidPhone => "invalid_phone",
            Rule::InvalidCardDigits => "invalid_card_digits",
            Rule::InvalidBoolean => "invalid_boolean",
            Rule::InvalidCategory => "invalid_category",
            Rule::StringTooLong => "string_too_long",
            Rule::OrderingViolation => "ordering_violation",
            Rule::Outlier => "outlier",
            Rule::DuplicateRows => "duplicate_rows",
            Rule::DuplicateKey => "duplicate_key",
            Rule::NegativeAmount => "negative_amount",
            Rule::FutureTimestamp => "future_timestamp",
            Rule::ExcessiveNulls => "excessive_nulls",
            Rule::VolumeDeviation => "volume_deviation",
            Rule::ReferentialOrphans => "referential_orphans",
        }
    }

    pub fn category(&self) -> IssueCategory {
        match self {
            Rule::UnmappableHeader | Rule::DuplicateColumn => IssueCategory::Mapping,
            Rule::TypeConversion | Rule::DurationFormat => IssueCategory::Conversion,
            Rule::MissingRequiredColumn
            | Rule::MissingOptionalColumn
            | Rule::ExtraColumn
            | Rule::TypeCoerced
            | Rule::TypeMismatch
            | Rule::RequiredNull => IssueCategory::Schema,
            Rule::MonetarySoftCeiling
            | Rule::ValueOutOfRange
            | Rule::PercentageOutOfRange
            | Rule::GuestCountOutOfRange
            | Rule::InvalidEmail
            | Rule::InvalidPhone
            | Rule::InvalidCardDigits
            | Rule::InvalidBoolean
            | Rule::InvalidCategory
            | Rule::StringTooLong
            | Rule::OrderingViolation => IssueCategory::BusinessRule,
            Rule::Outlier
            | Rule::DuplicateRows
            | Rule::DuplicateKey
            | Rule::NegativeAmount
            | Rule::FutureTimestamp
            | Rule::ExcessiveNulls
            | Rule::VolumeDeviation => IssueCategory::Anomaly,
            Rule::ReferentialOrphans => IssueCategory::Referential,
        }
    }

    /// Remediation text attached to reports when this rule fires
    pub fn remediation(&self) -> &'static str {
        match self {
            Rule::UnmappableHeader | Rule::DuplicateColumn | Rule::ExtraColumn => {
                "check the column mapping for this export; the header layout has changed"
            }
            Rule::TypeConversion | Rule::TypeMismatch => {
                "check the column mapping and declared type; values do not parse as expected"
            }
            Rule::DurationFormat => "check the duration format produced by the POS export",
            Rule::MissingRequiredColumn | Rule::MissingOptionalColumn => {
                "re-export the file; expected columns are missing"
            }
            Rule::RequiredNull => "re-export the file; required identifiers are empty",
            Rule::TypeCoerced => "no action required; values were coerced to the declared type",
            Rule::MonetarySoftCeiling | Rule::ValueOutOfRange | Rule::Outlier => {
                "review the flagged rows for data entry errors"
            }
            Rule::PercentageOutOfRange => "verify percentage columns are expressed as 0-100",
            Rule::GuestCountOutOfRange => "review guest counts entered at the terminal",
            Rule::InvalidEmail | Rule::InvalidPhone => {
                "clean customer contact data at the source"
            }
            Rule::InvalidCardDigits => "check card digit masking in the payment export",
            Rule::InvalidBoolean => "check boolean encoding in the export",
            Rule::InvalidCategory => "extend the allowed values if the new category is legitimate",
            Rule::StringTooLong => "check for concatenated or corrupted text fields",
            Rule::OrderingViolation => "check clock settings on POS terminals",
            Rule::DuplicateRows | Rule::DuplicateKey => {
                "re-export the file; it may contain duplicated records"
            }
            Rule::NegativeAmount => {
                "resolve negative amounts before loading; refunds may be misclassified"
            }
            Rule::FutureTimestamp => "check the export date range and terminal clocks",
            Rule::ExcessiveNulls => "check the column mapping; the column is mostly empty",
            Rule::VolumeDeviation => "re-export file; row count deviates from recent history",
            Rule::ReferentialOrphans => {
                "re-export the related files together; identifiers do not line up"
            }
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding produced by any validation stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub rule: Rule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Set on cross-file issues, where the owning file is not implied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileType>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<usize>,
}

impl ValidationIssue {
    pub fn new(severity: Severity, rule: Rule, message: impl Into<String>) -> Self {
        Self {
            severity,
            rule,
            column: None,
            file: None,
            message: message.into(),
            rows: Vec::new(),
        }
    }

    pub fn ok(rule: Rule, message: impl Into<String>) -> Self {
        Self::new(Severity::Ok, rule, message)
    }

    pub fn warning(rule: Rule, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, rule, message)
    }

    pub fn critical(rule: Rule, message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, rule, message)
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_file(mut self, file: FileType) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_rows(mut self, rows: Vec<usize>) -> Self {
        self.rows = rows;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Maximum severity over a set of issues; `Ok` when empty
pub fn max_severity<'a>(issues: impl IntoIterator<Item = &'a ValidationIssue>) -> Severity {
    issues
        .into_iter()
        .map(|i| i.severity)
        .max()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Ok < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"CRITICAL\""
        );
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
    }

    #[test]
    fn test_max_severity() {
        let issues = vec![
            ValidationIssue::ok(Rule::TypeCoerced, "coerced"),
            ValidationIssue::critical(Rule::NegativeAmount, "negative"),
            ValidationIssue::warning(Rule::Outlier, "outlier"),
        ];
        assert_eq!(max_severity(&issues), Severity::Critical);
        assert_eq!(max_severity(&issues[..1]), Severity::Ok);
        assert_eq!(max_severity(&Vec::<ValidationIssue>::new()), Severity::Ok);
    }

    #[test]
    fn test_rule_categories() {
        assert_eq!(Rule::ReferentialOrphans.category(), IssueCategory::Referential);
        assert_eq!(Rule::RequiredNull.category(), IssueCategory::Schema);
        assert_eq!(Rule::NegativeAmount.category(), IssueCategory::Anomaly);
        assert_eq!(
            serde_json::to_string(&Rule::MissingRequiredColumn).unwrap(),
            "\"missing_required_column\""
        );
    }

    #[test]
    fn test_issue_serialization_omits_empty_fields() {
        let issue = ValidationIssue::warning(Rule::InvalidEmail, "bad email")
            .with_column("email")
            .with_rows(vec![3]);
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["severity"], "WARNING");
        assert_eq!(json["rule"], "invalid_email");
        assert_eq!(json["rows"][0], 3);
        assert!(json.get("file").is_none());
    }
}
