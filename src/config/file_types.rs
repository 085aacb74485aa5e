//! Per-file-type configuration: column mappings, target schema and rules
//!
//! Every supported export is described by a [`FileTypeConfig`] value. The
//! pipeline is generic over these values; adding or changing a file type is
//! a data change, not a code change.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::error::{ConfigError, ConfigResult};
use crate::models::ColumnType;

/// Name of the column injected into every transformed table
pub const PROCESSING_DATE_COLUMN: &str = "processing_date";

/// Supported daily export types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    AllItemsReport,
    CheckDetails,
    CashEntries,
    ItemSelectionDetails,
    KitchenTimings,
    OrderDetails,
    PaymentDetails,
}

impl FileType {
    pub const ALL: [FileType; 7] = [
        FileType::AllItemsReport,
        FileType::CheckDetails,
        FileType::CashEntries,
        FileType::ItemSelectionDetails,
        FileType::KitchenTimings,
        FileType::OrderDetails,
        FileType::PaymentDetails,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::AllItemsReport => "AllItemsReport",
            FileType::CheckDetails => "CheckDetails",
            FileType::CashEntries => "CashEntries",
            FileType::ItemSelectionDetails => "ItemSelectionDetails",
            FileType::KitchenTimings => "KitchenTimings",
            FileType::OrderDetails => "OrderDetails",
            FileType::PaymentDetails => "PaymentDetails",
        }
    }

    /// Export file name as delivered by the POS
    pub fn file_name(&self) -> &'static str {
        match self {
            FileType::AllItemsReport => "AllItemsReport.csv",
            FileType::CheckDetails => "CheckDetails.csv",
            FileType::CashEntries => "CashEntries.csv",
            FileType::ItemSelectionDetails => "ItemSelectionDetails.csv",
            FileType::KitchenTimings => "KitchenTimings.csv",
            FileType::OrderDetails => "OrderDetails.csv",
            FileType::PaymentDetails => "PaymentDetails.csv",
        }
    }

    /// Warehouse table the file is loaded into
    pub fn table_name(&self) -> &'static str {
        match self {
            FileType::AllItemsReport => "all_items_report",
            FileType::CheckDetails => "check_details",
            FileType::CashEntries => "cash_entries",
            FileType::ItemSelectionDetails => "item_selection_details",
            FileType::KitchenTimings => "kitchen_timings",
            FileType::OrderDetails => "order_details",
            FileType::PaymentDetails => "payment_details",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

impl std::str::FromStr for FileType {
    type Err = ConfigError;

    /// Accepts the file name, its stem, or the target table name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stem = s.trim().trim_end_matches(".csv");
        FileType::ALL
            .into_iter()
            .find(|ft| ft.as_str().eq_ignore_ascii_case(stem) || ft.table_name() == stem)
            .ok_or_else(|| ConfigError::UnknownFileType(s.to_string()))
    }
}

/// Fixed mapping from an export header to its canonical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: String,
    pub target: String,
}

/// Declared column of the target schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Processing applied to a column instead of plain type parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SpecialRule {
    /// Free-text "`<n> hours, <n> minutes, <n> seconds`" to FLOAT minutes
    DurationToMinutes { column: String },
}

impl SpecialRule {
    pub fn column(&self) -> &str {
        match self {
            SpecialRule::DurationToMinutes { column } => column,
        }
    }
}

/// Amount column with a soft upper bound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetaryRule {
    pub column: String,
    pub soft_ceiling: f64,
    /// Payout-style columns may legitimately go negative
    #[serde(default)]
    pub allow_negative: bool,
}

/// Inclusive numeric bounds for a non-monetary column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeRule {
    pub column: String,
    pub min: f64,
    pub max: f64,
}

/// Card-digit column with an exact digit count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDigitsRule {
    pub column: String,
    pub length: usize,
}

/// Column restricted to a fixed vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub column: String,
    pub allowed: Vec<String>,
}

/// Maximum character length for a text column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRule {
    pub column: String,
    pub max_len: usize,
}

/// Business and anomaly rules for one file type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub monetary: Vec<MonetaryRule>,
    pub ranges: Vec<RangeRule>,
    pub percentage_columns: Vec<String>,
    pub guest_count_column: Option<String>,
    pub email_columns: Vec<String>,
    pub phone_columns: Vec<String>,
    pub card_digits: Vec<CardDigitsRule>,
    pub boolean_columns: Vec<String>,
    pub categories: Vec<CategoryRule>,
    pub max_lengths: Vec<LengthRule>,
    /// Datetime columns that must be non-decreasing left to right
    pub sequences: Vec<Vec<String>>,
    /// Columns that identify a row; repeated keys are reported
    pub key_columns: Vec<String>,
}

/// Everything the pipeline knows about one export type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTypeConfig {
    pub file_type: FileType,
    /// Ordered header mapping; headers listed here bypass sanitization
    pub columns: Vec<ColumnMapping>,
    /// Target schema, including `processing_date`
    pub schema: Vec<ColumnSpec>,
    #[serde(default)]
    pub special_rules: Vec<SpecialRule>,
    #[serde(default)]
    pub rules: ValidationRules,
    /// Text column that carries the closure description on synthetic rows
    #[serde(default)]
    pub closure_label_column: Option<String>,
}

impl FileTypeConfig {
    pub fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            columns: Vec::new(),
            schema: Vec::new(),
            special_rules: Vec::new(),
            rules: ValidationRules::default(),
            closure_label_column: None,
        }
    }

    /// Add a mapped column with its declared type
    pub fn with_column(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        let target = target.into();
        self.columns.push(ColumnMapping {
            source: source.into(),
            target: target.clone(),
        });
        self.schema.push(ColumnSpec::new(target, column_type));
        self
    }

    /// Add a mapped column that must be present and non-empty
    pub fn with_required_column(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        let target = target.into();
        self.columns.push(ColumnMapping {
            source: source.into(),
            target: target.clone(),
        });
        self.schema.push(ColumnSpec::new(target, column_type).required());
        self
    }

    /// Append the injected business date column to the schema
    pub fn with_processing_date(mut self) -> Self {
        self.schema
            .push(ColumnSpec::new(PROCESSING_DATE_COLUMN, ColumnType::Date).required());
        self
    }

    pub fn with_special_rule(mut self, rule: SpecialRule) -> Self {
        self.special_rules.push(rule);
        self
    }

    pub fn with_rules(mut self, rules: ValidationRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_closure_label(mut self, column: impl Into<String>) -> Self {
        self.closure_label_column = Some(column.into());
        self
    }

    pub fn table_name(&self) -> &'static str {
        self.file_type.table_name()
    }

    /// Configured canonical name for a raw header, if mapped
    pub fn canonical_name(&self, header: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|m| m.source == header)
            .map(|m| m.target.as_str())
    }

    pub fn column_spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.schema.iter().find(|c| c.name == name)
    }

    /// Special rule attached to a canonical column
    pub fn special_rule(&self, column: &str) -> Option<&SpecialRule> {
        self.special_rules.iter().find(|r| r.column() == column)
    }

    /// Names of columns that must be present and non-null
    pub fn required_columns(&self) -> Vec<&str> {
        self.schema
            .iter()
            .filter(|c| !c.nullable)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Check internal consistency of the mapping, schema and rules
    pub fn validate(&self) -> ConfigResult<()> {
        let ft = self.file_type;
        let mut names = HashSet::new();
        for spec in &self.schema {
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "{ft}: column '{}' declared twice",
                    spec.name
                )));
            }
        }
        if !names.contains(PROCESSING_DATE_COLUMN) {
            return Err(ConfigError::Invalid(format!(
                "{ft}: schema must declare '{PROCESSING_DATE_COLUMN}'"
            )));
        }

        let mut sources = HashSet::new();
        let mut targets = HashSet::new();
        for mapping in &self.columns {
            if !sources.insert(mapping.source.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "{ft}: header '{}' mapped twice",
                    mapping.source
                )));
            }
            if !targets.insert(mapping.target.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "{ft}: two headers map to '{}'",
                    mapping.target
                )));
            }
            if !names.contains(mapping.target.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "{ft}: mapped column '{}' missing from schema",
                    mapping.target
                )));
            }
        }

        for rule in &self.special_rules {
            match self.column_spec(rule.column()) {
                Some(spec) if spec.column_type == ColumnType::Float => {}
                Some(spec) => {
                    return Err(ConfigError::Invalid(format!(
                        "{ft}: duration column '{}' must be FLOAT, found {}",
                        spec.name, spec.column_type
                    )));
                }
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "{ft}: special rule references unknown column '{}'",
                        rule.column()
                    )));
                }
            }
        }

        for card in &self.rules.card_digits {
            if card.length == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{ft}: card digit length for '{}' must be positive",
                    card.column
                )));
            }
        }
        for range in &self.rules.ranges {
            if range.min > range.max {
                return Err(ConfigError::Invalid(format!(
                    "{ft}: range for '{}' has min above max",
                    range.column
                )));
            }
        }
        if let Some(label) = &self.closure_label_column {
            match self.column_spec(label) {
                Some(spec) if spec.column_type == ColumnType::String => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "{ft}: closure label column '{label}' must be a declared STRING column"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Identifier relationship checked across two files of the same date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferentialRule {
    pub name: String,
    pub parent: FileType,
    pub parent_key: String,
    pub child: FileType,
    pub child_key: String,
}

/// The table of file type configurations consumed by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTypeRegistry {
    file_types: Vec<FileTypeConfig>,
    #[serde(default)]
    referential_rules: Vec<ReferentialRule>,
}

impl FileTypeRegistry {
    pub fn new(file_types: Vec<FileTypeConfig>, referential_rules: Vec<ReferentialRule>) -> Self {
        Self {
            file_types,
            referential_rules,
        }
    }

    /// Parse a registry from TOML and validate it
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let registry: Self = toml::from_str(s)?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn get(&self, file_type: FileType) -> Option<&FileTypeConfig> {
        self.file_types.iter().find(|c| c.file_type == file_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileTypeConfig> {
        self.file_types.iter()
    }

    pub fn len(&self) -> usize {
        self.file_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_types.is_empty()
    }

    pub fn referential_rules(&self) -> &[ReferentialRule] {
        &self.referential_rules
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for config in &self.file_types {
            if !seen.insert(config.file_type) {
                return Err(ConfigError::Invalid(format!(
                    "{} configured twice",
                    config.file_type
                )));
            }
            config.validate()?;
        }
        for rule in &self.referential_rules {
            for (ft, key) in [(rule.parent, &rule.parent_key), (rule.child, &rule.child_key)] {
                let declared = self
                    .get(ft)
                    .is_some_and(|c| c.column_spec(key).is_some());
                if !declared {
                    return Err(ConfigError::Invalid(format!(
                        "referential rule '{}' uses undeclared column {ft}.{key}",
                        rule.name
                    )));
                }
            }
        }
        Ok(())
    }
}
