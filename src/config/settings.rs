//! Run-level settings: concurrency, closure thresholds, quality thresholds, retries

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{ConfigError, ConfigResult};

/// How dates are dispatched and what each date run does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillSettings {
    /// Concurrent dates per batch
    pub max_workers: usize,
    /// Dates per dispatch batch
    pub batch_size: usize,
    /// Skip dates the loader already holds
    pub skip_existing: bool,
    /// Run business rules and cross-file checks (schema enforcement always runs)
    pub validation_enabled: bool,
    /// How long an abort waits for in-flight dates
    pub drain_timeout_secs: u64,
    /// Where quality reports and run logs are written; `None` disables persistence
    pub reports_dir: Option<PathBuf>,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            max_workers: 3,
            batch_size: 10,
            skip_existing: true,
            validation_enabled: true,
            drain_timeout_secs: 300,
            reports_dir: None,
        }
    }
}

impl BackfillSettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Thresholds below which a date is treated as a closure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosureThresholds {
    pub min_files_threshold: usize,
    pub min_records_threshold: u64,
    pub min_sales_threshold: f64,
}

impl Default for ClosureThresholds {
    fn default() -> Self {
        Self {
            min_files_threshold: 4,
            min_records_threshold: 10,
            min_sales_threshold: 50.0,
        }
    }
}

/// Tunables for statistical and cross-file checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Fraction of missing values above which a column is flagged
    pub null_rate_threshold: f64,
    /// Fraction of orphaned child keys above which a relationship is flagged
    pub orphan_rate_threshold: f64,
    /// Percentage deviation from the trailing row-count mean that is flagged
    pub volume_deviation_pct: f64,
    /// Number of processed dates in the trailing volume baseline
    pub volume_window: usize,
    /// Minimum non-null values before IQR outlier detection runs
    pub iqr_min_samples: usize,
    pub iqr_multiplier: f64,
    /// Replaces every file's configured monetary soft ceiling when set
    pub monetary_soft_ceiling: Option<f64>,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            null_rate_threshold: 0.95,
            orphan_rate_threshold: 0.05,
            volume_deviation_pct: 50.0,
            volume_window: 7,
            iqr_min_samples: 4,
            iqr_multiplier: 1.5,
            monetary_soft_ceiling: None,
        }
    }
}

/// Bounded exponential backoff for transient collaborator errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately, for tests and local runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay_ms`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(63) as i32;
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exp);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Immutable configuration handed to the pipeline at construction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub backfill: BackfillSettings,
    pub closure: ClosureThresholds,
    pub quality: QualityThresholds,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML; absent sections and keys take their defaults
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.backfill.max_workers = max_workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.backfill.batch_size = batch_size;
        self
    }

    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.backfill.skip_existing = skip_existing;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.backfill.validation_enabled = enabled;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.backfill.drain_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backfill.reports_dir = Some(dir.into());
        self
    }

    pub fn with_closure_thresholds(mut self, closure: ClosureThresholds) -> Self {
        self.closure = closure;
        self
    }

    pub fn with_quality_thresholds(mut self, quality: QualityThresholds) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.backfill.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.backfill.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.closure.min_sales_threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "min_sales_threshold cannot be negative".into(),
            ));
        }
        for (name, value) in [
            ("null_rate_threshold", self.quality.null_rate_threshold),
            ("orphan_rate_threshold", self.quality.orphan_rate_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        if self.quality.volume_deviation_pct < 0.0 {
            return Err(ConfigError::Invalid(
                "volume_deviation_pct cannot be negative".into(),
            ));
        }
        if self.quality.monetary_soft_ceiling.is_some_and(|c| c <= 0.0) {
            return Err(ConfigError::Invalid(
                "monetary_soft_ceiling must be positive".into(),
            ));
        }
        if self.quality.iqr_multiplier <= 0.0 {
            return Err(ConfigError::Invalid("iqr_multiplier must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid("retry multiplier must be >= 1".into()));
        }
        Ok(())
    }

    /// Stable fingerprint recorded on every run log
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        // Serializing plain structs of numbers, strings and paths cannot fail
        if let Ok(json) = serde_json::to_vec(self) {
            hasher.update(&json);
        }
        format!("{:x}", hasher.finalize())
    }
}
