//! Layered configuration.
//!
//! Uses `figment`: built-in defaults, then an optional TOML file, then
//! `ETLFLOW_`-prefixed environment variables (`__` separates nested keys, e.g.
//! `ETLFLOW_SCHEDULE__INTERVAL_SECS=3600`).

use crate::errors::ConfigError;
use crate::pipeline::RetryPolicy;
use crate::runner::OverlapPolicy;
use crate::utils::Timestamp;
use chrono::{TimeZone, Utc};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for one pipeline deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline name, used in logs and events.
    pub pipeline: String,
    /// Directory holding downloaded raw files.
    pub data_dir: PathBuf,
    /// Remote sources.
    pub sources: SourcesConfig,
    /// Relational store.
    pub storage: StorageConfig,
    /// Recurring trigger.
    pub schedule: ScheduleConfig,
    /// Stage retry defaults.
    pub retry: RetryDefaults,
    /// Validation gate.
    pub validation: ValidationConfig,
    /// HTTP fetcher.
    pub http: HttpConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline: "ecommerce_data_pipeline".to_string(),
            data_dir: PathBuf::from("./data"),
            sources: SourcesConfig::default(),
            storage: StorageConfig::default(),
            schedule: ScheduleConfig::default(),
            retry: RetryDefaults::default(),
            validation: ValidationConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Remote locations of the raw datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// URL of the orders CSV.
    pub orders_url: String,
    /// URL of the inventory CSV.
    pub inventory_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            orders_url: "http://127.0.0.1:8080/orders.csv".to_string(),
            inventory_url: "http://127.0.0.1:8080/inventory.csv".to_string(),
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("./data/etlflow.db"),
        }
    }
}

/// Recurring trigger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between scheduled runs.
    pub interval_secs: u64,
    /// Anchor of the schedule; fire times are `start_epoch + k * interval`.
    pub start_epoch: Timestamp,
    /// What to do with a trigger that arrives while a run is in progress.
    pub overlap: OverlapPolicy,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2 * 60 * 60,
            start_epoch: Utc
                .with_ymd_and_hms(2023, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            overlap: OverlapPolicy::default(),
        }
    }
}

impl ScheduleConfig {
    /// The interval as a duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Default retry behavior for every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryDefaults {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Seconds to wait between attempts.
    pub retry_delay_secs: u64,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            retries: 1,
            retry_delay_secs: 300,
        }
    }
}

impl RetryDefaults {
    /// The stage retry policy these settings describe.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_retries(self.retries, Duration::from_secs(self.retry_delay_secs))
    }
}

/// Validation gate settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Columns that must not contain nulls; empty means every column.
    pub required_columns: Vec<String>,
}

/// HTTP fetcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive such as `info` or `etlflow=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl PipelineConfig {
    /// Where the orders file is downloaded to.
    #[must_use]
    pub fn orders_path(&self) -> PathBuf {
        self.data_dir.join("orders.csv")
    }

    /// Where the inventory file is downloaded to.
    #[must_use]
    pub fn inventory_path(&self) -> PathBuf {
        self.data_dir.join("inventory.csv")
    }

    /// Checks values that deserialize fine but cannot be run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero interval, a blank pipeline
    /// name or a blank source URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.trim().is_empty() {
            return Err(ConfigError::Invalid("pipeline name cannot be empty".into()));
        }
        if self.schedule.interval_secs == 0 {
            return Err(ConfigError::Invalid("schedule.interval_secs must be positive".into()));
        }
        if self.sources.orders_url.trim().is_empty() || self.sources.inventory_url.trim().is_empty() {
            return Err(ConfigError::Invalid("source URLs cannot be empty".into()));
        }
        Ok(())
    }
}

/// The layered provider stack, without extracting.
#[must_use]
pub fn figment(config_file: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("ETLFLOW_").split("__"))
}

/// Loads and validates configuration.
///
/// # Errors
///
/// Returns an error if a source cannot be parsed or a value is invalid.
pub fn load_config(config_file: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let config: PipelineConfig = figment(config_file).extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
