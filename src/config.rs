//! Configuration System
//!
//! Handles loading configuration from TOML files with per-field defaults.
//! Every section maps onto one subsystem: storage (data dir, disk
//! watermark, segmenting defaults), api (bind address), logging.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.data_dir.is_empty() {
            return Err(ConfigError::Invalid("storage.data_dir is empty".to_string()));
        }
        if self.storage.max_disk_usage_percent > 100 {
            return Err(ConfigError::Invalid(
                "storage.max_disk_usage_percent must be 0..=100".to_string(),
            ));
        }
        if self.storage.segment_interval_hours == 0 {
            return Err(ConfigError::Invalid(
                "storage.segment_interval_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Refuse writes above this disk usage percentage; 0 means read-only.
    #[serde(default = "default_max_disk_usage_percent")]
    pub max_disk_usage_percent: u8,

    #[serde(default = "default_disk_capacity_bytes")]
    pub disk_capacity_bytes: u64,

    /// Default time-segment width for newly defined groups.
    #[serde(default = "default_segment_interval_hours")]
    pub segment_interval_hours: u32,

    /// Default shard count for newly defined groups.
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
}

fn default_data_dir() -> String {
    "./strata_data".to_string()
}

fn default_max_disk_usage_percent() -> u8 {
    95
}

fn default_disk_capacity_bytes() -> u64 {
    64 * 1024 * 1024 * 1024 // 64 GiB
}

fn default_segment_interval_hours() -> u32 {
    24
}

fn default_shard_count() -> u32 {
    2
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_disk_usage_percent: default_max_disk_usage_percent(),
            disk_capacity_bytes: default_disk_capacity_bytes(),
            segment_interval_hours: default_segment_interval_hours(),
            shard_count: default_shard_count(),
        }
    }
}

impl StorageSection {
    pub fn segment_interval_nanos(&self) -> i64 {
        self.segment_interval_hours as i64 * 3_600_000_000_000
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    17913
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Filter directive when `STRATA_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "strata=info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}
