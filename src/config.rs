//! Configuration management for linkyd
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{LinkydError, Result};
#[cfg(feature = "openapi")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Smallest lookback that still covers this week and last week
pub const MIN_LOOKBACK_DAYS: u32 = 14;
/// Longest lookback that stays within two calendar months
pub const MAX_LOOKBACK_DAYS: u32 = 28;
pub const MAX_DAY_OFFSET: u32 = 365;
/// One week
pub const MAX_STALE_AFTER_MINUTES: i64 = 7 * 24 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct Config {
    /// EDF API connection configuration
    pub api: ApiConfig,

    /// Reading window and aggregation behaviour
    pub data: DataConfig,

    /// Poll loop intervals
    pub polling: PollingConfig,

    /// Grid outage monitoring
    pub outage: OutageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// IANA timezone used to derive the naive local "now"
    pub timezone: String,
}

/// EDF API connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the EDF customer API
    pub base_url: String,

    /// Bearer token; obtaining and refreshing it happens outside linkyd
    pub access_token: String,

    /// Delivery point identifier (PDL) of the meter
    pub pdl_id: String,

    /// Business partner number attached to the contract
    pub business_partner: String,

    /// INSEE code of the commune, used for the grid status endpoint
    pub insee_code: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// Reading window and aggregation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct DataConfig {
    /// Upstream reporting lag in days; "today" for aggregation is now minus this
    pub day_offset: u32,

    /// Fetch monthly summaries and compute week/month/year comparisons
    pub extended_aggregates_enabled: bool,

    /// Local hour at which the next scheduled refresh becomes due
    pub refresh_hour: u32,

    /// Extra days of daily history fetched when extended aggregates are enabled
    pub lookback_days: u32,

    /// Clamp week windows to the reference month
    pub round_weeks_to_month: bool,
}

/// Poll loop intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct PollingConfig {
    /// Consumption data tick in minutes
    pub data_interval_minutes: u64,

    /// Grid status tick in minutes
    pub outage_interval_minutes: u64,
}

/// Grid outage monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct OutageConfig {
    /// Whether the grid status loop runs at all
    pub enabled: bool,

    /// Age after which the last good status is reported as stale
    pub stale_after_minutes: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct WebConfig {
    /// Serve the HTTP API
    pub enabled: bool,

    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "linkyd_config.yaml",
            "/data/linkyd_config.yaml",
            "/etc/linkyd/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                let config = Self::from_file(path)?;
                config.validate()?;
                return Ok(config);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone.parse::<chrono_tz::Tz>().map_err(|_| {
            LinkydError::validation("timezone", format!("Unknown timezone: {}", self.timezone))
        })
    }

    /// Days of daily history needed before the reference date
    pub const fn effective_lookback_days(&self) -> u32 {
        if self.data.extended_aggregates_enabled {
            self.data.lookback_days
        } else {
            0
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.data.refresh_hour > 23 {
            return Err(LinkydError::validation(
                "data.refresh_hour",
                "Must be between 0 and 23",
            ));
        }

        if self.data.day_offset > MAX_DAY_OFFSET {
            return Err(LinkydError::validation(
                "data.day_offset",
                format!("Must be at most {} days", MAX_DAY_OFFSET),
            ));
        }

        if self.data.extended_aggregates_enabled {
            if self.data.lookback_days < MIN_LOOKBACK_DAYS {
                return Err(LinkydError::validation(
                    "data.lookback_days",
                    "Must cover two full weeks when extended aggregates are enabled",
                ));
            }
            // The fetch plan covers the start and end months only
            if self.data.lookback_days > MAX_LOOKBACK_DAYS {
                return Err(LinkydError::validation(
                    "data.lookback_days",
                    format!("Must be at most {} days", MAX_LOOKBACK_DAYS),
                ));
            }
        }

        if !(1..=MAX_STALE_AFTER_MINUTES).contains(&self.outage.stale_after_minutes) {
            return Err(LinkydError::validation(
                "outage.stale_after_minutes",
                format!("Must be between 1 and {}", MAX_STALE_AFTER_MINUTES),
            ));
        }

        if self.polling.data_interval_minutes == 0 {
            return Err(LinkydError::validation(
                "polling.data_interval_minutes",
                "Must be greater than 0",
            ));
        }

        if self.polling.outage_interval_minutes == 0 {
            return Err(LinkydError::validation(
                "polling.outage_interval_minutes",
                "Must be greater than 0",
            ));
        }

        if self.api.base_url.trim().is_empty() {
            return Err(LinkydError::validation(
                "api.base_url",
                "Base URL cannot be empty",
            ));
        }

        self.tz()?;
        Ok(())
    }
}
