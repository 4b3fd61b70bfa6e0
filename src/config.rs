//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, VlmBridgeError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub account: AccountConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub fleet: FleetConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Race service account
#[derive(Deserialize, Clone)]
pub struct AccountConfig {
    pub login: String,

    pub password: String,

    pub boat_id: u64,

    /// Forward waypoint changes from the bus to the race service
    #[serde(default)]
    pub set_waypoint: bool,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("login", &self.login)
            .field("password", &"***")
            .field("boat_id", &self.boat_id)
            .field("set_waypoint", &self.set_waypoint)
            .finish()
    }
}

/// Race service endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Task periods
#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_boat_ingest_interval_s")]
    pub boat_ingest_interval_s: u64,

    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    #[serde(default = "default_fleet_ingest_interval_s")]
    pub fleet_ingest_interval_s: u64,

    #[serde(default = "default_fleet_publish_interval_s")]
    pub fleet_publish_interval_s: u64,

    #[serde(default = "default_waypoint_interval_s")]
    pub waypoint_interval_s: u64,
}

/// Competitor tracking
#[derive(Debug, Deserialize, Clone)]
pub struct FleetConfig {
    #[serde(default = "default_fleet_enabled")]
    pub enabled: bool,
}

/// Delta recording to JSONL files
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default)]
    pub record_enabled: bool,

    #[serde(default = "default_record_dir")]
    pub record_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Diagnostics
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory of the daily log file; empty logs to stderr only
    #[serde(default)]
    pub dir: String,
}

// Default value functions
pub(crate) fn default_base_url() -> String { "https://www.v-l-m.org".to_string() }
pub(crate) fn default_timeout_ms() -> u64 { 30000 }

fn default_boat_ingest_interval_s() -> u64 { 300 }
fn default_publish_interval_ms() -> u64 { 1000 }
fn default_fleet_ingest_interval_s() -> u64 { 300 }
fn default_fleet_publish_interval_s() -> u64 { 15 }
fn default_waypoint_interval_s() -> u64 { 10 }

fn default_fleet_enabled() -> bool { true }

fn default_record_dir() -> String { "./records".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_log_level() -> String { "info".to_string() }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            boat_ingest_interval_s: default_boat_ingest_interval_s(),
            publish_interval_ms: default_publish_interval_ms(),
            fleet_ingest_interval_s: default_fleet_ingest_interval_s(),
            fleet_publish_interval_s: default_fleet_publish_interval_s(),
            waypoint_interval_s: default_waypoint_interval_s(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self { enabled: default_fleet_enabled() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            record_enabled: false,
            record_dir: default_record_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: String::new(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> VlmBridgeError {
    VlmBridgeError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vlm_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.account.login.is_empty() || self.account.password.is_empty() {
            return Err(invalid("login and password are required"));
        }

        if self.account.boat_id == 0 {
            return Err(invalid("boat_id is required"));
        }

        if !(self.service.base_url.starts_with("https://") || self.service.base_url.starts_with("http://")) {
            return Err(invalid("base_url must be an http(s) URL"));
        }

        if self.service.timeout_ms == 0 || self.service.timeout_ms > 120000 {
            return Err(invalid("timeout_ms must be between 1 and 120000"));
        }

        // The race service asks clients not to poll more than once a minute
        for (name, value) in [
            ("boat_ingest_interval_s", self.schedule.boat_ingest_interval_s),
            ("fleet_ingest_interval_s", self.schedule.fleet_ingest_interval_s),
        ] {
            if !(60..=3600).contains(&value) {
                return Err(invalid(format!("{} must be between 60 and 3600", name)));
            }
        }

        if self.schedule.publish_interval_ms < 100 || self.schedule.publish_interval_ms > 60000 {
            return Err(invalid("publish_interval_ms must be between 100 and 60000"));
        }

        for (name, value) in [
            ("fleet_publish_interval_s", self.schedule.fleet_publish_interval_s),
            ("waypoint_interval_s", self.schedule.waypoint_interval_s),
        ] {
            if !(1..=3600).contains(&value) {
                return Err(invalid(format!("{} must be between 1 and 3600", name)));
            }
        }

        if self.output.record_enabled && self.output.record_dir.is_empty() {
            return Err(invalid("record_dir cannot be empty when recording is enabled"));
        }

        if self.output.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.output.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
