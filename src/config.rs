//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the tide-config.toml file.
//! It provides a centralized way to configure which NOAA stations are tracked, the unit
//! system, the NOAA endpoints and the refresh/check intervals.

use crate::units::UnitSystem;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "tide-config.toml";

/// Shortest prediction window that still guarantees one future high and one future low
const MIN_PREDICTION_RANGE_HOURS: u32 = 24;

/// Application configuration loaded from tide-config.toml
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// NOAA station IDs to track (e.g., "8418150" for Portland, ME)
    pub stations: Vec<String>,
    /// Unit system for all levels
    pub unit: UnitSystem,
    /// NOAA endpoint configuration
    pub api: ApiConfig,
    /// Refresh and status-check timing
    pub schedule: ScheduleConfig,
}

/// NOAA Tides and Currents endpoints
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Metadata API base, `/stations/{id}.json` is appended
    pub metadata_url: String,
    /// Data getter endpoint for predictions and water levels
    pub data_url: String,
    /// Application name NOAA asks clients to identify with
    pub application: String,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

/// Timing of the two per-station activities
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between prediction/water-level refreshes
    pub refresh_secs: u64,
    /// Seconds between status checks
    pub check_secs: u64,
    /// Hours of predictions requested per refresh
    pub prediction_range_hours: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stations: Vec::new(),
            unit: UnitSystem::English,
            api: ApiConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            metadata_url: "https://tidesandcurrents.noaa.gov/mdapi/latest/webapi".to_string(),
            data_url: "https://tidesandcurrents.noaa.gov/api/datagetter".to_string(),
            application: "NOS.COOPS.TAC.WL".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            refresh_secs: 60 * 6,
            check_secs: 1,
            prediction_range_hours: 36,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ScheduleConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_secs.max(1))
    }

    /// Requested window, never shorter than a full day.
    pub fn prediction_range(&self) -> u32 {
        self.prediction_range_hours.max(MIN_PREDICTION_RANGE_HOURS)
    }
}

impl Config {
    /// Load configuration from tide-config.toml file
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        stations = config.stations.len(),
                        unit = config.unit.as_param(),
                        "loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), "invalid config file format: {}", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save current configuration to the given path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}
