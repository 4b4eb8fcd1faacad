//! # Tide Calendar Core Library
//!
//! This library tracks the tidal state of one or more NOAA observation stations.
//! For each station it periodically downloads hi/lo tide predictions and the latest
//! observed water level, keeps an ordered schedule of upcoming high and low tides,
//! and runs a small state machine that reports whether the tide is currently
//! `low`, `high`, `rising` or `falling`.
//!
//! ## Data Flow
//! 1. **Setup**: station metadata → capability flags → exposed property set
//! 2. **Refresh** (every ~6 minutes): predictions → [`schedule::TideSchedule`],
//!    latest water level → `currentLevel`
//! 3. **Tick** (every second): [`status::TideStatusMachine`] re-evaluates the schedule
//!    against station-local wall-clock time
//! 4. **Publish**: [`properties::PropertyPublisher`] emits a notification only when
//!    a value actually changes
//!
//! ## Core Types
//! - [`TidePrediction`]: a single predicted high or low tide
//! - [`TideKind`]: which extreme a prediction describes
//! - [`Status`]: the published tide status
//! - [`StationCapabilities`]: which NOAA data products a station offers

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub mod adapter;
pub mod clock;
pub mod config;
pub mod properties;
pub mod schedule;
pub mod station;
pub mod status;
pub mod tide_data;
pub mod timezone;
pub mod units;

#[cfg(test)]
mod tests;

/// Which extreme a prediction describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TideKind {
    High,
    Low,
}

/// A single predicted high or low tide.
///
/// Times are station-local and naive, exactly as NOAA reports them with
/// `time_zone=lst_ldt`. Levels are rounded to one decimal place.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use tide_calendar_lib::{TideKind, TidePrediction};
///
/// let at = NaiveDate::from_ymd_opt(2024, 6, 16)
///     .unwrap()
///     .and_hms_opt(10, 15, 0)
///     .unwrap();
/// let high = TidePrediction::new(at, 4.23, TideKind::High);
///
/// assert_eq!(high.level, 4.2);
/// assert_eq!(high.time_label(), "10:15");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TidePrediction {
    /// Station-local time of the extreme
    pub occurs_at: NaiveDateTime,
    /// Predicted level relative to MLLW, in the configured unit
    pub level: f64,
    /// High or low tide
    pub kind: TideKind,
}

impl TidePrediction {
    pub fn new(occurs_at: NaiveDateTime, level: f64, kind: TideKind) -> Self {
        Self {
            occurs_at,
            level: round_level(level),
            kind,
        }
    }

    /// `HH:MM` label used for the `*TideTime` properties.
    pub fn time_label(&self) -> String {
        self.occurs_at.format("%H:%M").to_string()
    }
}

/// Round a water level to the 0.1 resolution the properties advertise.
pub fn round_level(level: f64) -> f64 {
    (level * 10.0).round() / 10.0
}

/// Published tide status.
///
/// `Unknown` is only ever seen before the schedule has held enough data to
/// decide; once a status has been computed it is retained until replaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Low,
    High,
    Rising,
    Falling,
    #[default]
    Unknown,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Low => "low",
            Status::High => "high",
            Status::Rising => "rising",
            Status::Falling => "falling",
            Status::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data products a station offers, resolved once at setup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationCapabilities {
    pub has_tide_predictions: bool,
    pub has_water_levels: bool,
}

impl StationCapabilities {
    /// A station with neither product cannot be tracked.
    pub fn is_usable(&self) -> bool {
        self.has_tide_predictions || self.has_water_levels
    }
}
