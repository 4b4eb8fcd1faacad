//! Unit system selection for NOAA requests and level properties.

use serde::{Deserialize, Serialize};

/// Unit system used for every level a station reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    English,
    Metric,
}

impl UnitSystem {
    /// Value of the `units` query parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            UnitSystem::English => "english",
            UnitSystem::Metric => "metric",
        }
    }

    /// Unit name advertised on level properties.
    pub fn length_unit(self) -> &'static str {
        match self {
            UnitSystem::English => "foot",
            UnitSystem::Metric => "meter",
        }
    }

    /// Minimum and maximum plausible water level.
    pub fn level_bounds(self) -> (f64, f64) {
        match self {
            UnitSystem::English => (-50.0, 50.0),
            UnitSystem::Metric => (-15.2, 15.2),
        }
    }
}
