//! Station-local wall clock.
//!
//! NOAA predictions are requested with `time_zone=lst_ldt`, so every timestamp is
//! naive station-local time. Comparisons must use the station's clock, not the
//! host's.

use chrono::{Local, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Source of "now" for one station.
pub trait StationClock: Send + Sync {
    /// Current station-local time, without timezone information.
    fn now(&self) -> NaiveDateTime;
}

/// Real clock for a station whose timezone may or may not have been resolved.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    tz: Option<Tz>,
}

impl SystemClock {
    /// `None` is the degraded mode: host-local time stands in for station time.
    pub fn new(tz: Option<Tz>) -> Self {
        Self { tz }
    }
}

impl StationClock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.tz {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}
