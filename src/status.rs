//! # Tide Status State Machine
//!
//! Sweeps the station's [`TideSchedule`] against the current minute, the way a
//! calendar fires events:
//!
//! 1. A head whose time equals `now` fires: its boolean flips true and the status
//!    becomes that extreme.
//! 2. Heads strictly before `now` are dropped and the boolean goes false.
//! 3. When nothing fired and both sequences still have a head, the status is
//!    `Falling` if the next low comes first, otherwise `Rising`.
//! 4. When a sequence has run dry before the next refresh, the last computed
//!    status is kept rather than reverting to `Unknown`.
//!
//! No water-level sampling is involved; predictions alone drive the status.

use crate::schedule::TideSchedule;
use crate::{Status, TideKind, TidePrediction};
use chrono::{DurationRound, NaiveDateTime, TimeDelta};

/// Result of one evaluation, ready to be published.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub status: Status,
    pub high_tide: bool,
    pub low_tide: bool,
    pub next_high: Option<TidePrediction>,
    pub next_low: Option<TidePrediction>,
}

#[derive(Clone, Debug, Default)]
pub struct TideStatusMachine {
    status: Status,
    high_tide: bool,
    low_tide: bool,
}

impl TideStatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Advance the machine to `now`, pruning expired heads from `schedule`.
    ///
    /// Evaluating twice at the same minute without touching the schedule yields
    /// the same result.
    pub fn evaluate(&mut self, schedule: &mut TideSchedule, now: NaiveDateTime) -> Evaluation {
        let now = truncate_to_minute(now);

        let high_fired = self.sweep(schedule, TideKind::High, now);
        let low_fired = self.sweep(schedule, TideKind::Low, now);

        if !high_fired && !low_fired {
            if let (Some(high), Some(low)) = (schedule.next(TideKind::High), schedule.next(TideKind::Low)) {
                self.status = if low.occurs_at < high.occurs_at {
                    Status::Falling
                } else {
                    Status::Rising
                };
            }
        }

        Evaluation {
            status: self.status,
            high_tide: self.high_tide,
            low_tide: self.low_tide,
            next_high: schedule.next(TideKind::High).cloned(),
            next_low: schedule.next(TideKind::Low).cloned(),
        }
    }

    /// Returns true when the head of `kind` occurs exactly at `now`.
    fn sweep(&mut self, schedule: &mut TideSchedule, kind: TideKind, now: NaiveDateTime) -> bool {
        let had_entries = schedule.next(kind).is_some();
        schedule.prune_before(kind, now);

        let fired = schedule.next(kind).is_some_and(|head| head.occurs_at == now);

        if fired {
            self.set_flag(kind, true);
            self.status = match kind {
                TideKind::High => Status::High,
                TideKind::Low => Status::Low,
            };
        } else if had_entries {
            self.set_flag(kind, false);
        }

        fired
    }

    fn set_flag(&mut self, kind: TideKind, value: bool) {
        match kind {
            TideKind::High => self.high_tide = value,
            TideKind::Low => self.low_tide = value,
        }
    }
}

/// Predictions have minute resolution; seconds are discarded before comparing.
pub fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.duration_trunc(TimeDelta::minutes(1)).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    /// High at 10:15 today, low at 04:00 tomorrow.
    fn scenario_schedule() -> TideSchedule {
        TideSchedule::from_predictions(
            vec![
                TidePrediction::new(at(16, 10, 15), 4.2, TideKind::High),
                TidePrediction::new(at(17, 4, 0), 0.3, TideKind::Low),
            ],
            at(16, 0, 0),
        )
    }

    #[test]
    fn starts_unknown() {
        let mut machine = TideStatusMachine::new();
        let mut schedule = TideSchedule::new();
        let eval = machine.evaluate(&mut schedule, at(16, 9, 0));

        assert_eq!(eval.status, Status::Unknown);
        assert!(!eval.high_tide);
        assert!(!eval.low_tide);
        assert!(eval.next_high.is_none());
    }

    #[test]
    fn rising_when_high_comes_first() {
        let mut machine = TideStatusMachine::new();
        let mut schedule = scenario_schedule();

        let eval = machine.evaluate(&mut schedule, at(16, 9, 0));

        assert_eq!(eval.status, Status::Rising);
        assert!(!eval.high_tide);
        assert_eq!(eval.next_high.unwrap().level, 4.2);
    }

    #[test]
    fn falling_when_low_comes_first() {
        let mut machine = TideStatusMachine::new();
        let mut schedule = TideSchedule::from_predictions(
            vec![
                TidePrediction::new(at(16, 22, 48), 4.6, TideKind::High),
                TidePrediction::new(at(16, 16, 40), 0.1, TideKind::Low),
            ],
            at(16, 12, 0),
        );

        assert_eq!(machine.evaluate(&mut schedule, at(16, 12, 0)).status, Status::Falling);
    }

    #[test]
    fn high_fires_at_exact_minute_ignoring_seconds() {
        let mut machine = TideStatusMachine::new();
        let mut schedule = scenario_schedule();
        let now = at(16, 10, 15) + TimeDelta::seconds(42);

        let eval = machine.evaluate(&mut schedule, now);

        assert!(eval.high_tide);
        assert_eq!(eval.status, Status::High);
        // The firing head stays until the minute has passed
        assert_eq!(schedule.sequence(TideKind::High).len(), 1);
    }

    #[test]
    fn evaluation_is_idempotent_within_a_minute() {
        let mut machine = TideStatusMachine::new();
        let mut schedule = scenario_schedule();

        let first = machine.evaluate(&mut schedule, at(16, 10, 15));
        let second = machine.evaluate(&mut schedule, at(16, 10, 15) + TimeDelta::seconds(30));

        assert_eq!(first, second);
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn passed_high_is_dropped_once_and_status_is_retained() {
        let mut machine = TideStatusMachine::new();
        let mut schedule = scenario_schedule();

        machine.evaluate(&mut schedule, at(16, 10, 15));
        let eval = machine.evaluate(&mut schedule, at(16, 10, 16));

        assert!(!eval.high_tide);
        assert!(eval.next_high.is_none());
        // No high left to compare against; keep the last status
        assert_eq!(eval.status, Status::High);

        let later = machine.evaluate(&mut schedule, at(16, 11, 0));
        assert_eq!(later.status, Status::High);
        assert!(schedule.sequence(TideKind::High).is_empty());
        assert_eq!(schedule.sequence(TideKind::Low).len(), 1);
    }

    #[test]
    fn low_tide_fires_and_then_clears() {
        let mut machine = TideStatusMachine::new();
        let mut schedule = TideSchedule::from_predictions(
            vec![
                TidePrediction::new(at(16, 16, 40), 0.1, TideKind::Low),
                TidePrediction::new(at(17, 5, 1), 0.2, TideKind::Low),
                TidePrediction::new(at(16, 22, 48), 4.6, TideKind::High),
            ],
            at(16, 12, 0),
        );

        let eval = machine.evaluate(&mut schedule, at(16, 16, 40));
        assert!(eval.low_tide);
        assert_eq!(eval.status, Status::Low);

        let eval = machine.evaluate(&mut schedule, at(16, 16, 41));
        assert!(!eval.low_tide);
        assert_eq!(eval.next_low.unwrap().occurs_at, at(17, 5, 1));
        // Next high (22:48) precedes next low (05:01 tomorrow)
        assert_eq!(eval.status, Status::Rising);
    }

    #[test]
    fn stale_heads_are_all_pruned_in_one_tick() {
        let mut machine = TideStatusMachine::new();
        let mut schedule = TideSchedule::from_predictions(
            vec![
                TidePrediction::new(at(16, 10, 15), 4.2, TideKind::High),
                TidePrediction::new(at(16, 22, 48), 4.6, TideKind::High),
                TidePrediction::new(at(17, 11, 2), 4.0, TideKind::High),
                TidePrediction::new(at(17, 5, 1), 0.2, TideKind::Low),
            ],
            at(16, 0, 0),
        );

        let eval = machine.evaluate(&mut schedule, at(17, 0, 0));

        assert_eq!(eval.next_high.unwrap().occurs_at, at(17, 11, 2));
        assert_eq!(eval.status, Status::Falling);
    }

    #[test]
    fn head_reached_after_pruning_fires_immediately() {
        let mut machine = TideStatusMachine::new();
        let mut schedule = TideSchedule::from_predictions(
            vec![
                TidePrediction::new(at(16, 10, 15), 4.2, TideKind::High),
                TidePrediction::new(at(16, 22, 48), 4.6, TideKind::High),
            ],
            at(16, 0, 0),
        );

        let eval = machine.evaluate(&mut schedule, at(16, 22, 48));
        assert!(eval.high_tide);
        assert_eq!(eval.status, Status::High);
    }

    #[test]
    fn truncation_drops_seconds_and_nanos() {
        let now = at(16, 10, 15) + TimeDelta::milliseconds(59_999);
        assert_eq!(truncate_to_minute(now), at(16, 10, 15));
    }
}
