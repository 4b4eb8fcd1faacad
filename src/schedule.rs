//! # Upcoming Tide Schedule
//!
//! Per-station record of upcoming high and low tides, each kept in ascending time
//! order. A refresh replaces both sequences at once; the status machine only ever
//! removes entries from the front.

use crate::status::truncate_to_minute;
use crate::{TideKind, TidePrediction};
use chrono::NaiveDateTime;
use std::collections::VecDeque;

#[derive(Clone, Debug, Default)]
pub struct TideSchedule {
    high: VecDeque<TidePrediction>,
    low: VecDeque<TidePrediction>,
}

impl TideSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schedule from unordered predictions, dropping any before the
    /// minute containing `now`.
    pub fn from_predictions<I>(predictions: I, now: NaiveDateTime) -> Self
    where
        I: IntoIterator<Item = TidePrediction>,
    {
        let now = truncate_to_minute(now);
        let (mut high, mut low): (Vec<_>, Vec<_>) = predictions
            .into_iter()
            .filter(|p| p.occurs_at >= now)
            .partition(|p| p.kind == TideKind::High);

        high.sort_by_key(|p| p.occurs_at);
        low.sort_by_key(|p| p.occurs_at);

        Self {
            high: high.into(),
            low: low.into(),
        }
    }

    /// Swap in a freshly fetched schedule wholesale.
    pub fn replace(&mut self, fresh: TideSchedule) {
        *self = fresh;
    }

    pub fn sequence(&self, kind: TideKind) -> &VecDeque<TidePrediction> {
        match kind {
            TideKind::High => &self.high,
            TideKind::Low => &self.low,
        }
    }

    pub fn next(&self, kind: TideKind) -> Option<&TidePrediction> {
        self.sequence(kind).front()
    }

    /// Remove every entry of `kind` strictly before `now`, returning how many went.
    pub fn prune_before(&mut self, kind: TideKind, now: NaiveDateTime) -> usize {
        let sequence = match kind {
            TideKind::High => &mut self.high,
            TideKind::Low => &mut self.low,
        };

        let mut removed = 0;
        while sequence.front().is_some_and(|p| p.occurs_at < now) {
            sequence.pop_front();
            removed += 1;
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.low.is_empty()
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }
}
