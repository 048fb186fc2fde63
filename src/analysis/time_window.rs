//! Time windowing for decoded samples.
//!
//! Windows are half-open `[start, end)`. "Now" is always passed in by the
//! caller so results do not depend on the wall clock.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use super::types::*;

/// Half-open interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Window of length `lookback` ending at `now`.
    pub fn trailing(now: Timestamp, lookback: TimeDelta) -> Self {
        Self::ending_before(now, TimeDelta::zero(), lookback)
    }

    /// Window of length `length` ending `offset` before `now`.
    ///
    /// `ending_before(now, 30 days, 30 days)` is "the month before last month".
    pub fn ending_before(now: Timestamp, offset: TimeDelta, length: TimeDelta) -> Self {
        let end = now - offset;
        Self { start: end - length, end }
    }

    /// An inverted or zero-length window contains nothing
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn duration(&self) -> TimeDelta {
        if self.is_empty() {
            TimeDelta::zero()
        } else {
            self.end - self.start
        }
    }

    /// Length of the intersection with `[start, end)`
    pub fn overlap(&self, start: Timestamp, end: Timestamp) -> TimeDelta {
        let lo = self.start.max(start);
        let hi = self.end.min(end);
        if hi > lo {
            hi - lo
        } else {
            TimeDelta::zero()
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format(super::decoder::HISTORY_TIME_FORMAT),
            self.end.format(super::decoder::HISTORY_TIME_FORMAT)
        )
    }
}

/// Keep the samples that fall within `window`. No window means no filtering.
pub fn filter_samples(samples: Vec<Sample>, window: Option<&TimeWindow>) -> Vec<Sample> {
    match window {
        None => samples,
        Some(w) if w.is_empty() => Vec::new(),
        Some(w) => samples.into_iter().filter(|s| w.contains(s.timestamp)).collect(),
    }
}
