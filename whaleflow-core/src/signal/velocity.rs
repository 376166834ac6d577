//! Transaction velocity: whale event rate against a trailing baseline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::WhaleEvent;

/// Event counts for one symbol at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityReading {
    /// Events in the trailing hour `(t - 1h, t]`.
    pub current_count: usize,
    /// Events in the trailing baseline window divided by its length in hours.
    pub baseline_average: f64,
}

impl VelocityReading {
    /// Measure velocity for `symbol` from a time-ordered event slice.
    ///
    /// Only events at or before `now` are counted. Walks backwards from the
    /// end, so callers should pass the visible prefix of the stream.
    pub fn measure(
        symbol: &str,
        events: &[WhaleEvent],
        now: DateTime<Utc>,
        baseline_hours: u32,
    ) -> Self {
        let hour_start = now - Duration::hours(1);
        // Clamp at the calendar floor instead of overflowing.
        let baseline_start = now
            .checked_sub_signed(Duration::hours(i64::from(baseline_hours)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut current_count = 0usize;
        let mut baseline_count = 0usize;
        for ev in events.iter().rev() {
            if ev.timestamp > now {
                continue;
            }
            if ev.timestamp <= baseline_start && ev.timestamp <= hour_start {
                break;
            }
            if !ev.is_for(symbol) {
                continue;
            }
            if ev.timestamp > hour_start {
                current_count += 1;
            }
            if ev.timestamp > baseline_start {
                baseline_count += 1;
            }
        }

        let baseline_average = if baseline_hours == 0 {
            0.0
        } else {
            baseline_count as f64 / f64::from(baseline_hours)
        };

        Self {
            current_count,
            baseline_average,
        }
    }

    /// True when the current hour runs hotter than `multiplier` times baseline.
    ///
    /// A zero baseline never counts as anomalous.
    pub fn is_anomalous(&self, multiplier: f64) -> bool {
        self.baseline_average > 0.0 && self.current_count as f64 > self.baseline_average * multiplier
    }
}
