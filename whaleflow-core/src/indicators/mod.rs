//! Indicator library: SMA, RSI, ATR, ADX.
//!
//! Every indicator is a pure function of a bar window. Two views are offered:
//! - `compute()` returns the full aligned series (NaN during warm-up). Used
//!   by lookahead tests and by the regime detector's volatility distribution.
//! - `latest()` returns a [`Reading`] for the last bar of the window, with an
//!   explicit insufficient-history result instead of a number when the window
//!   is too short.
//!
//! Callers must treat `InsufficientHistory` as "no opinion". It is never
//! coerced to zero.

pub mod adx;
pub mod atr;
pub mod rsi;
pub mod sma;

pub use adx::Adx;
pub use atr::{true_range, wilder_smooth, Atr};
pub use rsi::Rsi;
pub use sma::Sma;

use serde::{Deserialize, Serialize};

use crate::domain::PriceBar;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on bar t+1 or later. Every indicator must pass
/// the truncated-vs-full series test in `tests/lookahead_test.rs`.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "atr_14").
    fn name(&self) -> &str;

    /// Index of the first bar that can carry a valid value.
    fn lookback(&self) -> usize;

    /// Bars needed before `latest()` can produce a value.
    fn required_bars(&self) -> usize {
        self.lookback() + 1
    }

    /// Full series aligned with `bars`. The first `lookback()` values are NaN.
    fn compute(&self, bars: &[PriceBar]) -> Vec<f64>;

    /// Reading for the last bar of `window`.
    fn latest(&self, window: &[PriceBar]) -> Reading {
        let required = self.required_bars();
        if window.len() < required {
            return Reading::InsufficientHistory {
                required,
                available: window.len(),
            };
        }
        match self.compute(window).last() {
            Some(v) if v.is_finite() => Reading::Ready(*v),
            _ => Reading::InsufficientHistory {
                required,
                available: window.len(),
            },
        }
    }
}

/// Result of evaluating an indicator on a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    Ready(f64),
    InsufficientHistory { required: usize, available: usize },
}

impl Reading {
    pub fn value(self) -> Option<f64> {
        match self {
            Reading::Ready(v) => Some(v),
            Reading::InsufficientHistory { .. } => None,
        }
    }

    pub fn is_ready(self) -> bool {
        matches!(self, Reading::Ready(_))
    }
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, hourly spacing.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                symbol: "TEST".to_string(),
                timestamp: base + Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Bars from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<PriceBar> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| PriceBar {
            symbol: "TEST".to_string(),
            timestamp: base + Duration::hours(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
