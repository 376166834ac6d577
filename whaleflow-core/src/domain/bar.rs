//! PriceBar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV bar for a single symbol at a single timestamp.
///
/// Bars are immutable once produced. Within one symbol's series, timestamps
/// must be strictly increasing; see [`check_bar_order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity: high bounds the body, low bounds the body, prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
    }
}

/// A non-monotonic timestamp in an input stream.
///
/// Input is never silently sorted or de-duplicated: the first violation is
/// surfaced and the run does not start.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "data ordering violation in {stream} stream for '{symbol}' at index {index}: \
     {current} does not follow {previous}"
)]
pub struct DataOrderingViolation {
    pub stream: &'static str,
    pub symbol: String,
    pub index: usize,
    pub previous: DateTime<Utc>,
    pub current: DateTime<Utc>,
}

/// Verify a single symbol's bars are strictly increasing in time.
pub fn check_bar_order(bars: &[PriceBar]) -> Result<(), DataOrderingViolation> {
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(DataOrderingViolation {
                stream: "price",
                symbol: pair[1].symbol.clone(),
                index: i + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }
    Ok(())
}
