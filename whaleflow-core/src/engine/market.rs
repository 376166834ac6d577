//! Market data container: per-symbol bar series plus the whale stream.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{check_bar_order, check_event_order, DataOrderingViolation, PriceBar, WhaleEvent};

/// Input to a run. Bars are grouped by symbol in arrival order; nothing is
/// sorted on the way in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub bars: BTreeMap<String, Vec<PriceBar>>,
    pub whale_events: Vec<WhaleEvent>,
}

impl MarketData {
    /// Group a flat bar list by symbol, keeping each symbol's input order.
    pub fn from_parts(bars: Vec<PriceBar>, whale_events: Vec<WhaleEvent>) -> Self {
        let mut grouped: BTreeMap<String, Vec<PriceBar>> = BTreeMap::new();
        for bar in bars {
            grouped.entry(bar.symbol.clone()).or_default().push(bar);
        }
        Self {
            bars: grouped,
            whale_events,
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }

    pub fn bar_count(&self) -> usize {
        self.bars.values().map(Vec::len).sum()
    }

    /// First violation of per-symbol strict ordering or whale non-decreasing order.
    pub fn check_ordering(&self) -> Result<(), DataOrderingViolation> {
        for series in self.bars.values() {
            check_bar_order(series)?;
        }
        check_event_order(&self.whale_events)
    }

    /// Sorted union of every bar timestamp.
    pub fn timeline(&self) -> Vec<DateTime<Utc>> {
        let mut ts: Vec<DateTime<Utc>> = self
            .bars
            .values()
            .flat_map(|s| s.iter().map(|b| b.timestamp))
            .collect();
        ts.sort_unstable();
        ts.dedup();
        ts
    }

    /// Bars with `start <= timestamp <= end` and whale events in the same range.
    ///
    /// Symbols with no bars in range are dropped.
    pub fn slice(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> MarketData {
        let bars = self
            .bars
            .iter()
            .filter_map(|(sym, series)| {
                let lo = series.partition_point(|b| b.timestamp < start);
                let hi = series.partition_point(|b| b.timestamp <= end);
                (lo < hi).then(|| (sym.clone(), series[lo..hi].to_vec()))
            })
            .collect();
        let lo = self.whale_events.partition_point(|e| e.timestamp < start);
        let hi = self.whale_events.partition_point(|e| e.timestamp <= end);
        let whale_events = if lo < hi {
            self.whale_events[lo..hi].to_vec()
        } else {
            Vec::new()
        };
        MarketData { bars, whale_events }
    }
}
