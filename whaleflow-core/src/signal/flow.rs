//! On-chain aggregates for one evaluation cycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StrategyConfig;
use crate::domain::{FlowDirection, WhaleEvent};

/// Length of the cycle window every on-chain aggregate is taken over.
pub const CYCLE_WINDOW_HOURS: i64 = 1;

/// Events in the cycle window `(now - 1h, now]` of a time-ordered slice.
///
/// Returns a sub-slice; events after `now` are excluded.
pub fn cycle_window(events: &[WhaleEvent], now: DateTime<Utc>) -> &[WhaleEvent] {
    let start = now - Duration::hours(CYCLE_WINDOW_HOURS);
    let end = events.partition_point(|e| e.timestamp <= now);
    let begin = events[..end].partition_point(|e| e.timestamp <= start);
    &events[begin..end]
}

/// Exchange inflow and outflow in USD over a set of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetFlow {
    pub inflow_usd: f64,
    pub outflow_usd: f64,
}

impl NetFlow {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a WhaleEvent>) -> Self {
        let mut flow = NetFlow::default();
        for ev in events {
            match ev.direction {
                FlowDirection::ToExchange => flow.inflow_usd += ev.usd_value,
                FlowDirection::FromExchange => flow.outflow_usd += ev.usd_value,
                FlowDirection::Transfer => {}
            }
        }
        flow
    }

    /// Positive when more value left exchanges than arrived.
    pub fn net_outflow(&self) -> f64 {
        self.outflow_usd - self.inflow_usd
    }
}

/// Aggregates shared by every symbol evaluated at the same instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleContext {
    pub timestamp: DateTime<Utc>,
    /// Stablecoin USD moved into exchanges during the cycle window.
    pub stablecoin_inflow_usd: f64,
    /// Events of any symbol inside the cycle window.
    pub event_count: usize,
}

impl CycleContext {
    /// Build the context from the event stream visible at `now`.
    pub fn build(now: DateTime<Utc>, events: &[WhaleEvent], cfg: &StrategyConfig) -> Self {
        let window = cycle_window(events, now);
        let stablecoin_inflow_usd = window
            .iter()
            .filter(|e| e.direction == FlowDirection::ToExchange)
            .filter(|e| cfg.stablecoins.iter().any(|s| e.is_for(s)))
            .map(|e| e.usd_value)
            .sum();
        Self {
            timestamp: now,
            stablecoin_inflow_usd,
            event_count: window.len(),
        }
    }
}
