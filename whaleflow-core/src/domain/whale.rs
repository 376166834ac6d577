//! WhaleEvent: a large on-chain transfer observed by a collector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bar::DataOrderingViolation;

/// Kind of the non-exchange side of a transfer (or `Exchange` for
/// exchange-to-exchange moves).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyKind {
    Exchange,
    PrivateWallet,
    KnownEntity,
}

/// Exchange-relative direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    /// Funds arrive at an exchange wallet (exchange inflow).
    ToExchange,
    /// Funds leave an exchange wallet (exchange outflow).
    FromExchange,
    /// Neither leg is an exchange.
    Transfer,
}

/// A single whale transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleEvent {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub usd_value: f64,
    pub counterparty_kind: CounterpartyKind,
    #[serde(default)]
    pub entity_label: Option<String>,
    pub direction: FlowDirection,
}

impl WhaleEvent {
    /// Case-insensitive symbol match. Collectors disagree on casing
    /// (`btc` vs `BTC`), so every lookup goes through here.
    pub fn is_for(&self, symbol: &str) -> bool {
        self.symbol.eq_ignore_ascii_case(symbol)
    }

    /// True when the entity label matches any of `entities` (case-insensitive).
    pub fn is_labeled_as_any(&self, entities: &[String]) -> bool {
        match &self.entity_label {
            Some(label) => entities.iter().any(|e| e.eq_ignore_ascii_case(label)),
            None => false,
        }
    }
}

/// Verify the event stream is non-decreasing in time.
///
/// Several transfers can land in the same block, so equal timestamps are
/// allowed here; a step backwards is not.
pub fn check_event_order(events: &[WhaleEvent]) -> Result<(), DataOrderingViolation> {
    for (i, pair) in events.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(DataOrderingViolation {
                stream: "whale",
                symbol: pair[1].symbol.clone(),
                index: i + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }
    Ok(())
}
