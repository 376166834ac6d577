//! Signal: one classified decision per symbol per evaluation cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a cycle's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
    VolatilityWarning,
}

impl SignalKind {
    pub fn is_directional(self) -> bool {
        matches!(self, SignalKind::Buy | SignalKind::Sell)
    }
}

/// A trading signal. Produced once per cycle per symbol; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SignalKind,
    /// Net vote score: `buy_score - sell_score`. Zero when an override fired.
    pub score: i32,
    pub buy_score: u32,
    pub sell_score: u32,
    pub trigger_reason: String,
    /// Directional kind replaced by a velocity warning, if any.
    #[serde(default)]
    pub suppressed_kind: Option<SignalKind>,
}

impl Signal {
    /// Whether this signal asks to leave an open position.
    ///
    /// A SELL hidden behind a volatility warning still counts: exits are
    /// never suppressed.
    pub fn requests_exit(&self) -> bool {
        self.kind == SignalKind::Sell || self.suppressed_kind == Some(SignalKind::Sell)
    }

    /// Whether this signal permits a new long entry.
    pub fn permits_entry(&self) -> bool {
        self.kind == SignalKind::Buy
    }

    /// Copy of this signal downgraded to HOLD with an appended reason.
    pub fn downgraded(&self, reason: &str) -> Signal {
        Signal {
            kind: SignalKind::Hold,
            trigger_reason: format!("{}; downgraded: {reason}", self.trigger_reason),
            ..self.clone()
        }
    }
}
