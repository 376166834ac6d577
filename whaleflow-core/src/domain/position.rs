//! Position: a single long holding and its exit bracket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Lifecycle status. `NEW` exists only transiently inside [`Position::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed. Each variant is a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "CLOSED_STOP")]
    Stop,
    #[serde(rename = "CLOSED_TARGET")]
    Target,
    #[serde(rename = "CLOSED_TRAILING")]
    Trailing,
    #[serde(rename = "CLOSED_SIGNAL")]
    Signal,
    #[serde(rename = "CLOSED_MARK_TO_MARKET")]
    MarkToMarket,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Stop => "CLOSED_STOP",
            ExitReason::Target => "CLOSED_TARGET",
            ExitReason::Trailing => "CLOSED_TRAILING",
            ExitReason::Signal => "CLOSED_SIGNAL",
            ExitReason::MarkToMarket => "CLOSED_MARK_TO_MARKET",
        }
    }
}

/// A long position.
///
/// Invariant while open: `stop_price < entry_price < target_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub quantity: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub trailing_stop_price: Option<f64>,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub pnl: Option<f64>,
    /// Highest close observed since entry.
    pub peak_price: f64,
    pub entry_fee: f64,
    pub bars_held: usize,
}

impl Position {
    /// Open a position with an explicit bracket.
    ///
    /// Rejects any bracket that does not satisfy `stop < entry < target`,
    /// before any state is created.
    pub fn open(
        symbol: impl Into<String>,
        entry_price: f64,
        entry_time: DateTime<Utc>,
        quantity: f64,
        stop_price: f64,
        target_price: f64,
        entry_fee: f64,
    ) -> Result<Self, ConfigError> {
        if stop_price >= target_price {
            return Err(ConfigError::StopNotBelowTarget {
                stop: stop_price,
                target: target_price,
            });
        }
        if !(stop_price < entry_price && entry_price < target_price) {
            return Err(ConfigError::Invalid {
                key: "bracket",
                reason: format!(
                    "entry {entry_price} must lie strictly between stop {stop_price} and target {target_price}"
                ),
            });
        }
        if quantity <= 0.0 || !quantity.is_finite() {
            return Err(ConfigError::Invalid {
                key: "quantity",
                reason: format!("quantity must be positive, got {quantity}"),
            });
        }
        Ok(Self {
            symbol: symbol.into(),
            entry_price,
            entry_time,
            quantity,
            stop_price,
            target_price,
            trailing_stop_price: None,
            status: PositionStatus::Open,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
            pnl: None,
            peak_price: entry_price,
            entry_fee,
            bars_held: 0,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn notional(&self) -> f64 {
        self.quantity * self.entry_price
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.entry_price)
    }

    /// Close the position and produce its ledger record.
    pub fn close(
        &mut self,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        reason: ExitReason,
        exit_fee: f64,
    ) -> ClosedTrade {
        let gross = self.quantity * (exit_price - self.entry_price);
        let fees = self.entry_fee + exit_fee;
        let net = gross - fees;

        self.status = PositionStatus::Closed;
        self.exit_price = Some(exit_price);
        self.exit_time = Some(exit_time);
        self.exit_reason = Some(reason);
        self.pnl = Some(net);

        ClosedTrade {
            symbol: self.symbol.clone(),
            entry_time: self.entry_time,
            exit_time,
            entry_price: self.entry_price,
            exit_price,
            quantity: self.quantity,
            stop_price: self.stop_price,
            target_price: self.target_price,
            trailing_stop_price: self.trailing_stop_price,
            gross_pnl: gross,
            fees,
            net_pnl: net,
            exit_reason: reason,
            bars_held: self.bars_held,
        }
    }
}

/// A completed round trip in the closed-trade ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub trailing_stop_price: Option<f64>,
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub exit_reason: ExitReason,
    pub bars_held: usize,
}

impl ClosedTrade {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    /// Closed by end-of-data mark-to-market rather than a real exit.
    pub fn is_unrealized(&self) -> bool {
        self.exit_reason == ExitReason::MarkToMarket
    }

    /// Return on the trade as a fraction of entry cost.
    pub fn return_pct(&self) -> f64 {
        let cost = self.entry_price * self.quantity;
        if cost == 0.0 {
            return 0.0;
        }
        self.net_pnl / cost
    }
}
