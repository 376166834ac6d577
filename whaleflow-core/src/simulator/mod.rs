//! Portfolio simulator: cash, open longs, exits, sizing.
//!
//! Position lifecycle:
//! `NEW → OPEN → {CLOSED_STOP, CLOSED_TARGET, CLOSED_TRAILING, CLOSED_SIGNAL, CLOSED_MARK_TO_MARKET}`
//!
//! Accounting identity at every snapshot:
//! `equity == cash + Σ quantity × last_close`.
//!
//! Every map is a `BTreeMap` so iteration order (and therefore the ledger) is
//! identical across runs.

pub mod ratchet;
pub mod sizing;

pub use ratchet::{trailing_candidate, TrailingRatchet};
pub use sizing::{entry_fill, exit_fill, position_size, KellyTracker};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, StrategyConfig};
use crate::domain::{ClosedTrade, ExitReason, Position, PriceBar, Signal};
use crate::regime::RegimeAdjustment;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("no open position for '{0}'")]
    NotOpen(String),
    #[error("invalid bracket: {0}")]
    Bracket(#[from] ConfigError),
}

/// Why an entry was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    PositionLimit,
    AlreadyOpen,
    Cooldown,
    ZeroSize,
    InsufficientCash,
}

/// A BUY that survived filtering but could not be filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissedEntry {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub reason: MissReason,
}

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Opened(Position),
    Missed(MissedEntry),
}

#[derive(Debug, Clone)]
struct Holding {
    position: Position,
    ratchet: TrailingRatchet,
}

/// Everything a finished simulation produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationLedger {
    pub initial_capital: f64,
    pub final_cash: f64,
    pub closed_trades: Vec<ClosedTrade>,
    pub missed_entries: Vec<MissedEntry>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
}

/// Long-only portfolio simulator for one run or one fold.
#[derive(Debug)]
pub struct PortfolioSimulator<'a> {
    cfg: &'a StrategyConfig,
    initial_capital: f64,
    cash: f64,
    open: BTreeMap<String, Holding>,
    last_prices: BTreeMap<String, f64>,
    cooldowns: BTreeMap<String, usize>,
    kelly: KellyTracker,
    closed: Vec<ClosedTrade>,
    missed: Vec<MissedEntry>,
    equity_curve: Vec<(DateTime<Utc>, f64)>,
}

impl<'a> PortfolioSimulator<'a> {
    pub fn new(cfg: &'a StrategyConfig, initial_capital: f64) -> Self {
        Self {
            cfg,
            initial_capital,
            cash: initial_capital,
            open: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            cooldowns: BTreeMap::new(),
            kelly: KellyTracker::new(),
            closed: Vec::new(),
            missed: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Cash plus open positions valued at their last known close.
    pub fn equity(&self) -> f64 {
        let held: f64 = self
            .open
            .iter()
            .map(|(sym, h)| {
                let price = self
                    .last_prices
                    .get(sym)
                    .copied()
                    .unwrap_or(h.position.entry_price);
                h.position.market_value(price)
            })
            .sum();
        self.cash + held
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn is_open(&self, symbol: &str) -> bool {
        self.open.contains_key(symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.open.get(symbol).map(|h| &h.position)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values().map(|h| &h.position)
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed
    }

    pub fn missed_entries(&self) -> &[MissedEntry] {
        &self.missed
    }

    pub fn equity_curve(&self) -> &[(DateTime<Utc>, f64)] {
        &self.equity_curve
    }

    pub fn cooldown_remaining(&self, symbol: &str) -> usize {
        self.cooldowns.get(symbol).copied().unwrap_or(0)
    }

    // ─── Per-bar management ──────────────────────────────────────────

    /// Process a new bar for `bar.symbol`: mark the price, tick the cooldown,
    /// then run the stop → target → trailing checks on the close.
    pub fn on_bar(&mut self, bar: &PriceBar) -> Option<ClosedTrade> {
        if !bar.close.is_finite() {
            return None;
        }
        self.last_prices.insert(bar.symbol.clone(), bar.close);
        if let Some(remaining) = self.cooldowns.get_mut(&bar.symbol) {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.cooldowns.remove(&bar.symbol);
            }
        }

        let cfg = self.cfg;
        let holding = self.open.get_mut(&bar.symbol)?;
        let pos = &mut holding.position;
        pos.bars_held += 1;
        if bar.close > pos.peak_price {
            pos.peak_price = bar.close;
        }
        if cfg.trailing_stop_enabled {
            if let Some(candidate) = trailing_candidate(
                pos.entry_price,
                pos.peak_price,
                cfg.trailing_stop_activation,
                cfg.trailing_stop_distance,
            ) {
                pos.trailing_stop_price = holding.ratchet.apply(candidate);
            }
        }

        let close = bar.close;
        let trigger = if close <= pos.stop_price {
            Some((ExitReason::Stop, pos.stop_price))
        } else if close >= pos.target_price {
            Some((ExitReason::Target, pos.target_price))
        } else {
            match pos.trailing_stop_price {
                Some(level) if close <= level => Some((ExitReason::Trailing, level)),
                _ => None,
            }
        };

        let (reason, level) = trigger?;
        let fill = exit_fill(level, cfg.slippage_bps);
        let trade = self.close_position(&bar.symbol, fill, bar.timestamp, reason, true)?;
        if reason == ExitReason::Stop && cfg.stop_loss_cooldown_bars > 0 {
            self.cooldowns
                .insert(bar.symbol.clone(), cfg.stop_loss_cooldown_bars);
        }
        Some(trade)
    }

    /// Force-close on a SELL at `price` less slippage.
    pub fn exit_on_signal(
        &mut self,
        symbol: &str,
        price: f64,
        time: DateTime<Utc>,
    ) -> Result<ClosedTrade, PositionError> {
        let fill = exit_fill(price, self.cfg.slippage_bps);
        self.close_position(symbol, fill, time, ExitReason::Signal, true)
            .ok_or_else(|| PositionError::NotOpen(symbol.to_string()))
    }

    fn close_position(
        &mut self,
        symbol: &str,
        fill: f64,
        time: DateTime<Utc>,
        reason: ExitReason,
        charge_fee: bool,
    ) -> Option<ClosedTrade> {
        let mut holding = self.open.remove(symbol)?;
        let fee = if charge_fee {
            fill * holding.position.quantity * self.cfg.fee_rate
        } else {
            0.0
        };
        let trade = holding.position.close(fill, time, reason, fee);
        self.cash += fill * trade.quantity - fee;
        self.kelly.record(trade.net_pnl);
        debug!(
            symbol,
            reason = reason.as_str(),
            exit = fill,
            pnl = trade.net_pnl,
            "position closed"
        );
        self.closed.push(trade.clone());
        Some(trade)
    }

    // ─── Entries ─────────────────────────────────────────────────────

    /// Attempt a long entry for a surviving BUY at `price`.
    ///
    /// Skipped entries are recorded and returned as [`EntryOutcome::Missed`];
    /// only an impossible bracket is an error, and it leaves no trace.
    pub fn try_enter(
        &mut self,
        signal: &Signal,
        price: f64,
        adj: RegimeAdjustment,
    ) -> Result<EntryOutcome, PositionError> {
        let cfg = self.cfg;
        let symbol = signal.symbol.as_str();

        let precheck = if self.open.contains_key(symbol) {
            Some(MissReason::AlreadyOpen)
        } else if self.open.len() >= cfg.max_concurrent_positions {
            Some(MissReason::PositionLimit)
        } else if self.cooldown_remaining(symbol) > 0 {
            Some(MissReason::Cooldown)
        } else {
            None
        };
        if let Some(reason) = precheck {
            return Ok(self.miss(signal, price, reason));
        }

        let equity = self.equity();
        let fill = entry_fill(price, cfg.slippage_bps);
        let risk_fraction =
            cfg.trade_risk_percentage * adj.risk_multiplier * self.kelly.scale(&cfg.kelly);
        let quantity = position_size(equity, fill, risk_fraction, cfg.stop_loss_percentage);
        if quantity <= 0.0 {
            return Ok(self.miss(signal, price, MissReason::ZeroSize));
        }

        let notional = quantity * fill;
        let fee = notional * cfg.fee_rate;
        if notional + fee > self.cash {
            return Ok(self.miss(signal, price, MissReason::InsufficientCash));
        }

        let position = Position::open(
            symbol,
            fill,
            signal.timestamp,
            quantity,
            fill * (1.0 - cfg.stop_loss_percentage),
            fill * (1.0 + cfg.take_profit_percentage),
            fee,
        )?;

        self.cash -= notional + fee;
        self.last_prices.insert(symbol.to_string(), price);
        debug!(
            symbol,
            fill,
            quantity,
            risk_fraction,
            stop = position.stop_price,
            target = position.target_price,
            "position opened"
        );
        self.open.insert(
            symbol.to_string(),
            Holding {
                position: position.clone(),
                ratchet: TrailingRatchet::new(),
            },
        );
        Ok(EntryOutcome::Opened(position))
    }

    fn miss(&mut self, signal: &Signal, price: f64, reason: MissReason) -> EntryOutcome {
        debug!(symbol = %signal.symbol, ?reason, "entry skipped");
        let missed = MissedEntry {
            symbol: signal.symbol.clone(),
            timestamp: signal.timestamp,
            price,
            reason,
        };
        self.missed.push(missed.clone());
        EntryOutcome::Missed(missed)
    }

    // ─── Snapshots & termination ─────────────────────────────────────

    /// Append an equity snapshot. Snapshots must move forward in time; a
    /// stale timestamp is dropped.
    pub fn record_equity(&mut self, time: DateTime<Utc>) {
        if let Some((last, _)) = self.equity_curve.last() {
            if time <= *last {
                warn!(%time, last = %last, "equity snapshot out of order, dropped");
                return;
            }
        }
        let equity = self.equity();
        self.equity_curve.push((time, equity));
    }

    /// Close every open position at its last close, without slippage or fee.
    pub fn mark_to_market(&mut self, time: DateTime<Utc>) -> Vec<ClosedTrade> {
        let symbols: Vec<String> = self.open.keys().cloned().collect();
        let mut trades = Vec::with_capacity(symbols.len());
        for sym in symbols {
            let price = match (self.last_prices.get(&sym), self.open.get(&sym)) {
                (Some(p), _) => *p,
                (None, Some(h)) => h.position.entry_price,
                (None, None) => continue,
            };
            let exit_time = time.max(self.open.get(&sym).map_or(time, |h| h.position.entry_time));
            if let Some(t) = self.close_position(&sym, price, exit_time, ExitReason::MarkToMarket, false) {
                trades.push(t);
            }
        }
        trades
    }

    pub fn into_ledger(self) -> SimulationLedger {
        SimulationLedger {
            initial_capital: self.initial_capital,
            final_cash: self.cash,
            closed_trades: self.closed,
            missed_entries: self.missed,
            equity_curve: self.equity_curve,
        }
    }
}
