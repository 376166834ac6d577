//! Backtest engine: drives indicators, signals, regime, confirmation and the
//! simulator over the union timeline, one cycle per timestamp.
//!
//! Per cycle at time *t*:
//! 1. Exits: stop → target → trailing for every symbol with a bar at *t*.
//! 2. Cycle context from whale events at or before *t*.
//! 3. For each symbol (sorted) past warm-up with a sane bar: view → signal →
//!    regime → confirmation → volume gate → simulator.
//! 4. One equity snapshot.
//!
//! Nothing stamped after *t* is visible at *t*.

pub mod market;

pub use market::MarketData;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, StrategyConfig};
use crate::confirmation::ConfirmationFilter;
use crate::domain::{ClosedTrade, DataOrderingViolation, Signal};
use crate::regime::detect_regime;
use crate::signal::{CycleContext, SignalEngine, SymbolView};
use crate::simulator::{MissedEntry, PortfolioSimulator, PositionError};
use crate::volume::VolumeGate;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ordering(#[from] DataOrderingViolation),
    #[error("insufficient data for '{symbol}': {available} bars, need {required}")]
    InsufficientData {
        symbol: String,
        available: usize,
        required: usize,
    },
    #[error("no price bars supplied")]
    NoData,
    #[error("position error: {0}")]
    Position(#[from] PositionError),
}

/// Per-run knobs that are not strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub initial_capital: f64,
    /// Bars before this instant only feed indicator history: no signals,
    /// trades or equity snapshots.
    #[serde(default)]
    pub trade_from: Option<DateTime<Utc>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            trade_from: None,
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestOutput {
    pub config_hash: String,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub signals: Vec<Signal>,
    pub closed_trades: Vec<ClosedTrade>,
    pub missed_entries: Vec<MissedEntry>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
}

impl BacktestOutput {
    pub fn total_pnl(&self) -> f64 {
        self.final_equity - self.initial_capital
    }
}

/// Validate inputs, then run the cycle loop to the end of data.
pub fn run_backtest(
    data: &MarketData,
    cfg: &StrategyConfig,
    opts: &RunOptions,
) -> Result<BacktestOutput, EngineError> {
    data.check_ordering()?;
    cfg.validate()?;
    if data.bars.is_empty() {
        return Err(EngineError::NoData);
    }
    let required = cfg.required_bars();
    for (symbol, series) in &data.bars {
        if series.len() < required {
            return Err(EngineError::InsufficientData {
                symbol: symbol.clone(),
                available: series.len(),
                required,
            });
        }
    }

    let timeline = data.timeline();
    info!(
        symbols = data.bars.len(),
        bars = data.bar_count(),
        events = data.whale_events.len(),
        cycles = timeline.len(),
        "backtest started"
    );

    let engine = SignalEngine::default();
    let filter = ConfirmationFilter::from_config(cfg);
    let gate = VolumeGate::from_config(cfg);
    let mut sim = PortfolioSimulator::new(cfg, opts.initial_capital);
    let mut signals = Vec::new();

    // Next unread bar per symbol, and the visible whale prefix.
    let mut cursor: BTreeMap<&str, usize> = data.bars.keys().map(|s| (s.as_str(), 0)).collect();
    let mut visible_events = 0usize;

    for &t in &timeline {
        while visible_events < data.whale_events.len()
            && data.whale_events[visible_events].timestamp <= t
        {
            visible_events += 1;
        }
        let events = &data.whale_events[..visible_events];

        // Bars stamped exactly at t, as (symbol, index) in symbol order.
        let mut at_t: Vec<(&str, usize)> = Vec::new();
        for (sym, idx) in cursor.iter_mut() {
            let series = &data.bars[*sym];
            if *idx < series.len() && series[*idx].timestamp == t {
                at_t.push((*sym, *idx));
                *idx += 1;
            }
        }

        // ─── Phase 1: exits ───
        for &(sym, idx) in &at_t {
            sim.on_bar(&data.bars[sym][idx]);
        }

        if opts.trade_from.is_some_and(|from| t < from) {
            continue;
        }

        // ─── Phase 2: cycle context ───
        let cycle = CycleContext::build(t, events, cfg);

        // ─── Phase 3: decisions ───
        for &(sym, idx) in &at_t {
            if idx < cfg.warm_up_bars {
                continue;
            }
            let series = &data.bars[sym];
            // A bar that cannot be priced must not reach a fill.
            if !series[idx].is_sane() {
                warn!(symbol = sym, time = %t, "malformed bar, no decision this cycle");
                continue;
            }
            let start = (idx + 1).saturating_sub(cfg.history_window_bars);
            let window = &series[start..=idx];
            let Some(view) = SymbolView::build(sym, window, events, cfg) else {
                continue;
            };

            let raw = engine.evaluate(&view, &cycle, cfg);
            let regime = detect_regime(window, &cfg.regime);
            let adj = regime.regime.adjustment();
            let confirmed = filter.confirm(&raw, window, adj);
            let signal = gate.apply(&confirmed, window);

            if signal.requests_exit() && sim.is_open(sym) {
                sim.exit_on_signal(sym, view.price, t)?;
            } else if signal.permits_entry() {
                sim.try_enter(&signal, view.price, adj)?;
            }
            if confirmed.kind != raw.kind {
                debug!(symbol = sym, regime = ?regime.regime, "buy not confirmed across timeframes");
            } else if signal.kind != confirmed.kind {
                debug!(symbol = sym, kind = ?raw.kind, "signal gated on thin volume");
            }
            signals.push(signal);
        }

        // ─── Phase 4: snapshot ───
        sim.record_equity(t);
    }

    if let Some(&last) = timeline.last() {
        sim.mark_to_market(last);
    }
    let final_equity = sim.equity();
    let ledger = sim.into_ledger();

    info!(
        trades = ledger.closed_trades.len(),
        missed = ledger.missed_entries.len(),
        final_equity,
        "backtest finished"
    );

    Ok(BacktestOutput {
        config_hash: cfg.config_hash(),
        initial_capital: opts.initial_capital,
        final_equity,
        signals,
        closed_trades: ledger.closed_trades,
        missed_entries: ledger.missed_entries,
        equity_curve: ledger.equity_curve,
    })
}
