//! Backtest runner: wires together market data, the core engine, and metrics.
//!
//! `run_single()` is the one entry point: pre-loaded data in, report out. No
//! I/O happens here; loading lives in [`crate::data`].

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use whaleflow_core::domain::{ClosedTrade, Signal};
use whaleflow_core::simulator::MissedEntry;
use whaleflow_core::{run_backtest, EngineError, MarketData, RunOptions, StrategyConfig};

use crate::metrics::{MetricsOptions, PerformanceReport};

/// Errors from the runner.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl RunError {
    /// Insufficient data is skippable in folds and sweeps; everything else
    /// is reported as a failure.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, RunError::Engine(EngineError::InsufficientData { .. }))
    }
}

/// Why a guarded run produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "cause", rename_all = "snake_case")]
pub enum RunFailure {
    #[error("{0}")]
    Error(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("panicked: {0}")]
    Panicked(String),
}

impl From<RunError> for RunFailure {
    fn from(e: RunError) -> Self {
        if e.is_insufficient_data() {
            RunFailure::InsufficientData(e.to_string())
        } else {
            RunFailure::Error(e.to_string())
        }
    }
}

fn panic_cause(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Current schema version for persisted results.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub config_hash: String,
    pub config: StrategyConfig,
    pub metrics: PerformanceReport,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub signals: Vec<Signal>,
    pub trades: Vec<ClosedTrade>,
    pub missed_entries: Vec<MissedEntry>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub symbol_count: usize,
    pub bar_count: usize,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    pub fn total_pnl(&self) -> f64 {
        self.final_equity - self.initial_capital
    }
}

/// Run one backtest over pre-loaded data and compute its report.
pub fn run_single(
    data: &MarketData,
    config: &StrategyConfig,
    opts: &RunOptions,
    metrics: &MetricsOptions,
) -> Result<BacktestResult, RunError> {
    let output = run_backtest(data, config, opts)?;
    let equity: Vec<f64> = output.equity_curve.iter().map(|(_, e)| *e).collect();
    let report = PerformanceReport::compute(
        output.initial_capital,
        &equity,
        &output.closed_trades,
        metrics,
    );

    info!(
        config_hash = %output.config_hash,
        trades = report.trade_count,
        pnl = report.total_pnl,
        sharpe = %report.sharpe,
        max_dd = report.max_drawdown,
        "run complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        config_hash: output.config_hash,
        config: config.clone(),
        metrics: report,
        initial_capital: output.initial_capital,
        final_equity: output.final_equity,
        start: output.equity_curve.first().map(|(t, _)| *t),
        end: output.equity_curve.last().map(|(t, _)| *t),
        signals: output.signals,
        trades: output.closed_trades,
        missed_entries: output.missed_entries,
        equity_curve: output.equity_curve,
        symbol_count: data.bars.len(),
        bar_count: data.bar_count(),
    })
}

/// [`run_single`] with errors and panics folded into a [`RunFailure`].
///
/// Folds and sweep workers go through here so one bad run never takes down
/// its siblings.
pub fn run_guarded(
    data: &MarketData,
    config: &StrategyConfig,
    opts: &RunOptions,
    metrics: &MetricsOptions,
) -> Result<BacktestResult, RunFailure> {
    match catch_unwind(AssertUnwindSafe(|| run_single(data, config, opts, metrics))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.into()),
        Err(payload) => Err(RunFailure::Panicked(panic_cause(payload))),
    }
}
