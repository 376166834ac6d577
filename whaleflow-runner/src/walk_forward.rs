//! Walk-forward validation: contiguous folds over the union timeline, each
//! run with a fresh simulator.
//!
//! The timeline is cut into `k` equal, non-overlapping folds; the remainder
//! goes to the last fold. A fold never sees a bar or whale event stamped in
//! a later fold. How a fold warms its indicators up is an explicit
//! [`WarmupMode`]:
//!
//! - `reset`: only the fold's own bars; the leading `warm_up_bars` of each
//!   symbol warm the indicators.
//! - `lookback { bars }`: up to `bars` timeline points strictly before the
//!   fold feed indicator history. They produce no signals, trades or equity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use whaleflow_core::domain::{ClosedTrade, DataOrderingViolation};
use whaleflow_core::{ConfigError, MarketData, RunOptions, StrategyConfig};

use crate::metrics::{fold_consistency, mean_f64, MetricValue, MetricsOptions, PerformanceReport};
use crate::runner::{run_guarded, RunFailure};

// ─── Configuration ───────────────────────────────────────────────────

/// How each fold warms up its indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WarmupMode {
    #[default]
    Reset,
    Lookback { bars: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Overrides `StrategyConfig::walk_forward_splits` when set.
    pub splits: Option<usize>,
    pub warmup: WarmupMode,
}

impl WalkForwardConfig {
    pub fn splits_for(&self, strategy: &StrategyConfig) -> usize {
        self.splits.unwrap_or(strategy.walk_forward_splits)
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Timeline index ranges of one fold. Indices are into
/// [`MarketData::timeline`]; `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    pub fold_index: usize,
    /// First timeline point fed to the fold (== `start` in reset mode).
    pub warmup_start: usize,
    pub start: usize,
    pub end: usize,
}

impl FoldSpec {
    pub fn warmup_len(&self) -> usize {
        self.start - self.warmup_start
    }
}

/// A fold that ran to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold_index: usize,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
    /// Inclusive range of history-only timestamps, if any.
    pub warmup_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub config_hash: String,
    pub pnl: f64,
    pub total_return: f64,
    pub sharpe: MetricValue,
    pub metrics: PerformanceReport,
    pub trades: Vec<ClosedTrade>,
}

/// A fold that produced no report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFold {
    pub fold_index: usize,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
    pub cause: RunFailure,
}

/// Aggregate over completed folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub completed: usize,
    pub skipped: usize,
    /// Mean of per-fold total return; `None` when no fold completed.
    pub mean_return: Option<f64>,
    /// Mean over folds with a finite Sharpe.
    pub mean_sharpe: MetricValue,
    pub mean_max_drawdown: Option<f64>,
    pub total_trades: usize,
    /// Profitable folds / completed folds.
    pub fold_consistency: MetricValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub splits: usize,
    pub warmup: WarmupMode,
    pub folds: Vec<FoldReport>,
    pub skipped: Vec<SkippedFold>,
    pub summary: WalkForwardSummary,
}

/// Errors that stop validation before any fold runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalkForwardError {
    #[error("invalid strategy: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ordering(#[from] DataOrderingViolation),
    #[error("walk-forward needs at least one split")]
    ZeroSplits,
    #[error("cannot cut {splits} folds from {timestamps} timestamps")]
    TooFewTimestamps { splits: usize, timestamps: usize },
}

// ─── Fold creation ───────────────────────────────────────────────────

/// Cut `timeline_len` points into `splits` contiguous folds.
///
/// Fold size is `timeline_len / splits`; the last fold also takes the
/// remainder. Lookback warm-up reaches back at most `bars` points and never
/// before index 0.
pub fn create_folds(
    timeline_len: usize,
    splits: usize,
    warmup: WarmupMode,
) -> Result<Vec<FoldSpec>, WalkForwardError> {
    if splits == 0 {
        return Err(WalkForwardError::ZeroSplits);
    }
    if timeline_len < splits {
        return Err(WalkForwardError::TooFewTimestamps {
            splits,
            timestamps: timeline_len,
        });
    }
    let size = timeline_len / splits;
    let folds = (0..splits)
        .map(|i| {
            let start = i * size;
            let end = if i + 1 == splits { timeline_len } else { start + size };
            let warmup_start = match warmup {
                WarmupMode::Reset => start,
                WarmupMode::Lookback { bars } => start.saturating_sub(bars),
            };
            FoldSpec {
                fold_index: i,
                warmup_start,
                start,
                end,
            }
        })
        .collect();
    Ok(folds)
}

/// Market data visible to one fold.
///
/// Bars from `timeline[warmup_start]` through `timeline[end - 1]`. Whale
/// events strictly after the previous timeline point, so an event landing
/// between two folds belongs to the later one.
pub fn fold_market(data: &MarketData, timeline: &[DateTime<Utc>], spec: &FoldSpec) -> MarketData {
    let first = timeline[spec.warmup_start];
    let last = timeline[spec.end - 1];
    let mut market = data.slice(first, last);

    let lo = match spec.warmup_start.checked_sub(1) {
        Some(prev) => data.whale_events.partition_point(|e| e.timestamp <= timeline[prev]),
        None => 0,
    };
    let hi = data.whale_events.partition_point(|e| e.timestamp <= last);
    market.whale_events = data.whale_events[lo..hi.max(lo)].to_vec();
    market
}

// ─── Validation ──────────────────────────────────────────────────────

/// Run every fold and aggregate the completed ones.
///
/// Configuration and ordering problems are fatal. A fold that errors or
/// panics is recorded in `skipped` and the remaining folds still run.
pub fn run_walk_forward(
    data: &MarketData,
    strategy: &StrategyConfig,
    wf: &WalkForwardConfig,
    initial_capital: f64,
    metrics: &MetricsOptions,
) -> Result<WalkForwardResult, WalkForwardError> {
    strategy.validate()?;
    data.check_ordering()?;

    let timeline = data.timeline();
    let splits = wf.splits_for(strategy);
    let specs = create_folds(timeline.len(), splits, wf.warmup)?;

    let mut folds = Vec::new();
    let mut skipped = Vec::new();

    for spec in &specs {
        let test_start = timeline[spec.start];
        let test_end = timeline[spec.end - 1];
        let market = fold_market(data, &timeline, spec);
        let opts = RunOptions {
            initial_capital,
            trade_from: (spec.warmup_len() > 0).then_some(test_start),
        };

        match run_guarded(&market, strategy, &opts, metrics) {
            Ok(result) => {
                info!(
                    fold = spec.fold_index,
                    start = %test_start,
                    end = %test_end,
                    pnl = result.total_pnl(),
                    trades = result.trades.len(),
                    "fold complete"
                );
                folds.push(FoldReport {
                    fold_index: spec.fold_index,
                    test_start,
                    test_end,
                    warmup_range: (spec.warmup_len() > 0)
                        .then(|| (timeline[spec.warmup_start], timeline[spec.start - 1])),
                    config_hash: result.config_hash.clone(),
                    pnl: result.total_pnl(),
                    total_return: result.metrics.total_return,
                    sharpe: result.metrics.sharpe,
                    metrics: result.metrics,
                    trades: result.trades,
                });
            }
            Err(cause) => {
                warn!(fold = spec.fold_index, %cause, "fold skipped");
                skipped.push(SkippedFold {
                    fold_index: spec.fold_index,
                    test_start,
                    test_end,
                    cause,
                });
            }
        }
    }

    let summary = summarize(&folds, skipped.len());
    info!(
        completed = summary.completed,
        skipped = summary.skipped,
        consistency = %summary.fold_consistency,
        "walk-forward complete"
    );

    Ok(WalkForwardResult {
        splits,
        warmup: wf.warmup,
        folds,
        skipped,
        summary,
    })
}

fn summarize(folds: &[FoldReport], skipped: usize) -> WalkForwardSummary {
    let pnls: Vec<f64> = folds.iter().map(|f| f.pnl).collect();
    let returns: Vec<f64> = folds.iter().map(|f| f.total_return).collect();
    let drawdowns: Vec<f64> = folds.iter().map(|f| f.metrics.max_drawdown).collect();
    let sharpes: Vec<f64> = folds.iter().filter_map(|f| f.sharpe.finite()).collect();

    WalkForwardSummary {
        completed: folds.len(),
        skipped,
        mean_return: (!returns.is_empty()).then(|| mean_f64(&returns)),
        mean_sharpe: if sharpes.is_empty() {
            MetricValue::Undefined
        } else {
            MetricValue::Finite(mean_f64(&sharpes))
        },
        mean_max_drawdown: (!drawdowns.is_empty()).then(|| mean_f64(&drawdowns)),
        total_trades: folds.iter().map(|f| f.trades.len()).sum(),
        fold_consistency: fold_consistency(&pnls),
    }
}
