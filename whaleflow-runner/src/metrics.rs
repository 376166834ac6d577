//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity curve and/or trade list in, value
//! out. Degenerate inputs produce a [`MetricValue`] sentinel instead of a
//! silent zero.

use serde::{Deserialize, Serialize};
use whaleflow_core::domain::ClosedTrade;

/// A metric that may be degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Finite(f64),
    /// Not enough information (no trades, fewer than two returns, 0/0).
    Undefined,
    PositiveInfinity,
    NegativeInfinity,
}

impl MetricValue {
    /// Map a raw ratio onto a sentinel when the denominator vanished.
    ///
    /// `numerator` decides the sign; a zero numerator is undefined.
    fn from_ratio(numerator: f64, denominator: f64) -> Self {
        if !numerator.is_finite() || !denominator.is_finite() {
            return MetricValue::Undefined;
        }
        if denominator.abs() < 1e-15 {
            return if numerator > 0.0 {
                MetricValue::PositiveInfinity
            } else if numerator < 0.0 {
                MetricValue::NegativeInfinity
            } else {
                MetricValue::Undefined
            };
        }
        MetricValue::Finite(numerator / denominator)
    }

    pub fn finite(self) -> Option<f64> {
        match self {
            MetricValue::Finite(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_finite(self) -> bool {
        matches!(self, MetricValue::Finite(_))
    }

    /// Total order for ranking: -∞ < finite < +∞, undefined last.
    pub fn rank_key(self) -> (u8, f64) {
        match self {
            MetricValue::NegativeInfinity => (1, 0.0),
            MetricValue::Finite(v) => (2, v),
            MetricValue::PositiveInfinity => (3, 0.0),
            MetricValue::Undefined => (0, 0.0),
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Finite(v) => write!(f, "{v:.4}"),
            MetricValue::Undefined => f.write_str("undefined"),
            MetricValue::PositiveInfinity => f.write_str("+inf"),
            MetricValue::NegativeInfinity => f.write_str("-inf"),
        }
    }
}

/// How to turn an equity curve and ledger into a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsOptions {
    /// Bars per year; 8760 for hourly crypto bars.
    pub periods_per_year: f64,
    /// Leave trades closed mark-to-market out of the trade statistics.
    pub exclude_unrealized: bool,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            periods_per_year: 365.0 * 24.0,
            exclude_unrealized: false,
        }
    }
}

/// Aggregate performance metrics for one run or one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub total_pnl: f64,
    pub sharpe: MetricValue,
    pub sortino: MetricValue,
    /// Positive fraction of the running peak.
    pub max_drawdown: f64,
    pub profit_factor: MetricValue,
    pub calmar: MetricValue,
    pub win_rate: MetricValue,
    pub avg_win: MetricValue,
    pub avg_loss: MetricValue,
    pub trade_count: usize,
    /// Set only on walk-forward aggregates.
    pub fold_consistency: Option<MetricValue>,
}

impl PerformanceReport {
    /// Compute every metric. `equity` is the snapshot series without the
    /// starting capital; it is prepended here so the first bar has a return.
    pub fn compute(
        initial_capital: f64,
        equity: &[f64],
        trades: &[ClosedTrade],
        opts: &MetricsOptions,
    ) -> Self {
        let mut curve = Vec::with_capacity(equity.len() + 1);
        curve.push(initial_capital);
        curve.extend_from_slice(equity);

        let pnls: Vec<f64> = trades
            .iter()
            .filter(|t| !(opts.exclude_unrealized && t.is_unrealized()))
            .map(|t| t.net_pnl)
            .collect();

        let final_equity = curve.last().copied().unwrap_or(initial_capital);
        Self {
            total_return: total_return(&curve),
            total_pnl: final_equity - initial_capital,
            sharpe: sharpe_ratio(&curve, opts.periods_per_year),
            sortino: sortino_ratio(&curve, opts.periods_per_year),
            max_drawdown: max_drawdown(&curve),
            profit_factor: profit_factor(&pnls),
            calmar: calmar_ratio(&curve, opts.periods_per_year),
            win_rate: win_rate(&pnls),
            avg_win: avg_win(&pnls),
            avg_loss: avg_loss(&pnls),
            trade_count: pnls.len(),
            fold_consistency: None,
        }
    }
}

// ─── Equity-curve metrics ────────────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&first), Some(&last)) if equity_curve.len() >= 2 && first > 0.0 => {
            (last - first) / first
        }
        _ => 0.0,
    }
}

/// Annualized Sharpe: mean periodic return / sample stdev × √ppy.
///
/// Zero variance is ±∞ by the sign of the mean, or undefined for a flat curve.
pub fn sharpe_ratio(equity_curve: &[f64], periods_per_year: f64) -> MetricValue {
    let returns = periodic_returns(equity_curve);
    if returns.len() < 2 {
        return MetricValue::Undefined;
    }
    let mean = mean_f64(&returns);
    let std = std_dev(&returns);
    annualize(MetricValue::from_ratio(mean, std), periods_per_year)
}

/// Annualized Sortino: mean periodic return / downside deviation × √ppy.
///
/// Downside deviation is `sqrt(Σ min(r, 0)² / n)`.
pub fn sortino_ratio(equity_curve: &[f64], periods_per_year: f64) -> MetricValue {
    let returns = periodic_returns(equity_curve);
    if returns.len() < 2 {
        return MetricValue::Undefined;
    }
    let mean = mean_f64(&returns);
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    let downside = (downside_sq / returns.len() as f64).sqrt();
    annualize(MetricValue::from_ratio(mean, downside), periods_per_year)
}

/// Largest peak-to-trough decline as a positive fraction of the peak.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }
    max_dd
}

/// Compound annualized return over the curve.
pub fn annualized_return(equity_curve: &[f64], periods_per_year: f64) -> Option<f64> {
    let periods = equity_curve.len().checked_sub(1).filter(|&p| p > 0)?;
    let first = *equity_curve.first()?;
    let last = *equity_curve.last()?;
    if first <= 0.0 || periods_per_year <= 0.0 {
        return None;
    }
    if last <= 0.0 {
        return Some(-1.0);
    }
    let years = periods as f64 / periods_per_year;
    Some((last / first).powf(1.0 / years) - 1.0)
}

/// Calmar: annualized return / max drawdown.
///
/// A curve that never drew down is ±∞ by the sign of its return.
pub fn calmar_ratio(equity_curve: &[f64], periods_per_year: f64) -> MetricValue {
    match annualized_return(equity_curve, periods_per_year) {
        Some(ret) => MetricValue::from_ratio(ret, max_drawdown(equity_curve)),
        None => MetricValue::Undefined,
    }
}

// ─── Trade metrics ───────────────────────────────────────────────────

/// Gross profit / gross loss. No losses with some profit is +∞.
pub fn profit_factor(pnls: &[f64]) -> MetricValue {
    let gross_profit: f64 = pnls.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
    MetricValue::from_ratio(gross_profit, gross_loss)
}

/// Winners / trades.
pub fn win_rate(pnls: &[f64]) -> MetricValue {
    if pnls.is_empty() {
        return MetricValue::Undefined;
    }
    let winners = pnls.iter().filter(|&&p| p > 0.0).count();
    MetricValue::Finite(winners as f64 / pnls.len() as f64)
}

/// Mean winning PnL.
pub fn avg_win(pnls: &[f64]) -> MetricValue {
    let wins: Vec<f64> = pnls.iter().copied().filter(|&p| p > 0.0).collect();
    if wins.is_empty() {
        return MetricValue::Undefined;
    }
    MetricValue::Finite(mean_f64(&wins))
}

/// Absolute mean losing PnL.
pub fn avg_loss(pnls: &[f64]) -> MetricValue {
    let losses: Vec<f64> = pnls.iter().copied().filter(|&p| p < 0.0).collect();
    if losses.is_empty() {
        return MetricValue::Undefined;
    }
    MetricValue::Finite(mean_f64(&losses).abs())
}

/// Profitable folds / completed folds.
pub fn fold_consistency(fold_pnls: &[f64]) -> MetricValue {
    if fold_pnls.is_empty() {
        return MetricValue::Undefined;
    }
    let profitable = fold_pnls.iter().filter(|&&p| p > 0.0).count();
    MetricValue::Finite(profitable as f64 / fold_pnls.len() as f64)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive equity points.
pub fn periodic_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn annualize(value: MetricValue, periods_per_year: f64) -> MetricValue {
    match value {
        MetricValue::Finite(v) => MetricValue::Finite(v * periods_per_year.sqrt()),
        other => other,
    }
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
