//! Regime detector: TRENDING / RANGING / VOLATILE from a bar window.
//!
//! Recomputed every cycle from the window alone; no state survives between
//! calls.

use serde::{Deserialize, Serialize};

use crate::config::RegimeConfig;
use crate::domain::PriceBar;
use crate::indicators::{Adx, Atr, Indicator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Trending,
    Ranging,
    Volatile,
}

/// How a regime modulates sizing and confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeAdjustment {
    /// Multiplies the per-trade risk fraction.
    pub risk_multiplier: f64,
    /// Bullish timeframe windows required for a BUY to survive.
    pub required_confirmations: usize,
}

impl Regime {
    pub fn adjustment(self) -> RegimeAdjustment {
        match self {
            Regime::Trending => RegimeAdjustment {
                risk_multiplier: 1.0,
                required_confirmations: 2,
            },
            Regime::Ranging => RegimeAdjustment {
                risk_multiplier: 0.8,
                required_confirmations: 3,
            },
            Regime::Volatile => RegimeAdjustment {
                risk_multiplier: 0.5,
                required_confirmations: 3,
            },
        }
    }
}

/// Classification plus the readings behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: Regime,
    pub adx: Option<f64>,
    /// Current ATR as a fraction of close.
    pub atr_pct: Option<f64>,
    /// Share of the window's ATR% history strictly below the current value.
    pub atr_pct_rank: Option<f64>,
}

/// Classify the window ending at its last bar.
pub fn detect_regime(window: &[PriceBar], cfg: &RegimeConfig) -> RegimeReading {
    let adx = Adx::new(cfg.adx_period).latest(window).value();
    let (atr_pct, atr_pct_rank) = volatility_rank(window, cfg);

    let regime = match (adx, atr_pct_rank) {
        (Some(a), _) if a >= cfg.adx_trend_threshold => Regime::Trending,
        (_, Some(rank)) if rank >= cfg.volatility_percentile => Regime::Volatile,
        _ => Regime::Ranging,
    };

    RegimeReading {
        regime,
        adx,
        atr_pct,
        atr_pct_rank,
    }
}

/// Current ATR% and its percentile rank within the window.
fn volatility_rank(window: &[PriceBar], cfg: &RegimeConfig) -> (Option<f64>, Option<f64>) {
    let atr = Atr::new(cfg.atr_period).compute(window);
    let series: Vec<f64> = atr
        .iter()
        .zip(window)
        .map(|(a, bar)| {
            if bar.close > 0.0 {
                a / bar.close
            } else {
                f64::NAN
            }
        })
        .collect();

    let current = match series.last() {
        Some(v) if v.is_finite() => *v,
        _ => return (None, None),
    };
    let history: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if history.len() < cfg.min_volatility_samples.max(1) {
        return (Some(current), None);
    }
    let below = history.iter().filter(|v| **v < current).count();
    (Some(current), Some(below as f64 / history.len() as f64))
}
