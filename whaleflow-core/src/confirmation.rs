//! Multi-timeframe confirmation: a BUY must agree with enough timeframes.
//!
//! Each of the short/medium/long trailing windows is read independently as
//! bullish, bearish or neutral. SELL signals are exits for a long-only book
//! and pass through untouched.

use serde::{Deserialize, Serialize};

use crate::config::StrategyConfig;
use crate::domain::{PriceBar, Signal, SignalKind};
use crate::indicators::{Indicator, Rsi, Sma};
use crate::regime::RegimeAdjustment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowTrend {
    Bullish,
    Bearish,
    Neutral,
}

/// Per-window trend readings, short to long.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeframeReadings {
    pub short: WindowTrend,
    pub medium: WindowTrend,
    pub long: WindowTrend,
}

impl TimeframeReadings {
    pub fn bullish_count(&self) -> usize {
        [self.short, self.medium, self.long]
            .iter()
            .filter(|t| **t == WindowTrend::Bullish)
            .count()
    }
}

/// Pure filter over a bar window.
#[derive(Debug, Clone)]
pub struct ConfirmationFilter {
    windows: [usize; 3],
    sma_period: usize,
    rsi: Rsi,
    bullish_rsi: f64,
    bearish_rsi: f64,
}

impl ConfirmationFilter {
    pub fn from_config(cfg: &StrategyConfig) -> Self {
        let c = &cfg.confirmation;
        Self {
            windows: [c.short_window, c.medium_window, c.long_window],
            sma_period: cfg.sma_period,
            rsi: Rsi::new(cfg.rsi_period),
            bullish_rsi: c.bullish_rsi,
            bearish_rsi: c.bearish_rsi,
        }
    }

    /// Trend of the trailing `window` bars of `bars`.
    ///
    /// Fewer than `window` bars, or too few for the RSI, reads neutral.
    pub fn window_trend(&self, bars: &[PriceBar], window: usize) -> WindowTrend {
        if window == 0 || bars.len() < window || window < self.rsi.required_bars() {
            return WindowTrend::Neutral;
        }
        let slice = &bars[bars.len() - window..];
        let close = slice[slice.len() - 1].close;

        let mut bullish = 0u8;
        let mut bearish = 0u8;

        if let Some(sma) = Sma::new(self.sma_period.min(window)).latest(slice).value() {
            if close > sma {
                bullish += 1;
            } else if close < sma {
                bearish += 1;
            }
        }
        if let Some(rsi) = self.rsi.latest(slice).value() {
            if rsi < self.bullish_rsi {
                bullish += 1;
            } else if rsi > self.bearish_rsi {
                bearish += 1;
            }
        }

        match bullish.cmp(&bearish) {
            std::cmp::Ordering::Greater => WindowTrend::Bullish,
            std::cmp::Ordering::Less => WindowTrend::Bearish,
            std::cmp::Ordering::Equal => WindowTrend::Neutral,
        }
    }

    pub fn readings(&self, bars: &[PriceBar]) -> TimeframeReadings {
        TimeframeReadings {
            short: self.window_trend(bars, self.windows[0]),
            medium: self.window_trend(bars, self.windows[1]),
            long: self.window_trend(bars, self.windows[2]),
        }
    }

    /// Pass the signal through, or downgrade a BUY that lacks confirmations.
    pub fn confirm(&self, signal: &Signal, bars: &[PriceBar], adj: RegimeAdjustment) -> Signal {
        if signal.kind != SignalKind::Buy {
            return signal.clone();
        }
        let readings = self.readings(bars);
        let bullish = readings.bullish_count();
        if bullish >= adj.required_confirmations {
            signal.clone()
        } else {
            signal.downgraded(&format!(
                "timeframe confirmation {bullish}/{} bullish, need {}",
                self.windows.len(),
                adj.required_confirmations
            ))
        }
    }
}
