//! Strategy configuration: one immutable value threaded through every call.
//!
//! Nothing in the engine reads configuration from a global. A run validates
//! its `StrategyConfig` once up front; every pure function then takes it by
//! reference.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest velocity baseline accepted: ten years of hours.
pub const MAX_VELOCITY_BASELINE_HOURS: u32 = 24 * 365 * 10;

/// Invalid or contradictory configuration. Fatal: the run must not start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid config key '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("stop ({stop}) must be strictly below target ({target})")]
    StopNotBelowTarget { stop: f64, target: f64 },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Kelly sizing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Closed trades required before Kelly scaling kicks in.
    pub min_trades: usize,
    /// Upper clamp on the half-Kelly fraction.
    pub max_fraction: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            min_trades: 10,
            max_fraction: 0.25,
        }
    }
}

/// Regime detector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub adx_period: usize,
    pub atr_period: usize,
    /// ADX at or above this is TRENDING.
    pub adx_trend_threshold: f64,
    /// Percentile rank of current ATR% at or above which the regime is VOLATILE.
    pub volatility_percentile: f64,
    /// Valid ATR% points needed before the percentile rank is trusted.
    pub min_volatility_samples: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            adx_period: 14,
            atr_period: 14,
            adx_trend_threshold: 25.0,
            volatility_percentile: 0.8,
            min_volatility_samples: 20,
        }
    }
}

/// Multi-timeframe confirmation windows (in bars).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub short_window: usize,
    pub medium_window: usize,
    pub long_window: usize,
    /// RSI below this reads bullish inside a window.
    pub bullish_rsi: f64,
    /// RSI above this reads bearish inside a window.
    pub bearish_rsi: f64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            short_window: 50,
            medium_window: 100,
            long_window: 200,
            bullish_rsi: 40.0,
            bearish_rsi: 60.0,
        }
    }
}

/// Every recognized strategy and risk option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    // ── Indicators ──
    pub sma_period: usize,
    pub rsi_period: usize,
    pub rsi_oversold_threshold: f64,
    pub rsi_overbought_threshold: f64,

    // ── Scoring ──
    pub signal_threshold: u32,

    // ── Exits ──
    pub stop_loss_percentage: f64,
    pub take_profit_percentage: f64,
    pub trailing_stop_enabled: bool,
    pub trailing_stop_activation: f64,
    pub trailing_stop_distance: f64,
    pub stop_loss_cooldown_bars: usize,

    // ── Sizing & costs ──
    pub trade_risk_percentage: f64,
    pub max_concurrent_positions: usize,
    pub slippage_bps: f64,
    pub fee_rate: f64,
    pub kelly: KellyConfig,

    // ── Volume gate ──
    /// Downgrade BUY/SELL to HOLD when the bar's volume is below its trailing mean.
    pub volume_gate_enabled: bool,
    pub volume_gate_period: usize,

    // ── On-chain ──
    pub transaction_velocity_baseline_hours: u32,
    pub transaction_velocity_multiplier: f64,
    pub stablecoin_inflow_threshold_usd: f64,
    pub stablecoins: Vec<String>,
    pub high_interest_entities: Vec<String>,

    // ── Runner ──
    pub walk_forward_splits: usize,
    pub warm_up_bars: usize,
    /// Trailing bars handed to indicators each cycle.
    pub history_window_bars: usize,

    pub regime: RegimeConfig,
    pub confirmation: ConfirmationConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            sma_period: 20,
            rsi_period: 14,
            rsi_oversold_threshold: 30.0,
            rsi_overbought_threshold: 70.0,
            signal_threshold: 2,
            stop_loss_percentage: 0.02,
            take_profit_percentage: 0.05,
            trailing_stop_enabled: true,
            trailing_stop_activation: 0.02,
            trailing_stop_distance: 0.015,
            stop_loss_cooldown_bars: 6,
            trade_risk_percentage: 0.01,
            max_concurrent_positions: 3,
            slippage_bps: 5.0,
            fee_rate: 0.001,
            kelly: KellyConfig::default(),
            volume_gate_enabled: true,
            volume_gate_period: 20,
            transaction_velocity_baseline_hours: 24,
            transaction_velocity_multiplier: 5.0,
            stablecoin_inflow_threshold_usd: 100_000_000.0,
            stablecoins: vec!["USDT".into(), "USDC".into()],
            high_interest_entities: Vec::new(),
            walk_forward_splits: 3,
            warm_up_bars: 30,
            history_window_bars: 250,
            regime: RegimeConfig::default(),
            confirmation: ConfirmationConfig::default(),
        }
    }
}

impl StrategyConfig {
    /// Reject contradictory or out-of-range parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_finite()?;
        self.validate_periods()?;
        self.validate_thresholds()?;
        self.validate_exits()?;
        self.validate_sizing()?;
        self.validate_onchain()?;
        Ok(())
    }

    fn validate_finite(&self) -> Result<(), ConfigError> {
        let floats = [
            ("rsi_oversold_threshold", self.rsi_oversold_threshold),
            ("rsi_overbought_threshold", self.rsi_overbought_threshold),
            ("stop_loss_percentage", self.stop_loss_percentage),
            ("take_profit_percentage", self.take_profit_percentage),
            ("trailing_stop_activation", self.trailing_stop_activation),
            ("trailing_stop_distance", self.trailing_stop_distance),
            ("trade_risk_percentage", self.trade_risk_percentage),
            ("slippage_bps", self.slippage_bps),
            ("fee_rate", self.fee_rate),
            ("kelly.max_fraction", self.kelly.max_fraction),
            ("transaction_velocity_multiplier", self.transaction_velocity_multiplier),
            ("stablecoin_inflow_threshold_usd", self.stablecoin_inflow_threshold_usd),
            ("regime.adx_trend_threshold", self.regime.adx_trend_threshold),
            ("regime.volatility_percentile", self.regime.volatility_percentile),
            ("confirmation.bullish_rsi", self.confirmation.bullish_rsi),
            ("confirmation.bearish_rsi", self.confirmation.bearish_rsi),
        ];
        match floats.into_iter().find(|(_, v)| !v.is_finite()) {
            Some((key, value)) => Err(invalid(key, format!("must be finite, got {value}"))),
            None => Ok(()),
        }
    }

    fn validate_periods(&self) -> Result<(), ConfigError> {
        let periods = [
            ("sma_period", self.sma_period),
            ("rsi_period", self.rsi_period),
            ("regime.adx_period", self.regime.adx_period),
            ("regime.atr_period", self.regime.atr_period),
            ("confirmation.short_window", self.confirmation.short_window),
            ("walk_forward_splits", self.walk_forward_splits),
        ];
        for (key, value) in periods {
            if value == 0 {
                return Err(invalid(key, "must be >= 1"));
            }
        }
        let c = &self.confirmation;
        if !(c.short_window <= c.medium_window && c.medium_window <= c.long_window) {
            return Err(invalid(
                "confirmation",
                format!(
                    "windows must be ordered short <= medium <= long, got {}/{}/{}",
                    c.short_window, c.medium_window, c.long_window
                ),
            ));
        }
        if self.history_window_bars < self.longest_indicator_window() {
            return Err(invalid(
                "history_window_bars",
                format!(
                    "{} is shorter than the longest indicator window {}",
                    self.history_window_bars,
                    self.longest_indicator_window()
                ),
            ));
        }
        // Windows longer than the history never fill and read neutral forever.
        if self.history_window_bars < c.long_window {
            return Err(invalid(
                "history_window_bars",
                format!(
                    "{} is shorter than confirmation.long_window {}",
                    self.history_window_bars, c.long_window
                ),
            ));
        }
        if self.volume_gate_enabled
            && (self.volume_gate_period == 0 || self.volume_gate_period > self.history_window_bars)
        {
            return Err(invalid(
                "volume_gate_period",
                format!("must be in [1, history_window_bars], got {}", self.volume_gate_period),
            ));
        }
        Ok(())
    }

    fn validate_thresholds(&self) -> Result<(), ConfigError> {
        if self.rsi_oversold_threshold >= self.rsi_overbought_threshold {
            return Err(invalid(
                "rsi_oversold_threshold",
                "must be below rsi_overbought_threshold",
            ));
        }
        if self.signal_threshold == 0 {
            return Err(invalid("signal_threshold", "must be >= 1"));
        }
        let r = &self.regime;
        if !(0.0..=1.0).contains(&r.volatility_percentile) {
            return Err(invalid("regime.volatility_percentile", "must be in [0, 1]"));
        }
        if self.confirmation.bullish_rsi > self.confirmation.bearish_rsi {
            return Err(invalid(
                "confirmation.bullish_rsi",
                "must not exceed confirmation.bearish_rsi",
            ));
        }
        Ok(())
    }

    fn validate_exits(&self) -> Result<(), ConfigError> {
        if self.stop_loss_percentage <= 0.0 || self.stop_loss_percentage >= 1.0 {
            return Err(invalid("stop_loss_percentage", "must be in (0, 1)"));
        }
        if self.take_profit_percentage <= 0.0 {
            return Err(invalid("take_profit_percentage", "must be positive"));
        }
        if self.stop_loss_percentage >= self.take_profit_percentage {
            return Err(ConfigError::StopNotBelowTarget {
                stop: self.stop_loss_percentage,
                target: self.take_profit_percentage,
            });
        }
        if self.trailing_stop_enabled {
            if self.trailing_stop_activation <= 0.0 {
                return Err(invalid("trailing_stop_activation", "must be positive"));
            }
            if self.trailing_stop_distance <= 0.0 || self.trailing_stop_distance >= 1.0 {
                return Err(invalid("trailing_stop_distance", "must be in (0, 1)"));
            }
        }
        Ok(())
    }

    fn validate_sizing(&self) -> Result<(), ConfigError> {
        if self.trade_risk_percentage <= 0.0 || self.trade_risk_percentage > 1.0 {
            return Err(invalid("trade_risk_percentage", "must be in (0, 1]"));
        }
        if self.max_concurrent_positions == 0 {
            return Err(invalid("max_concurrent_positions", "must be >= 1"));
        }
        if self.slippage_bps < 0.0 || self.slippage_bps >= 10_000.0 {
            return Err(invalid("slippage_bps", "must be in [0, 10000)"));
        }
        if self.fee_rate < 0.0 || self.fee_rate >= 1.0 {
            return Err(invalid("fee_rate", "must be in [0, 1)"));
        }
        if self.kelly.max_fraction <= 0.0 || self.kelly.max_fraction > 1.0 {
            return Err(invalid("kelly.max_fraction", "must be in (0, 1]"));
        }
        Ok(())
    }

    fn validate_onchain(&self) -> Result<(), ConfigError> {
        let hours = self.transaction_velocity_baseline_hours;
        if hours == 0 || hours > MAX_VELOCITY_BASELINE_HOURS {
            return Err(invalid(
                "transaction_velocity_baseline_hours",
                format!("must be in [1, {MAX_VELOCITY_BASELINE_HOURS}]"),
            ));
        }
        if self.transaction_velocity_multiplier <= 0.0 {
            return Err(invalid("transaction_velocity_multiplier", "must be positive"));
        }
        if self.stablecoin_inflow_threshold_usd < 0.0 {
            return Err(invalid("stablecoin_inflow_threshold_usd", "must be >= 0"));
        }
        Ok(())
    }

    /// Bars the slowest indicator needs before it produces a value.
    pub fn longest_indicator_window(&self) -> usize {
        [
            self.sma_period,
            self.rsi_period + 1,
            self.regime.atr_period + 1,
            2 * self.regime.adx_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Minimum bars per symbol for a run to be meaningful.
    pub fn required_bars(&self) -> usize {
        self.warm_up_bars + self.longest_indicator_window()
    }

    /// Content hash of this configuration (blake3 over its JSON form).
    ///
    /// Two runs with identical configs share the same hash.
    pub fn config_hash(&self) -> String {
        match serde_json::to_vec(self) {
            Ok(bytes) => blake3::hash(&bytes).to_hex().to_string(),
            Err(_) => String::new(),
        }
    }
}
