//! TOML run configuration.
//!
//! ```toml
//! [backtest]
//! initial_capital = 10000.0
//! periods_per_year = 8760.0
//! exclude_unrealized = false
//!
//! [strategy]
//! sma_period = 20
//! high_interest_entities = ["Jump Trading"]
//!
//! [walk_forward]
//! warmup = { mode = "lookback", bars = 100 }
//!
//! [sweep]
//! threads = 4
//! [sweep.grid]
//! sma_period = [10, 20, 30]
//! signal_threshold = [1, 2]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use whaleflow_core::{RunOptions, StrategyConfig};

use crate::metrics::MetricsOptions;
use crate::sweep::ParamGrid;
use crate::walk_forward::WalkForwardConfig;

/// Errors from loading or validating a run configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid strategy: {0}")]
    Strategy(#[from] whaleflow_core::ConfigError),
    #[error("invalid [backtest] section: {0}")]
    Backtest(String),
}

/// `[backtest]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub initial_capital: f64,
    pub periods_per_year: f64,
    pub exclude_unrealized: bool,
}

impl Default for BacktestSection {
    fn default() -> Self {
        let metrics = MetricsOptions::default();
        Self {
            initial_capital: RunOptions::default().initial_capital,
            periods_per_year: metrics.periods_per_year,
            exclude_unrealized: metrics.exclude_unrealized,
        }
    }
}

/// `[sweep]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSection {
    /// Worker threads; 0 uses rayon's default.
    pub threads: usize,
    pub grid: ParamGrid,
}

/// A complete run configuration as read from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    pub strategy: StrategyConfig,
    pub walk_forward: WalkForwardConfig,
    pub sweep: SweepSection,
}

impl BacktestConfig {
    /// Parse and validate.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigFileError> {
        let config: BacktestConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigFileError> {
        let b = &self.backtest;
        if !(b.initial_capital > 0.0 && b.initial_capital.is_finite()) {
            return Err(ConfigFileError::Backtest(format!(
                "initial_capital must be positive, got {}",
                b.initial_capital
            )));
        }
        if !(b.periods_per_year > 0.0) {
            return Err(ConfigFileError::Backtest(format!(
                "periods_per_year must be positive, got {}",
                b.periods_per_year
            )));
        }
        self.strategy.validate()?;
        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            initial_capital: self.backtest.initial_capital,
            trade_from: None,
        }
    }

    pub fn metrics_options(&self) -> MetricsOptions {
        MetricsOptions {
            periods_per_year: self.backtest.periods_per_year,
            exclude_unrealized: self.backtest.exclude_unrealized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walk_forward::WarmupMode;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = BacktestConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, BacktestConfig::default());
        assert_eq!(cfg.strategy, StrategyConfig::default());
    }

    #[test]
    fn parses_every_section() {
        let text = r#"
            [backtest]
            initial_capital = 25000.0
            periods_per_year = 365.0
            exclude_unrealized = true

            [strategy]
            sma_period = 30
            signal_threshold = 1
            high_interest_entities = ["Jump Trading", "Wintermute"]

            [strategy.regime]
            adx_trend_threshold = 20.0

            [walk_forward]
            warmup = { mode = "lookback", bars = 120 }

            [sweep]
            threads = 2

            [sweep.grid]
            sma_period = [10, 20]
            stop_loss_percentage = [0.01, 0.02]
        "#;
        let cfg = BacktestConfig::from_toml_str(text).unwrap();
        assert_eq!(cfg.backtest.initial_capital, 25_000.0);
        assert!(cfg.backtest.exclude_unrealized);
        assert_eq!(cfg.strategy.sma_period, 30);
        assert_eq!(cfg.strategy.rsi_period, 14);
        assert_eq!(cfg.strategy.high_interest_entities.len(), 2);
        assert_eq!(cfg.strategy.regime.adx_trend_threshold, 20.0);
        assert_eq!(cfg.walk_forward.warmup, WarmupMode::Lookback { bars: 120 });
        assert_eq!(cfg.sweep.threads, 2);
        assert_eq!(cfg.sweep.grid.size(), 4);
        assert_eq!(cfg.run_options().initial_capital, 25_000.0);
        assert_eq!(cfg.metrics_options().periods_per_year, 365.0);
    }

    #[test]
    fn invalid_strategy_is_rejected() {
        let text = r#"
            [strategy]
            stop_loss_percentage = 0.1
            take_profit_percentage = 0.05
        "#;
        let err = BacktestConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigFileError::Strategy(_)));
    }

    #[test]
    fn non_positive_capital_is_rejected() {
        let err = BacktestConfig::from_toml_str("[backtest]\ninitial_capital = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::Backtest(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = BacktestConfig::from_toml_str("[strategy\nsma_period = ").unwrap_err();
        assert!(matches!(err, ConfigFileError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[strategy]\nrsi_period = 10\n").unwrap();
        let cfg = BacktestConfig::from_file(&path).unwrap();
        assert_eq!(cfg.strategy.rsi_period, 10);

        let missing = BacktestConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigFileError::Io { .. }));
    }
}
