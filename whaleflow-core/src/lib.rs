//! WhaleFlow Core: domain types, indicators, signal engine, regime detection,
//! timeframe confirmation, portfolio simulation and the backtest cycle loop.
//!
//! This crate performs no I/O. Every decision function is pure over its
//! inputs and a borrowed [`StrategyConfig`]:
//! - Indicators (SMA, RSI, ATR, ADX) with explicit insufficient-history readings
//! - Override chain → vote scoring → velocity suppression
//! - Regime classification feeding sizing and confirmation strength
//! - Volume gate on thin bars
//! - Long-only simulator with stop / target / trailing exits and Kelly sizing
//! - Deterministic union-timeline engine with no look-ahead

pub mod config;
pub mod confirmation;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod regime;
pub mod signal;
pub mod simulator;
pub mod volume;

pub use config::{ConfigError, StrategyConfig};
pub use engine::{run_backtest, BacktestOutput, EngineError, MarketData, RunOptions};
