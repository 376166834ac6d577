//! WhaleFlow Runner: backtest orchestration, walk-forward validation,
//! parameter sweeps and performance metrics.
//!
//! This crate builds on `whaleflow-core` to provide:
//! - CSV loading for bars and whale events, plus a seeded synthetic market
//! - TOML run configuration
//! - Single-backtest runner with a full performance report
//! - Walk-forward validation with an explicit warm-up mode
//! - Parallel parameter sweeps with per-run isolation and cancellation

pub mod config;
pub mod data;
pub mod metrics;
pub mod runner;
pub mod sweep;
pub mod synthetic;
pub mod walk_forward;

pub use config::{BacktestConfig, BacktestSection, ConfigFileError, SweepSection};
pub use data::{load_bars_csv, load_market, load_whales_csv, write_bars_csv, write_whales_csv, LoadError};
pub use metrics::{MetricValue, MetricsOptions, PerformanceReport};
pub use runner::{run_guarded, run_single, BacktestResult, RunError, RunFailure, SCHEMA_VERSION};
pub use sweep::{run_sweep, FailedRun, ParamGrid, ParamSet, SweepError, SweepOptions, SweepResult, SweepRun};
pub use synthetic::{synthetic_market, SyntheticConfig};
pub use walk_forward::{
    create_folds, run_walk_forward, FoldReport, FoldSpec, SkippedFold, WalkForwardConfig,
    WalkForwardError, WalkForwardResult, WalkForwardSummary, WarmupMode,
};
