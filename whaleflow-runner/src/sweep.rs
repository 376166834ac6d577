//! Parameter sweeps: one isolated backtest per grid combination on a rayon
//! pool, with a single collector draining a channel.
//!
//! - Each worker owns its simulator; the market data is shared read-only.
//! - An error or panic in one combination becomes a [`FailedRun`]; the rest
//!   keep going.
//! - Cancellation is cooperative: combinations not yet started when the flag
//!   goes up are counted as cancelled. Finished results stay valid.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use whaleflow_core::domain::DataOrderingViolation;
use whaleflow_core::{MarketData, RunOptions, StrategyConfig};

use crate::metrics::{MetricsOptions, PerformanceReport};
use crate::runner::{run_guarded, BacktestResult, RunFailure};

// ─── Grid ────────────────────────────────────────────────────────────

/// Values to try per strategy option.
///
/// Keys are `StrategyConfig` field names; nested options use dots
/// (`regime.adx_trend_threshold`). Axes are iterated in key order with the
/// last key varying fastest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid {
    pub axes: BTreeMap<String, Vec<Value>>,
}

/// One point in the grid.
pub type ParamSet = BTreeMap<String, Value>;

impl ParamGrid {
    pub fn axis(mut self, key: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.axes
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Number of combinations. An empty grid is the base config alone.
    pub fn size(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    /// Every combination in odometer order.
    pub fn param_sets(&self) -> Vec<ParamSet> {
        let mut sets = vec![ParamSet::new()];
        for (key, values) in &self.axes {
            sets = sets
                .into_iter()
                .flat_map(|set| {
                    values.iter().map(move |v| {
                        let mut next = set.clone();
                        next.insert(key.clone(), v.clone());
                        next
                    })
                })
                .collect();
        }
        sets
    }

    /// Apply every combination to `base`.
    ///
    /// Unknown keys and values of the wrong type are rejected here, before
    /// anything runs. Range checks are left to each run's validation.
    pub fn configs(&self, base: &StrategyConfig) -> Result<Vec<(ParamSet, StrategyConfig)>, SweepError> {
        if let Some((key, _)) = self.axes.iter().find(|(_, v)| v.is_empty()) {
            return Err(SweepError::EmptyAxis(key.clone()));
        }
        let base_value = serde_json::to_value(base).map_err(|e| SweepError::InvalidValue {
            params: "<base>".into(),
            reason: e.to_string(),
        })?;
        self.param_sets()
            .into_iter()
            .map(|params| {
                let mut value = base_value.clone();
                for (key, v) in &params {
                    set_path(&mut value, key, v.clone())?;
                }
                let config = serde_json::from_value(value).map_err(|e| SweepError::InvalidValue {
                    params: describe(&params),
                    reason: e.to_string(),
                })?;
                Ok((params, config))
            })
            .collect()
    }
}

fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), SweepError> {
    let unknown = || SweepError::UnknownParameter(path.to_string());
    let mut node = root;
    for part in path.split('.') {
        node = match node {
            Value::Object(map) => map.get_mut(part).ok_or_else(unknown)?,
            _ => return Err(unknown()),
        };
    }
    *node = value;
    Ok(())
}

/// `key=value` pairs for logs and error messages.
pub fn describe(params: &ParamSet) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepOptions {
    /// Worker threads; 0 uses rayon's default.
    pub threads: usize,
    pub run: RunOptions,
    pub metrics: MetricsOptions,
}

/// A completed combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRun {
    pub index: usize,
    /// Content hash of the combination's config.
    pub run_id: String,
    pub params: ParamSet,
    pub total_pnl: f64,
    pub final_equity: f64,
    pub metrics: PerformanceReport,
}

/// A combination that errored or panicked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRun {
    pub index: usize,
    pub config_hash: String,
    pub params: ParamSet,
    pub cause: RunFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub base_config_hash: String,
    pub total: usize,
    /// Completed runs, best total PnL first.
    pub ranked: Vec<SweepRun>,
    pub failed: Vec<FailedRun>,
    pub cancelled: usize,
}

impl SweepResult {
    pub fn best(&self) -> Option<&SweepRun> {
        self.ranked.first()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }
}

/// Errors that stop a sweep before any combination runs.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("unknown sweep parameter '{0}'")]
    UnknownParameter(String),
    #[error("sweep axis '{0}' has no values")]
    EmptyAxis(String),
    #[error("invalid combination [{params}]: {reason}")]
    InvalidValue { params: String, reason: String },
    #[error(transparent)]
    Ordering(#[from] DataOrderingViolation),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("result collector panicked")]
    Collector,
}

enum Outcome {
    Done(Box<BacktestResult>),
    Failed(RunFailure),
    Cancelled,
}

#[derive(Default)]
struct Collected {
    done: Vec<SweepRun>,
    failed: Vec<FailedRun>,
    cancelled: usize,
}

// ─── Execution ───────────────────────────────────────────────────────

/// Run every combination of `grid` applied to `base`.
pub fn run_sweep(
    data: &MarketData,
    base: &StrategyConfig,
    grid: &ParamGrid,
    opts: &SweepOptions,
    cancel: Option<&AtomicBool>,
) -> Result<SweepResult, SweepError> {
    data.check_ordering()?;
    let combos = grid.configs(base)?;
    let total = combos.len();
    info!(combinations = total, threads = opts.threads, "sweep started");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.threads)
        .build()?;
    let (tx, rx) = mpsc::channel::<(usize, Outcome)>();

    let collected = std::thread::scope(|s| {
        let combos_ref = &combos;
        let collector = s.spawn(move || {
            let mut out = Collected::default();
            for (index, outcome) in rx {
                let (params, config) = &combos_ref[index];
                match outcome {
                    Outcome::Done(result) => {
                        let result = *result;
                        debug!(index, pnl = result.total_pnl(), "combination complete");
                        out.done.push(SweepRun {
                            index,
                            run_id: result.config_hash.clone(),
                            params: params.clone(),
                            total_pnl: result.total_pnl(),
                            final_equity: result.final_equity,
                            metrics: result.metrics,
                        });
                    }
                    Outcome::Failed(cause) => {
                        warn!(index, params = %describe(params), %cause, "combination failed");
                        out.failed.push(FailedRun {
                            index,
                            config_hash: config.config_hash(),
                            params: params.clone(),
                            cause,
                        });
                    }
                    Outcome::Cancelled => out.cancelled += 1,
                }
            }
            out
        });

        pool.install(|| {
            combos
                .par_iter()
                .enumerate()
                .for_each_with(tx, |tx, (index, (_, config))| {
                    let outcome = if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                        Outcome::Cancelled
                    } else {
                        match run_guarded(data, config, &opts.run, &opts.metrics) {
                            Ok(result) => Outcome::Done(Box::new(result)),
                            Err(cause) => Outcome::Failed(cause),
                        }
                    };
                    // The collector only hangs up if it panicked; join reports that.
                    let _ = tx.send((index, outcome));
                });
        });

        collector.join()
    })
    .map_err(|_| SweepError::Collector)?;

    let Collected {
        mut done,
        mut failed,
        cancelled,
    } = collected;
    done.sort_by(|a, b| b.total_pnl.total_cmp(&a.total_pnl).then(a.index.cmp(&b.index)));
    failed.sort_by_key(|f| f.index);

    info!(
        completed = done.len(),
        failed = failed.len(),
        cancelled,
        best_pnl = ?done.first().map(|r| r.total_pnl),
        "sweep complete"
    );

    Ok(SweepResult {
        base_config_hash: base.config_hash(),
        total,
        ranked: done,
        failed,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{synthetic_market, SyntheticConfig};

    fn base() -> StrategyConfig {
        StrategyConfig {
            warm_up_bars: 10,
            ..StrategyConfig::default()
        }
    }

    fn market() -> MarketData {
        synthetic_market(&SyntheticConfig {
            bars_per_symbol: 200,
            ..SyntheticConfig::default()
        })
    }

    #[test]
    fn grid_size_is_product_of_axes() {
        let grid = ParamGrid::default()
            .axis("sma_period", [10, 20, 30])
            .axis("signal_threshold", [1, 2]);
        assert_eq!(grid.size(), 6);
        assert_eq!(grid.param_sets().len(), 6);
        assert_eq!(ParamGrid::default().size(), 1);
    }

    #[test]
    fn configs_apply_nested_keys() {
        let grid = ParamGrid::default()
            .axis("regime.adx_trend_threshold", [20.0, 30.0])
            .axis("stop_loss_percentage", [0.01]);
        let configs = grid.configs(&base()).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].1.regime.adx_trend_threshold, 20.0);
        assert_eq!(configs[1].1.regime.adx_trend_threshold, 30.0);
        assert!(configs.iter().all(|(_, c)| c.stop_loss_percentage == 0.01));
        assert!(configs.iter().all(|(_, c)| c.warm_up_bars == 10));
    }

    #[test]
    fn bad_grids_are_rejected_up_front() {
        let unknown = ParamGrid::default().axis("no_such_option", [1]);
        assert!(matches!(
            unknown.configs(&base()).unwrap_err(),
            SweepError::UnknownParameter(_)
        ));
        let wrong_type = ParamGrid::default().axis("sma_period", ["twenty"]);
        assert!(matches!(
            wrong_type.configs(&base()).unwrap_err(),
            SweepError::InvalidValue { .. }
        ));
        let empty = ParamGrid::default().axis("sma_period", Vec::<i64>::new());
        assert!(matches!(
            empty.configs(&base()).unwrap_err(),
            SweepError::EmptyAxis(_)
        ));
    }

    #[test]
    fn sweep_ranks_by_pnl_and_ids_runs() {
        let grid = ParamGrid::default().axis("sma_period", [10, 20]).axis("signal_threshold", [1, 2]);
        let result = run_sweep(
            &market(),
            &base(),
            &grid,
            &SweepOptions {
                threads: 2,
                ..SweepOptions::default()
            },
            None,
        )
        .unwrap();
        assert_eq!(result.total, 4);
        assert_eq!(result.ranked.len() + result.failed.len(), 4);
        assert!(!result.was_cancelled());
        assert!(result
            .ranked
            .windows(2)
            .all(|w| w[0].total_pnl >= w[1].total_pnl));
        let mut ids: Vec<&str> = result.ranked.iter().map(|r| r.run_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), result.ranked.len());
    }

    #[test]
    fn invalid_combination_is_a_failed_run() {
        // 0.06 stop against the default 0.05 target fails validation.
        let grid = ParamGrid::default().axis("stop_loss_percentage", [0.01, 0.06]);
        let result = run_sweep(&market(), &base(), &grid, &SweepOptions::default(), None).unwrap();
        assert_eq!(result.ranked.len(), 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].index, 1);
        assert!(matches!(result.failed[0].cause, RunFailure::Error(_)));
    }

    #[test]
    fn raised_flag_cancels_everything_not_started() {
        let grid = ParamGrid::default().axis("sma_period", [10, 15, 20]);
        let cancel = AtomicBool::new(true);
        let result = run_sweep(&market(), &base(), &grid, &SweepOptions::default(), Some(&cancel)).unwrap();
        assert_eq!(result.cancelled, 3);
        assert!(result.ranked.is_empty());
        assert!(result.best().is_none());
    }

    #[test]
    fn thread_count_does_not_change_results() {
        let grid = ParamGrid::default().axis("rsi_period", [10, 14]).axis("sma_period", [10, 20]);
        let run = |threads| {
            run_sweep(
                &market(),
                &base(),
                &grid,
                &SweepOptions {
                    threads,
                    ..SweepOptions::default()
                },
                None,
            )
            .unwrap()
        };
        let one = run(1);
        let four = run(4);
        let key = |r: &SweepResult| {
            r.ranked
                .iter()
                .map(|x| (x.index, x.total_pnl.to_bits()))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&one), key(&four));
    }
}
