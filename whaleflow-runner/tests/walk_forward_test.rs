//! Fold isolation: nothing stamped in a later fold may influence an earlier
//! fold's report, in either warm-up mode.

use whaleflow_core::domain::FlowDirection;
use whaleflow_core::{MarketData, StrategyConfig};
use whaleflow_runner::{
    run_walk_forward, synthetic_market, FoldReport, MetricsOptions, SyntheticConfig,
    WalkForwardConfig, WarmupMode,
};

fn market() -> MarketData {
    synthetic_market(&SyntheticConfig {
        bars_per_symbol: 600,
        seed: 11,
        whale_probability: 0.3,
        ..SyntheticConfig::default()
    })
}

fn strategy() -> StrategyConfig {
    StrategyConfig {
        warm_up_bars: 10,
        signal_threshold: 1,
        ..StrategyConfig::default()
    }
}

/// Double every price and flip every whale flow from `from` onwards.
/// Timestamps are untouched, so the fold boundaries do not move.
fn rewrite_future(data: &MarketData, from: chrono::DateTime<chrono::Utc>) -> MarketData {
    let mut out = data.clone();
    for series in out.bars.values_mut() {
        for bar in series.iter_mut().filter(|b| b.timestamp >= from) {
            bar.open *= 2.0;
            bar.high *= 2.0;
            bar.low *= 2.0;
            bar.close *= 2.0;
        }
    }
    for event in out.whale_events.iter_mut().filter(|e| e.timestamp >= from) {
        event.direction = match event.direction {
            FlowDirection::ToExchange => FlowDirection::FromExchange,
            FlowDirection::FromExchange => FlowDirection::ToExchange,
            FlowDirection::Transfer => FlowDirection::ToExchange,
        };
        event.usd_value *= 10.0;
    }
    out
}

fn early_folds(folds: &[FoldReport], below: usize) -> String {
    let early: Vec<&FoldReport> = folds.iter().filter(|f| f.fold_index < below).collect();
    serde_json::to_string(&early).unwrap()
}

fn assert_isolated(warmup: WarmupMode) {
    let data = market();
    let wf = WalkForwardConfig {
        splits: Some(3),
        warmup,
    };
    let metrics = MetricsOptions::default();

    let base = run_walk_forward(&data, &strategy(), &wf, 10_000.0, &metrics).unwrap();
    let timeline = data.timeline();
    // Fold 2 starts at 2 * (len / 3).
    let fold2_start = timeline[2 * (timeline.len() / 3)];
    let altered = rewrite_future(&data, fold2_start);
    let other = run_walk_forward(&altered, &strategy(), &wf, 10_000.0, &metrics).unwrap();

    assert_eq!(early_folds(&base.folds, 2), early_folds(&other.folds, 2));
    assert_eq!(
        base.skipped.iter().filter(|s| s.fold_index < 2).count(),
        other.skipped.iter().filter(|s| s.fold_index < 2).count()
    );
}

#[test]
fn reset_folds_ignore_later_data() {
    assert_isolated(WarmupMode::Reset);
}

#[test]
fn lookback_folds_ignore_later_data() {
    // Fold 1 borrows history from fold 0 but must never read fold 2.
    assert_isolated(WarmupMode::Lookback { bars: 120 });
}

#[test]
fn lookback_warmup_range_sits_just_before_the_fold() {
    let data = market();
    let timeline = data.timeline();
    let wf = WalkForwardConfig {
        splits: Some(3),
        warmup: WarmupMode::Lookback { bars: 50 },
    };
    let result = run_walk_forward(&data, &strategy(), &wf, 10_000.0, &MetricsOptions::default()).unwrap();
    let size = timeline.len() / 3;
    for fold in result.folds.iter().filter(|f| f.fold_index > 0) {
        let start = fold.fold_index * size;
        assert_eq!(fold.test_start, timeline[start]);
        assert_eq!(fold.warmup_range, Some((timeline[start - 50], timeline[start - 1])));
        assert!(fold.trades.iter().all(|t| t.entry_time >= fold.test_start));
    }
}

#[test]
fn results_are_deterministic() {
    let data = market();
    let wf = WalkForwardConfig::default();
    let a = run_walk_forward(&data, &strategy(), &wf, 10_000.0, &MetricsOptions::default()).unwrap();
    let b = run_walk_forward(&data, &strategy(), &wf, 10_000.0, &MetricsOptions::default()).unwrap();
    assert_eq!(early_folds(&a.folds, 3), early_folds(&b.folds, 3));
    assert_eq!(a.summary, b.summary);
}
