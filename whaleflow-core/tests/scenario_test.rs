//! End-to-end scenarios through the public API.
//!
//! Each test reads GIVEN / WHEN / THEN.

use chrono::{DateTime, Duration, TimeZone, Utc};
use whaleflow_core::config::ConfirmationConfig;
use whaleflow_core::domain::{
    CounterpartyKind, ExitReason, FlowDirection, PriceBar, Signal, SignalKind, WhaleEvent,
};
use whaleflow_core::regime::Regime;
use whaleflow_core::signal::{CycleContext, SignalEngine, SymbolView};
use whaleflow_core::simulator::{EntryOutcome, PortfolioSimulator};
use whaleflow_core::{run_backtest, ConfigError, EngineError, MarketData, RunOptions, StrategyConfig};

// ── Helpers ──────────────────────────────────────────────────────────

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn hour(h: usize) -> DateTime<Utc> {
    base() + Duration::hours(h as i64)
}

fn hourly_bars(symbol: &str, closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar {
            symbol: symbol.into(),
            timestamp: hour(i),
            open: c,
            high: c + 0.5,
            low: c - 0.5,
            close: c,
            volume: 1_000.0,
        })
        .collect()
}

/// Strategy over a 60-bar history with confirmation windows that fit it.
fn short_history_cfg() -> StrategyConfig {
    StrategyConfig {
        warm_up_bars: 5,
        history_window_bars: 60,
        confirmation: ConfirmationConfig {
            short_window: 20,
            medium_window: 40,
            long_window: 60,
            ..ConfirmationConfig::default()
        },
        ..StrategyConfig::default()
    }
}

/// Alternating +1.2 / -1.0 closes: above the SMA with a mid-range RSI on
/// every window.
fn sawtooth(symbol: &str, n: usize) -> Vec<PriceBar> {
    let closes: Vec<f64> = (0..n)
        .map(|i| 100.0 + i as f64 * 0.1 + if i % 2 == 1 { 1.1 } else { 0.0 })
        .collect();
    hourly_bars(symbol, &closes)
}

fn rising(symbol: &str, n: usize) -> Vec<PriceBar> {
    let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 0.5).collect();
    hourly_bars(symbol, &closes)
}

fn event(
    symbol: &str,
    at: DateTime<Utc>,
    usd: f64,
    direction: FlowDirection,
    label: Option<&str>,
) -> WhaleEvent {
    WhaleEvent {
        symbol: symbol.into(),
        timestamp: at,
        usd_value: usd,
        counterparty_kind: CounterpartyKind::PrivateWallet,
        entity_label: label.map(str::to_string),
        direction,
    }
}

/// One unlabelled transfer per hour over the day before `now`, so a single
/// fresh event does not read as a velocity spike.
fn background(symbol: &str, now: DateTime<Utc>) -> Vec<WhaleEvent> {
    (1..24)
        .rev()
        .map(|k| {
            event(
                symbol,
                now - Duration::hours(k) - Duration::minutes(30),
                1_000_000.0,
                FlowDirection::Transfer,
                None,
            )
        })
        .collect()
}

fn buy(symbol: &str, at: DateTime<Utc>) -> Signal {
    Signal {
        symbol: symbol.into(),
        timestamp: at,
        kind: SignalKind::Buy,
        score: 2,
        buy_score: 2,
        sell_score: 0,
        trigger_reason: "test".into(),
        suppressed_kind: None,
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn trailing_stop_replaces_original_stop() {
    // GIVEN: entry at 100, 2% stop, trailing activates at +3% with 2% distance, no costs
    let cfg = StrategyConfig {
        stop_loss_percentage: 0.02,
        trailing_stop_activation: 0.03,
        trailing_stop_distance: 0.02,
        slippage_bps: 0.0,
        fee_rate: 0.0,
        ..StrategyConfig::default()
    };
    let bars = hourly_bars("ETH", &[100.0, 104.0, 101.9]);
    let mut sim = PortfolioSimulator::new(&cfg, 10_000.0);
    sim.on_bar(&bars[0]);
    let opened = sim
        .try_enter(&buy("ETH", hour(0)), 100.0, Regime::Trending.adjustment())
        .unwrap();
    let EntryOutcome::Opened(pos) = opened else {
        panic!("entry should fill: {opened:?}");
    };
    assert!((pos.stop_price - 98.0).abs() < 1e-9);

    // WHEN: price runs to 104, then falls back to 101.9
    assert!(sim.on_bar(&bars[1]).is_none());
    let trade = sim.on_bar(&bars[2]).expect("trailing stop should fire");

    // THEN: the exit is the trailing stop at 104 × 0.98, not the 98.0 stop
    assert_eq!(trade.exit_reason, ExitReason::Trailing);
    assert!((trade.exit_price - 101.92).abs() < 1e-9);
    assert!(trade.net_pnl > 0.0);
    assert_eq!(sim.open_count(), 0);
}

#[test]
fn watched_entity_withdrawal_forces_buy() {
    // GIVEN: a falling market (trend votes SELL) and a watched entity withdrawing
    let cfg = StrategyConfig {
        high_interest_entities: vec!["Jump Trading".into()],
        ..StrategyConfig::default()
    };
    let closes: Vec<f64> = (0..40).map(|i| 150.0 - i as f64).collect();
    let bars = hourly_bars("BTC", &closes);
    let now = hour(39);
    let mut events = background("BTC", now);
    events.push(event(
        "BTC",
        now - Duration::minutes(10),
        20_000_000.0,
        FlowDirection::FromExchange,
        Some("Jump Trading"),
    ));

    // WHEN: the engine evaluates BTC at `now`
    let engine = SignalEngine::default();
    let view = SymbolView::build("BTC", &bars, &events, &cfg).unwrap();
    let cycle = CycleContext::build(now, &events, &cfg);
    let signal = engine.evaluate(&view, &cycle, &cfg);

    // THEN: the withdrawal override wins and bypasses scoring
    assert_eq!(signal.kind, SignalKind::Buy);
    assert_eq!(signal.score, 0);
    assert!(signal.trigger_reason.contains("Jump Trading"));
    assert!(signal.sell_score >= 1, "votes are still recorded");
}

#[test]
fn stablecoin_flood_buys_every_symbol() {
    // GIVEN: $50M of stablecoins sent to exchanges in the last hour, threshold $40M
    let cfg = StrategyConfig {
        stablecoin_inflow_threshold_usd: 40_000_000.0,
        ..StrategyConfig::default()
    };
    let now = hour(39);
    let events = vec![
        event("USDT", now - Duration::minutes(40), 30_000_000.0, FlowDirection::ToExchange, None),
        event("USDC", now - Duration::minutes(5), 20_000_000.0, FlowDirection::ToExchange, None),
    ];
    let btc = rising("BTC", 40);
    let closes: Vec<f64> = (0..40).map(|i| 80.0 - i as f64 * 0.2).collect();
    let eth = hourly_bars("ETH", &closes);

    // WHEN: both symbols are evaluated in the same cycle
    let engine = SignalEngine::default();
    let cycle = CycleContext::build(now, &events, &cfg);
    let signals: Vec<Signal> = [("BTC", &btc), ("ETH", &eth)]
        .into_iter()
        .map(|(sym, bars)| {
            let view = SymbolView::build(sym, bars, &events, &cfg).unwrap();
            engine.evaluate(&view, &cycle, &cfg)
        })
        .collect();

    // THEN: every watched symbol gets a BUY
    assert!((cycle.stablecoin_inflow_usd - 50_000_000.0).abs() < 1e-6);
    for s in &signals {
        assert_eq!(s.kind, SignalKind::Buy, "{}: {}", s.symbol, s.trigger_reason);
        assert!(s.trigger_reason.contains("stablecoin"));
    }
}

#[test]
fn velocity_spike_suppresses_scored_buy() {
    // GIVEN: a rising market with exchange outflow (trend + flow vote BUY),
    // 5 events this hour against a baseline of 1 per hour, multiplier 2
    let cfg = StrategyConfig {
        transaction_velocity_multiplier: 2.0,
        ..StrategyConfig::default()
    };
    let bars = rising("BTC", 40);
    let now = hour(39);
    let mut events: Vec<WhaleEvent> = (1..20)
        .rev()
        .map(|k| {
            event(
                "BTC",
                now - Duration::hours(k) - Duration::minutes(15),
                2_000_000.0,
                FlowDirection::Transfer,
                None,
            )
        })
        .collect();
    for m in [50, 40, 30, 20, 10] {
        events.push(event(
            "BTC",
            now - Duration::minutes(m),
            3_000_000.0,
            FlowDirection::FromExchange,
            None,
        ));
    }

    // WHEN: the engine evaluates BTC
    let engine = SignalEngine::default();
    let view = SymbolView::build("BTC", &bars, &events, &cfg).unwrap();
    assert_eq!(view.velocity.current_count, 5);
    assert!((view.velocity.baseline_average - 1.0).abs() < 1e-12);
    let signal = engine.evaluate(&view, &CycleContext::build(now, &events, &cfg), &cfg);

    // THEN: the BUY is replaced by a warning that remembers it
    assert_eq!(signal.kind, SignalKind::VolatilityWarning);
    assert_eq!(signal.suppressed_kind, Some(SignalKind::Buy));
    assert!(signal.buy_score >= cfg.signal_threshold);
    assert!(!signal.permits_entry());
}

#[test]
fn velocity_spike_opens_nothing_in_backtest() {
    // GIVEN: a burst of whale events right before one bar
    let cfg = StrategyConfig {
        transaction_velocity_multiplier: 2.0,
        ..short_history_cfg()
    };
    let bars = rising("BTC", 80);
    let spike = hour(60);
    let mut events = background("BTC", spike);
    for m in [55, 45, 35, 25, 15, 5] {
        events.push(event(
            "BTC",
            spike - Duration::minutes(m),
            4_000_000.0,
            FlowDirection::FromExchange,
            None,
        ));
    }
    let data = MarketData::from_parts(bars, events);

    // WHEN: the backtest runs
    let out = run_backtest(&data, &cfg, &RunOptions::default()).unwrap();

    // THEN: the spike cycle is a warning and nothing was entered or missed at it
    let at_spike = out.signals.iter().find(|s| s.timestamp == spike).unwrap();
    assert_eq!(at_spike.kind, SignalKind::VolatilityWarning);
    assert!(out.closed_trades.iter().all(|t| t.entry_time != spike));
    assert!(out.missed_entries.iter().all(|m| m.timestamp != spike));
}

#[test]
fn contradictory_config_fails_before_any_trade() {
    // GIVEN: a stop wider than the target
    let cfg = StrategyConfig {
        stop_loss_percentage: 0.08,
        take_profit_percentage: 0.04,
        ..StrategyConfig::default()
    };
    let data = MarketData::from_parts(rising("BTC", 200), Vec::new());

    // WHEN: a backtest is attempted
    let err = run_backtest(&data, &cfg, &RunOptions::default()).unwrap_err();

    // THEN: it is a configuration error naming both values
    assert_eq!(
        err,
        EngineError::Config(ConfigError::StopNotBelowTarget {
            stop: 0.08,
            target: 0.04,
        })
    );
}

#[test]
fn identical_inputs_give_identical_outputs() {
    // GIVEN: two symbols, a stablecoin flood at hour 72 and a labelled whale
    // stream on BTC
    let cfg = StrategyConfig {
        high_interest_entities: vec!["Fund X".into()],
        ..short_history_cfg()
    };
    let mut bars = sawtooth("BTC", 150);
    bars.extend(sawtooth("SOL", 150));
    let mut events: Vec<WhaleEvent> = (0..150)
        .step_by(7)
        .map(|h| {
            let dir = if h % 2 == 0 {
                FlowDirection::FromExchange
            } else {
                FlowDirection::ToExchange
            };
            event("BTC", hour(h) - Duration::minutes(3), 9_000_000.0, dir, Some("Fund X"))
        })
        .collect();
    events.push(event(
        "USDT",
        hour(72) - Duration::minutes(30),
        150_000_000.0,
        FlowDirection::ToExchange,
        None,
    ));
    events.sort_by_key(|e| e.timestamp);
    let data = MarketData::from_parts(bars, events);

    // WHEN: the same run happens twice
    let a = run_backtest(&data, &cfg, &RunOptions::default()).unwrap();
    let b = run_backtest(&data, &cfg, &RunOptions::default()).unwrap();

    // THEN: the run traded, and every artifact matches bit for bit
    assert!(!a.closed_trades.is_empty());
    assert!(a.closed_trades.iter().any(|t| t.entry_time == hour(72)));
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.signals, b.signals);
    assert_eq!(a.closed_trades, b.closed_trades);
    assert_eq!(a.missed_entries, b.missed_entries);
    assert_eq!(a.equity_curve, b.equity_curve);
    assert_eq!(a.final_equity.to_bits(), b.final_equity.to_bits());
}
