//! Seeded synthetic market: hourly random-walk bars plus a whale stream.
//!
//! Same config and seed → byte-identical data. Used by demos, tests and the
//! `synth` command.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use whaleflow_core::domain::{CounterpartyKind, FlowDirection, PriceBar, WhaleEvent};
use whaleflow_core::MarketData;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub symbols: Vec<String>,
    pub bars_per_symbol: usize,
    pub seed: u64,
    pub start: DateTime<Utc>,
    pub interval_minutes: i64,
    pub start_price: f64,
    /// Per-bar return drawn uniformly from `drift ± volatility`.
    pub volatility: f64,
    pub drift: f64,
    /// Chance that a given symbol sees a whale transfer in a given bar.
    pub whale_probability: f64,
    /// Chance per bar of a stablecoin exchange deposit.
    pub stablecoin_probability: f64,
    pub stablecoin: String,
    /// Labels attached to a fraction of whale transfers.
    pub entities: Vec<String>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC".into(), "ETH".into(), "SOL".into()],
            bars_per_symbol: 1_000,
            seed: 42,
            start: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            interval_minutes: 60,
            start_price: 100.0,
            volatility: 0.012,
            drift: 0.0002,
            whale_probability: 0.15,
            stablecoin_probability: 0.05,
            stablecoin: "USDT".into(),
            entities: vec!["Jump Trading".into(), "Wintermute".into()],
        }
    }
}

/// Generate a complete market. Bars are strictly increasing per symbol and
/// whale events are non-decreasing.
pub fn synthetic_market(cfg: &SyntheticConfig) -> MarketData {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let step = Duration::minutes(cfg.interval_minutes.max(1));

    let mut prices: Vec<f64> = cfg.symbols.iter().map(|_| cfg.start_price).collect();
    let mut bars = Vec::with_capacity(cfg.symbols.len() * cfg.bars_per_symbol);
    let mut events = Vec::new();

    for i in 0..cfg.bars_per_symbol {
        let ts = cfg.start + step * i as i32;

        // Whale events land strictly inside the interval before this bar.
        if i > 0 {
            if rng.gen_bool(cfg.stablecoin_probability.clamp(0.0, 1.0)) {
                events.push(WhaleEvent {
                    symbol: cfg.stablecoin.clone(),
                    timestamp: ts - step / 2,
                    usd_value: rng.gen_range(5.0e6..1.5e8),
                    counterparty_kind: CounterpartyKind::PrivateWallet,
                    entity_label: None,
                    direction: FlowDirection::ToExchange,
                });
            }
            for sym in &cfg.symbols {
                if !rng.gen_bool(cfg.whale_probability.clamp(0.0, 1.0)) {
                    continue;
                }
                events.push(random_transfer(&mut rng, sym, ts - step / 3, &cfg.entities));
            }
        }

        for (s, sym) in cfg.symbols.iter().enumerate() {
            let open = prices[s];
            let ret = cfg.drift + rng.gen_range(-1.0..=1.0) * cfg.volatility;
            let close = (open * (1.0 + ret)).max(0.01);
            let wick = open.max(close) * rng.gen_range(0.0..cfg.volatility.max(1e-6));
            let tail = open.min(close) * rng.gen_range(0.0..cfg.volatility.max(1e-6));
            bars.push(PriceBar {
                symbol: sym.clone(),
                timestamp: ts,
                open,
                high: open.max(close) + wick,
                low: (open.min(close) - tail).max(0.001),
                close,
                volume: rng.gen_range(100.0..10_000.0),
            });
            prices[s] = close;
        }
    }

    MarketData::from_parts(bars, events)
}

fn random_transfer(rng: &mut StdRng, symbol: &str, at: DateTime<Utc>, entities: &[String]) -> WhaleEvent {
    let direction = match rng.gen_range(0..3) {
        0 => FlowDirection::ToExchange,
        1 => FlowDirection::FromExchange,
        _ => FlowDirection::Transfer,
    };
    let labelled = !entities.is_empty() && rng.gen_bool(0.1);
    let entity_label = labelled.then(|| entities[rng.gen_range(0..entities.len())].clone());
    let counterparty_kind = if labelled {
        CounterpartyKind::KnownEntity
    } else if rng.gen_bool(0.2) {
        CounterpartyKind::Exchange
    } else {
        CounterpartyKind::PrivateWallet
    };
    WhaleEvent {
        symbol: symbol.to_string(),
        timestamp: at,
        usd_value: rng.gen_range(1.0e6..5.0e7),
        counterparty_kind,
        entity_label,
        direction,
    }
}
