//! Signal engine: indicator readings + on-chain aggregates → one [`Signal`].
//!
//! Evaluation order for one symbol in one cycle:
//! 1. Override chain (first match wins, scoring is bypassed).
//! 2. Scoring fallback: votes reduced by [`tally`] against `signal_threshold`.
//! 3. Velocity suppression: an anomalous event rate turns the result into a
//!    VOLATILITY_WARNING, remembering what it replaced.
//!
//! The engine is stateless. Everything it needs arrives in a [`SymbolView`]
//! and a [`CycleContext`].

pub mod flow;
pub mod overrides;
pub mod velocity;
pub mod votes;

pub use flow::{cycle_window, CycleContext, NetFlow};
pub use overrides::{
    default_overrides, EntityDepositRule, EntityWithdrawalRule, OverrideHit, OverrideRule,
    StablecoinInflowRule,
};
pub use velocity::VelocityReading;
pub use votes::{default_voters, tally, FlowVote, MomentumVote, Tally, TrendVote, Vote, VoteEvaluator};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::StrategyConfig;
use crate::domain::{PriceBar, Signal, SignalKind, WhaleEvent};
use crate::indicators::{Indicator, Reading, Rsi, Sma};

/// Everything the engine may look at for one symbol at one instant.
#[derive(Debug, Clone)]
pub struct SymbolView<'a> {
    pub symbol: &'a str,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub sma: Reading,
    pub rsi: Reading,
    /// This symbol's events inside the cycle window.
    pub recent_events: Vec<&'a WhaleEvent>,
    pub net_flow: NetFlow,
    pub velocity: VelocityReading,
}

impl<'a> SymbolView<'a> {
    /// Build a view from the trailing bar window and the visible event stream.
    ///
    /// `window` must end at the evaluation bar; `events` must hold no event
    /// later than that bar. Returns `None` for an empty window.
    pub fn build(
        symbol: &'a str,
        window: &[PriceBar],
        events: &'a [WhaleEvent],
        cfg: &StrategyConfig,
    ) -> Option<Self> {
        let last = window.last()?;
        let recent_events: Vec<&WhaleEvent> = cycle_window(events, last.timestamp)
            .iter()
            .filter(|e| e.is_for(symbol))
            .collect();
        let net_flow = NetFlow::from_events(recent_events.iter().copied());
        let velocity = VelocityReading::measure(
            symbol,
            events,
            last.timestamp,
            cfg.transaction_velocity_baseline_hours,
        );
        Some(Self {
            symbol,
            timestamp: last.timestamp,
            price: last.close,
            sma: Sma::new(cfg.sma_period).latest(window),
            rsi: Rsi::new(cfg.rsi_period).latest(window),
            recent_events,
            net_flow,
            velocity,
        })
    }
}

/// Ordered override chain plus vote evaluators.
pub struct SignalEngine {
    overrides: Vec<Box<dyn OverrideRule>>,
    voters: Vec<Box<dyn VoteEvaluator>>,
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new(default_overrides(), default_voters())
    }
}

impl SignalEngine {
    pub fn new(overrides: Vec<Box<dyn OverrideRule>>, voters: Vec<Box<dyn VoteEvaluator>>) -> Self {
        Self { overrides, voters }
    }

    pub fn override_names(&self) -> Vec<&str> {
        self.overrides.iter().map(|r| r.name()).collect()
    }

    /// Classify one symbol for one cycle.
    pub fn evaluate(
        &self,
        view: &SymbolView<'_>,
        cycle: &CycleContext,
        cfg: &StrategyConfig,
    ) -> Signal {
        let votes = tally(
            self.voters
                .iter()
                .map(|v| (v.name(), v.vote(view, cfg))),
        );

        let hit = self
            .overrides
            .iter()
            .find_map(|rule| rule.check(view, cycle, cfg).map(|hit| (rule.name(), hit)));

        let (kind, score, mut reason) = match hit {
            Some((rule, hit)) => {
                debug!(symbol = view.symbol, rule, kind = ?hit.kind, "override fired");
                (hit.kind, 0, hit.reason)
            }
            None => {
                let kind = votes.classify(cfg.signal_threshold);
                let reason = format!(
                    "score buy={} sell={} threshold={} [{}]",
                    votes.buy_score,
                    votes.sell_score,
                    cfg.signal_threshold,
                    votes.voters.join(", ")
                );
                (kind, votes.net(), reason)
            }
        };

        let mut final_kind = kind;
        let mut suppressed_kind = None;
        if view.velocity.is_anomalous(cfg.transaction_velocity_multiplier) {
            debug!(
                symbol = view.symbol,
                current = view.velocity.current_count,
                baseline = view.velocity.baseline_average,
                "velocity anomaly, suppressing entries"
            );
            reason = format!(
                "{reason}; velocity {} events/h vs baseline {:.2}/h",
                view.velocity.current_count, view.velocity.baseline_average
            );
            if kind.is_directional() {
                suppressed_kind = Some(kind);
            }
            final_kind = SignalKind::VolatilityWarning;
        }

        Signal {
            symbol: view.symbol.to_string(),
            timestamp: view.timestamp,
            kind: final_kind,
            score,
            buy_score: votes.buy_score,
            sell_score: votes.sell_score,
            trigger_reason: reason,
            suppressed_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CounterpartyKind, FlowDirection};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn view<'a>(symbol: &'a str, events: Vec<&'a WhaleEvent>) -> SymbolView<'a> {
        let net_flow = NetFlow::from_events(events.iter().copied());
        SymbolView {
            symbol,
            timestamp: t0(),
            price: 100.0,
            sma: Reading::Ready(100.0),
            rsi: Reading::Ready(50.0),
            recent_events: events,
            net_flow,
            velocity: VelocityReading {
                current_count: 0,
                baseline_average: 0.0,
            },
        }
    }

    fn quiet_cycle() -> CycleContext {
        CycleContext {
            timestamp: t0(),
            stablecoin_inflow_usd: 0.0,
            event_count: 0,
        }
    }

    fn whale(label: Option<&str>, dir: FlowDirection, kind: CounterpartyKind) -> WhaleEvent {
        WhaleEvent {
            symbol: "BTC".into(),
            timestamp: t0() - Duration::minutes(5),
            usd_value: 25_000_000.0,
            counterparty_kind: kind,
            entity_label: label.map(String::from),
            direction: dir,
        }
    }

    fn cfg_with_entity() -> StrategyConfig {
        StrategyConfig {
            high_interest_entities: vec!["Whale Fund".into()],
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn entity_withdrawal_buys_despite_sell_votes() {
        let cfg = cfg_with_entity();
        let ev = whale(
            Some("whale fund"),
            FlowDirection::FromExchange,
            CounterpartyKind::PrivateWallet,
        );
        let mut v = view("BTC", vec![&ev]);
        // Trend and momentum both sell.
        v.price = 90.0;
        v.rsi = Reading::Ready(85.0);

        let s = SignalEngine::default().evaluate(&v, &quiet_cycle(), &cfg);
        assert_eq!(s.kind, SignalKind::Buy);
        assert!(s.sell_score >= cfg.signal_threshold);
        assert_eq!(s.score, 0);
        assert!(s.trigger_reason.contains("withdrew"));
    }

    #[test]
    fn entity_deposit_sells() {
        let cfg = cfg_with_entity();
        let ev = whale(
            Some("Whale Fund"),
            FlowDirection::ToExchange,
            CounterpartyKind::PrivateWallet,
        );
        let s = SignalEngine::default().evaluate(&view("BTC", vec![&ev]), &quiet_cycle(), &cfg);
        assert_eq!(s.kind, SignalKind::Sell);
    }

    #[test]
    fn exchange_to_exchange_withdrawal_does_not_override() {
        let cfg = cfg_with_entity();
        let ev = whale(
            Some("Whale Fund"),
            FlowDirection::FromExchange,
            CounterpartyKind::Exchange,
        );
        let s = SignalEngine::default().evaluate(&view("BTC", vec![&ev]), &quiet_cycle(), &cfg);
        // Only the flow vote fires, below threshold.
        assert_eq!(s.kind, SignalKind::Hold);
        assert_eq!(s.buy_score, 1);
    }

    #[test]
    fn unlabeled_events_never_override() {
        let cfg = cfg_with_entity();
        let ev = whale(None, FlowDirection::ToExchange, CounterpartyKind::PrivateWallet);
        let s = SignalEngine::default().evaluate(&view("BTC", vec![&ev]), &quiet_cycle(), &cfg);
        assert_eq!(s.kind, SignalKind::Hold);
        assert_eq!(s.sell_score, 1);
    }

    #[test]
    fn stablecoin_inflow_buys_every_symbol() {
        let cfg = StrategyConfig {
            stablecoin_inflow_threshold_usd: 40_000_000.0,
            ..StrategyConfig::default()
        };
        let cycle = CycleContext {
            stablecoin_inflow_usd: 50_000_000.0,
            ..quiet_cycle()
        };
        let engine = SignalEngine::default();
        for sym in ["BTC", "ETH", "SOL"] {
            let s = engine.evaluate(&view(sym, vec![]), &cycle, &cfg);
            assert_eq!(s.kind, SignalKind::Buy, "{sym}");
        }
    }

    #[test]
    fn two_votes_buy() {
        let cfg = StrategyConfig::default();
        let mut v = view("BTC", vec![]);
        v.price = 105.0;
        v.rsi = Reading::Ready(20.0);
        let s = SignalEngine::default().evaluate(&v, &quiet_cycle(), &cfg);
        assert_eq!(s.kind, SignalKind::Buy);
        assert_eq!(s.score, 2);
    }

    #[test]
    fn price_equal_to_sma_casts_no_vote() {
        let cfg = StrategyConfig::default();
        let s = SignalEngine::default().evaluate(&view("BTC", vec![]), &quiet_cycle(), &cfg);
        assert_eq!(s.kind, SignalKind::Hold);
        assert_eq!((s.buy_score, s.sell_score), (0, 0));
    }

    #[test]
    fn insufficient_history_abstains() {
        let cfg = StrategyConfig::default();
        let mut v = view("BTC", vec![]);
        v.sma = Reading::InsufficientHistory {
            required: 20,
            available: 3,
        };
        v.rsi = Reading::InsufficientHistory {
            required: 15,
            available: 3,
        };
        v.price = 1.0;
        let s = SignalEngine::default().evaluate(&v, &quiet_cycle(), &cfg);
        assert_eq!((s.buy_score, s.sell_score), (0, 0));
    }

    #[test]
    fn velocity_anomaly_suppresses_buy() {
        let cfg = StrategyConfig {
            transaction_velocity_multiplier: 2.0,
            ..StrategyConfig::default()
        };
        let mut v = view("BTC", vec![]);
        v.price = 105.0;
        v.rsi = Reading::Ready(20.0);
        v.velocity = VelocityReading {
            current_count: 5,
            baseline_average: 1.0,
        };
        let s = SignalEngine::default().evaluate(&v, &quiet_cycle(), &cfg);
        assert_eq!(s.kind, SignalKind::VolatilityWarning);
        assert_eq!(s.suppressed_kind, Some(SignalKind::Buy));
        assert!(!s.permits_entry());
    }

    #[test]
    fn suppressed_sell_still_exits() {
        let cfg = cfg_with_entity();
        let ev = whale(
            Some("Whale Fund"),
            FlowDirection::ToExchange,
            CounterpartyKind::PrivateWallet,
        );
        let mut v = view("BTC", vec![&ev]);
        v.velocity = VelocityReading {
            current_count: 50,
            baseline_average: 1.0,
        };
        let s = SignalEngine::default().evaluate(&v, &quiet_cycle(), &cfg);
        assert_eq!(s.kind, SignalKind::VolatilityWarning);
        assert!(s.requests_exit());
    }

    #[test]
    fn build_view_from_bars_and_events() {
        let cfg = StrategyConfig::default();
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars = crate::indicators::make_bars(&closes);
        let now = bars[29].timestamp;
        let events = vec![
            WhaleEvent {
                symbol: "test".into(),
                timestamp: now - Duration::minutes(10),
                usd_value: 2_000_000.0,
                counterparty_kind: CounterpartyKind::PrivateWallet,
                entity_label: None,
                direction: FlowDirection::FromExchange,
            },
            WhaleEvent {
                symbol: "OTHER".into(),
                timestamp: now - Duration::minutes(5),
                usd_value: 9_000_000.0,
                counterparty_kind: CounterpartyKind::PrivateWallet,
                entity_label: None,
                direction: FlowDirection::ToExchange,
            },
        ];
        let v = SymbolView::build("TEST", &bars, &events, &cfg).unwrap();
        assert_eq!(v.timestamp, now);
        assert_eq!(v.price, 129.0);
        assert!(v.sma.is_ready());
        assert_eq!(v.recent_events.len(), 1);
        assert_eq!(v.net_flow.net_outflow(), 2_000_000.0);
        assert_eq!(v.velocity.current_count, 1);
    }

    #[test]
    fn custom_chain_order_is_respected() {
        let cfg = StrategyConfig {
            stablecoin_inflow_threshold_usd: 1.0,
            ..cfg_with_entity()
        };
        let ev = whale(
            Some("Whale Fund"),
            FlowDirection::ToExchange,
            CounterpartyKind::PrivateWallet,
        );
        let cycle = CycleContext {
            stablecoin_inflow_usd: 10.0,
            ..quiet_cycle()
        };
        let v = view("BTC", vec![&ev]);

        let standard = SignalEngine::default().evaluate(&v, &cycle, &cfg);
        assert_eq!(standard.kind, SignalKind::Sell);

        let stablecoin_first = SignalEngine::new(
            vec![Box::new(StablecoinInflowRule), Box::new(EntityDepositRule)],
            default_voters(),
        );
        assert_eq!(stablecoin_first.evaluate(&v, &cycle, &cfg).kind, SignalKind::Buy);
    }
}
