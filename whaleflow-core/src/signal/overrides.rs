//! Override rules: on-chain events that bypass scoring.
//!
//! Rules are evaluated in order and the first match wins.

use super::{CycleContext, SymbolView};
use crate::config::StrategyConfig;
use crate::domain::{CounterpartyKind, FlowDirection, SignalKind};

/// Outcome of a matching override.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideHit {
    pub kind: SignalKind,
    pub reason: String,
}

/// Trait for override rules.
pub trait OverrideRule: Send + Sync {
    fn name(&self) -> &str;

    /// `Some` when the rule fires for this symbol in this cycle.
    fn check(
        &self,
        view: &SymbolView<'_>,
        cycle: &CycleContext,
        cfg: &StrategyConfig,
    ) -> Option<OverrideHit>;
}

/// A watched entity moving funds into an exchange: likely distribution.
pub struct EntityDepositRule;

impl OverrideRule for EntityDepositRule {
    fn name(&self) -> &str {
        "entity_deposit"
    }

    fn check(
        &self,
        view: &SymbolView<'_>,
        _cycle: &CycleContext,
        cfg: &StrategyConfig,
    ) -> Option<OverrideHit> {
        view.recent_events
            .iter()
            .find(|e| {
                e.direction == FlowDirection::ToExchange
                    && e.is_labeled_as_any(&cfg.high_interest_entities)
            })
            .map(|e| OverrideHit {
                kind: SignalKind::Sell,
                reason: format!(
                    "override: {} deposited ${:.0} to exchange",
                    e.entity_label.as_deref().unwrap_or("entity"),
                    e.usd_value
                ),
            })
    }
}

/// A watched entity withdrawing from an exchange into its own custody.
pub struct EntityWithdrawalRule;

impl OverrideRule for EntityWithdrawalRule {
    fn name(&self) -> &str {
        "entity_withdrawal"
    }

    fn check(
        &self,
        view: &SymbolView<'_>,
        _cycle: &CycleContext,
        cfg: &StrategyConfig,
    ) -> Option<OverrideHit> {
        view.recent_events
            .iter()
            .find(|e| {
                e.direction == FlowDirection::FromExchange
                    && e.counterparty_kind != CounterpartyKind::Exchange
                    && e.is_labeled_as_any(&cfg.high_interest_entities)
            })
            .map(|e| OverrideHit {
                kind: SignalKind::Buy,
                reason: format!(
                    "override: {} withdrew ${:.0} from exchange",
                    e.entity_label.as_deref().unwrap_or("entity"),
                    e.usd_value
                ),
            })
    }
}

/// Stablecoins flooding into exchanges: buying power about to land on every book.
pub struct StablecoinInflowRule;

impl OverrideRule for StablecoinInflowRule {
    fn name(&self) -> &str {
        "stablecoin_inflow"
    }

    fn check(
        &self,
        _view: &SymbolView<'_>,
        cycle: &CycleContext,
        cfg: &StrategyConfig,
    ) -> Option<OverrideHit> {
        (cycle.stablecoin_inflow_usd > cfg.stablecoin_inflow_threshold_usd).then(|| OverrideHit {
            kind: SignalKind::Buy,
            reason: format!(
                "override: stablecoin inflow ${:.0} > ${:.0}",
                cycle.stablecoin_inflow_usd, cfg.stablecoin_inflow_threshold_usd
            ),
        })
    }
}

/// The standard ordered chain: deposit, withdrawal, stablecoin inflow.
pub fn default_overrides() -> Vec<Box<dyn OverrideRule>> {
    vec![
        Box::new(EntityDepositRule),
        Box::new(EntityWithdrawalRule),
        Box::new(StablecoinInflowRule),
    ]
}
