//! Scoring fallback: independent factors each cast at most one vote.

use serde::{Deserialize, Serialize};

use super::SymbolView;
use crate::config::StrategyConfig;
use crate::domain::SignalKind;

/// A single factor's opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    Buy,
    Sell,
    Abstain,
}

/// Trait for vote evaluators.
///
/// An evaluator whose input is missing (insufficient history, no events)
/// abstains. It never guesses.
pub trait VoteEvaluator: Send + Sync {
    fn name(&self) -> &str;

    fn vote(&self, view: &SymbolView<'_>, cfg: &StrategyConfig) -> Vote;
}

/// Price above SMA buys, below sells.
pub struct TrendVote;

impl VoteEvaluator for TrendVote {
    fn name(&self) -> &str {
        "trend"
    }

    fn vote(&self, view: &SymbolView<'_>, _cfg: &StrategyConfig) -> Vote {
        match view.sma.value() {
            Some(sma) if view.price > sma => Vote::Buy,
            Some(sma) if view.price < sma => Vote::Sell,
            _ => Vote::Abstain,
        }
    }
}

/// Oversold RSI buys, overbought sells.
pub struct MomentumVote;

impl VoteEvaluator for MomentumVote {
    fn name(&self) -> &str {
        "momentum"
    }

    fn vote(&self, view: &SymbolView<'_>, cfg: &StrategyConfig) -> Vote {
        match view.rsi.value() {
            Some(rsi) if rsi < cfg.rsi_oversold_threshold => Vote::Buy,
            Some(rsi) if rsi > cfg.rsi_overbought_threshold => Vote::Sell,
            _ => Vote::Abstain,
        }
    }
}

/// Net exchange outflow buys, net inflow sells.
pub struct FlowVote;

impl VoteEvaluator for FlowVote {
    fn name(&self) -> &str {
        "flow"
    }

    fn vote(&self, view: &SymbolView<'_>, _cfg: &StrategyConfig) -> Vote {
        let net = view.net_flow.net_outflow();
        if net > 0.0 {
            Vote::Buy
        } else if net < 0.0 {
            Vote::Sell
        } else {
            Vote::Abstain
        }
    }
}

/// The three standard factors: trend, momentum, flow.
pub fn default_voters() -> Vec<Box<dyn VoteEvaluator>> {
    vec![Box::new(TrendVote), Box::new(MomentumVote), Box::new(FlowVote)]
}

/// Reduced vote counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub buy_score: u32,
    pub sell_score: u32,
    /// `name:vote` for every non-abstaining factor, in evaluation order.
    pub voters: Vec<String>,
}

impl Tally {
    /// Classify against a threshold. Both sides reaching it is a tie → HOLD.
    pub fn classify(&self, threshold: u32) -> SignalKind {
        let buy = self.buy_score >= threshold;
        let sell = self.sell_score >= threshold;
        match (buy, sell) {
            (true, false) => SignalKind::Buy,
            (false, true) => SignalKind::Sell,
            _ => SignalKind::Hold,
        }
    }

    pub fn net(&self) -> i32 {
        self.buy_score as i32 - self.sell_score as i32
    }
}

/// Count named votes.
pub fn tally<'a>(votes: impl IntoIterator<Item = (&'a str, Vote)>) -> Tally {
    let mut t = Tally::default();
    for (name, vote) in votes {
        match vote {
            Vote::Buy => {
                t.buy_score += 1;
                t.voters.push(format!("{name}:buy"));
            }
            Vote::Sell => {
                t.sell_score += 1;
                t.voters.push(format!("{name}:sell"));
            }
            Vote::Abstain => {}
        }
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_and_names() {
        let t = tally([
            ("trend", Vote::Buy),
            ("momentum", Vote::Abstain),
            ("flow", Vote::Buy),
        ]);
        assert_eq!(t.buy_score, 2);
        assert_eq!(t.sell_score, 0);
        assert_eq!(t.voters, vec!["trend:buy", "flow:buy"]);
        assert_eq!(t.net(), 2);
        assert_eq!(t.classify(2), SignalKind::Buy);
        assert_eq!(t.classify(3), SignalKind::Hold);
    }

    #[test]
    fn sell_reaches_threshold() {
        let t = tally([("trend", Vote::Sell), ("flow", Vote::Sell)]);
        assert_eq!(t.classify(2), SignalKind::Sell);
        assert_eq!(t.net(), -2);
    }

    #[test]
    fn both_sides_at_threshold_is_hold() {
        let t = tally([("a", Vote::Buy), ("b", Vote::Sell)]);
        assert_eq!(t.classify(1), SignalKind::Hold);
    }

    #[test]
    fn empty_tally_is_hold() {
        assert_eq!(tally(Vec::<(&str, Vote)>::new()).classify(1), SignalKind::Hold);
    }
}
