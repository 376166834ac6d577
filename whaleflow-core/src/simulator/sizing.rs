//! Fill prices, position sizing and Kelly scaling.

use serde::{Deserialize, Serialize};

use crate::config::KellyConfig;

/// Buy-side fill: pay `bps` basis points above `price`.
pub fn entry_fill(price: f64, slippage_bps: f64) -> f64 {
    price * (1.0 + slippage_bps / 10_000.0)
}

/// Sell-side fill: receive `bps` basis points below `level`.
pub fn exit_fill(level: f64, slippage_bps: f64) -> f64 {
    level * (1.0 - slippage_bps / 10_000.0)
}

/// Quantity for a long entry.
///
/// Risk-based size `equity * risk_fraction / (fill * stop_pct)`, capped so the
/// notional at `fill` never exceeds `risk_fraction * equity`. For any stop
/// inside `(0, 1)`, which validation enforces, the risk size is the larger
/// of the two and the notional cap decides the quantity. Returns 0 for any
/// degenerate input.
pub fn position_size(equity: f64, fill: f64, risk_fraction: f64, stop_pct: f64) -> f64 {
    if !(equity > 0.0 && fill > 0.0 && risk_fraction > 0.0 && stop_pct > 0.0) {
        return 0.0;
    }
    let budget = equity * risk_fraction;
    let by_risk = budget / (fill * stop_pct);
    let by_notional = budget / fill;
    let qty = by_risk.min(by_notional);
    if qty.is_finite() {
        qty
    } else {
        0.0
    }
}

/// Running win/loss statistics feeding half-Kelly scaling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KellyTracker {
    trades: usize,
    wins: usize,
    total_win: f64,
    /// Sum of losing (and break-even) PnLs; non-positive.
    total_loss: f64,
}

impl KellyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, net_pnl: f64) {
        self.trades += 1;
        if net_pnl > 0.0 {
            self.wins += 1;
            self.total_win += net_pnl;
        } else {
            self.total_loss += net_pnl;
        }
    }

    pub fn trades(&self) -> usize {
        self.trades
    }

    /// Clamped half-Kelly fraction, or `None` while there is not enough
    /// history (too few trades, or no wins or no losses yet).
    pub fn fraction(&self, cfg: &KellyConfig) -> Option<f64> {
        let losses = self.trades - self.wins;
        if self.trades < cfg.min_trades || self.wins == 0 || losses == 0 {
            return None;
        }
        let avg_win = self.total_win / self.wins as f64;
        let avg_loss = (self.total_loss / losses as f64).abs();
        if avg_loss <= 0.0 {
            return None;
        }
        let w = self.wins as f64 / self.trades as f64;
        let ratio = avg_win / avg_loss;
        let kelly = 0.5 * (w - (1.0 - w) / ratio);
        Some(kelly.clamp(0.0, cfg.max_fraction))
    }

    /// Multiplier in `[0, 1]` applied to the base risk fraction.
    pub fn scale(&self, cfg: &KellyConfig) -> f64 {
        match self.fraction(cfg) {
            Some(f) if cfg.max_fraction > 0.0 => f / cfg.max_fraction,
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_move_against_trader() {
        assert!((entry_fill(100.0, 5.0) - 100.05).abs() < 1e-12);
        assert!((exit_fill(100.0, 5.0) - 99.95).abs() < 1e-12);
        assert_eq!(entry_fill(100.0, 0.0), 100.0);
    }

    #[test]
    fn size_capped_by_notional() {
        // Risk-based: 10_000 * 0.01 / (100 * 0.02) = 50 units ($5000 notional).
        // Cap: $100 of notional → 1 unit.
        let q = position_size(10_000.0, 100.0, 0.01, 0.02);
        assert!((q - 1.0).abs() < 1e-12);
    }

    #[test]
    fn notional_cap_binds_for_every_valid_stop() {
        let budget = 10_000.0 * 0.02;
        for stop in [0.001, 0.02, 0.25, 0.5, 0.999] {
            let q = position_size(10_000.0, 250.0, 0.02, stop);
            assert!((q * 250.0 - budget).abs() < 1e-9, "stop {stop}: notional {}", q * 250.0);
        }
    }

    #[test]
    fn size_zero_for_degenerate_inputs() {
        assert_eq!(position_size(0.0, 100.0, 0.01, 0.02), 0.0);
        assert_eq!(position_size(1000.0, 100.0, 0.0, 0.02), 0.0);
        assert_eq!(position_size(1000.0, f64::NAN, 0.01, 0.02), 0.0);
    }

    #[test]
    fn kelly_needs_history() {
        let cfg = KellyConfig::default();
        let mut k = KellyTracker::new();
        for _ in 0..9 {
            k.record(10.0);
        }
        k.record(-5.0);
        assert_eq!(k.trades(), 10);
        // 10 trades: w = 0.9, R = 10/5 = 2 → 0.5 * (0.9 - 0.05) = 0.425 → clamp 0.25
        assert_eq!(k.fraction(&cfg), Some(0.25));
        assert_eq!(k.scale(&cfg), 1.0);
    }

    #[test]
    fn kelly_without_losses_is_neutral() {
        let cfg = KellyConfig::default();
        let mut k = KellyTracker::new();
        for _ in 0..20 {
            k.record(1.0);
        }
        assert_eq!(k.fraction(&cfg), None);
        assert_eq!(k.scale(&cfg), 1.0);
    }

    #[test]
    fn kelly_scales_down_weak_edge() {
        let cfg = KellyConfig::default();
        let mut k = KellyTracker::new();
        // w = 0.5, R = 1.5 → 0.5 * (0.5 - 0.5/1.5) = 1/12
        for _ in 0..5 {
            k.record(15.0);
            k.record(-10.0);
        }
        let f = k.fraction(&cfg).unwrap();
        assert!((f - 1.0 / 12.0).abs() < 1e-12);
        assert!((k.scale(&cfg) - (1.0 / 12.0) / 0.25).abs() < 1e-12);
    }

    #[test]
    fn kelly_negative_edge_scales_to_zero() {
        let cfg = KellyConfig::default();
        let mut k = KellyTracker::new();
        for _ in 0..3 {
            k.record(5.0);
        }
        for _ in 0..7 {
            k.record(-10.0);
        }
        assert_eq!(k.fraction(&cfg), Some(0.0));
        assert_eq!(k.scale(&cfg), 0.0);
    }
}
