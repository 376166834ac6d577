//! Volume gate: a directional signal on thin volume is not acted on.
//!
//! A BUY or SELL whose bar traded less than the mean of the trailing
//! `volume_gate_period` bars (the current bar included) becomes HOLD.
//! Only bars at or before the evaluation bar are read.

use crate::config::StrategyConfig;
use crate::domain::{PriceBar, Signal, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGate {
    enabled: bool,
    period: usize,
}

impl VolumeGate {
    pub fn from_config(cfg: &StrategyConfig) -> Self {
        Self {
            enabled: cfg.volume_gate_enabled,
            period: cfg.volume_gate_period,
        }
    }

    /// Current volume and trailing mean, or `None` while fewer than
    /// `period` finite volumes are available.
    pub fn reading(&self, bars: &[PriceBar]) -> Option<(f64, f64)> {
        if self.period == 0 {
            return None;
        }
        let current = bars.last()?.volume;
        if !current.is_finite() {
            return None;
        }
        let trailing: Vec<f64> = bars
            .iter()
            .rev()
            .map(|b| b.volume)
            .filter(|v| v.is_finite())
            .take(self.period)
            .collect();
        if trailing.len() < self.period {
            return None;
        }
        let mean = trailing.iter().sum::<f64>() / trailing.len() as f64;
        Some((current, mean))
    }

    /// Pass the signal through, or downgrade a BUY/SELL printed on thin volume.
    pub fn apply(&self, signal: &Signal, bars: &[PriceBar]) -> Signal {
        if !self.enabled || !matches!(signal.kind, SignalKind::Buy | SignalKind::Sell) {
            return signal.clone();
        }
        match self.reading(bars) {
            Some((current, mean)) if current < mean => signal.downgraded(&format!(
                "volume {current:.0} below {}-bar mean {mean:.0}",
                self.period
            )),
            _ => signal.clone(),
        }
    }
}
