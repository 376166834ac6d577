//! Trailing-stop ratchet for long positions.
//!
//! **Core Rule:** the trailing level may rise, never fall.

use serde::{Deserialize, Serialize};

/// Ratchet state for one position's trailing stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrailingRatchet {
    level: Option<f64>,
}

impl TrailingRatchet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a new level. Returns the ratcheted level.
    ///
    /// The first offer initializes the ratchet; later offers only take
    /// effect when they tighten (are higher). NaN offers are ignored.
    pub fn apply(&mut self, proposed: f64) -> Option<f64> {
        if proposed.is_nan() {
            return self.level;
        }
        let next = match self.level {
            None => proposed,
            Some(current) => current.max(proposed),
        };
        self.level = Some(next);
        self.level
    }

    pub fn level(&self) -> Option<f64> {
        self.level
    }

    pub fn is_active(&self) -> bool {
        self.level.is_some()
    }
}

/// Trailing level proposed for a long once its gain from `entry` to `peak`
/// reaches `activation`. `None` before activation.
pub fn trailing_candidate(entry: f64, peak: f64, activation: f64, distance: f64) -> Option<f64> {
    if entry <= 0.0 {
        return None;
    }
    ((peak - entry) / entry >= activation).then(|| peak * (1.0 - distance))
}
