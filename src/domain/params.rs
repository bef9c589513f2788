//! Strategy parameters proposed by the search and consumed by the selector.

use crate::domain::error::SkipReason;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Slack on the minimum separation so a `max` sampled exactly at
/// `base ± min_width` is not rejected by rounding.
const WIDTH_TOLERANCE: f64 = 1e-9;

/// Direction implied by the entry-timing thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Buy strength: the timing score rises as the oscillator climbs from
    /// `base` towards `max` (`max > base`).
    Momentum,
    /// Buy weakness: the score rises as the oscillator falls from `base`
    /// towards `max` (`max < base`).
    Reversal,
}

impl Direction {
    /// Direction implied by `max - base`, or `AmbiguousDirection` when the
    /// separation is narrower than `min_width`.
    pub fn from_thresholds(base: f64, max: f64, min_width: f64) -> Result<Self, SkipReason> {
        let width = max - base;
        if !width.is_finite() || width.abs() < min_width - WIDTH_TOLERANCE || width == 0.0 {
            return Err(SkipReason::AmbiguousDirection {
                base,
                max,
                min_width,
            });
        }
        Ok(if width > 0.0 {
            Direction::Momentum
        } else {
            Direction::Reversal
        })
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Momentum => write!(f, "momentum"),
            Direction::Reversal => write!(f, "reversal"),
        }
    }
}

/// Oscillator-based entry-timing component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryTiming {
    pub direction: Direction,
    pub base: f64,
    pub max: f64,
    pub weight: f64,
}

impl EntryTiming {
    /// Score in `[0, 1]`: 0 at or beyond `base` on the wrong side, 1 at or
    /// beyond `max`.
    pub fn score(&self, oscillator: f64) -> f64 {
        let span = self.max - self.base;
        if span == 0.0 || !oscillator.is_finite() {
            return 0.0;
        }
        ((oscillator - self.base) / span).clamp(0.0, 1.0)
    }

    /// Checks the declared direction against the one the thresholds imply.
    pub fn validate(&self, min_width: f64) -> Result<(), SkipReason> {
        let implied = Direction::from_thresholds(self.base, self.max, min_width)?;
        if implied != self.direction {
            return Err(SkipReason::AmbiguousDirection {
                base: self.base,
                max: self.max,
                min_width,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Feature column → signed weight on its cross-sectional z-score.
    pub weights: BTreeMap<String, f64>,
    pub top_n: usize,
    pub entry_timing: Option<EntryTiming>,
}

impl StrategyParams {
    pub fn direction(&self) -> Option<Direction> {
        self.entry_timing.as_ref().map(|t| t.direction)
    }
}
