//! Downside-penalized aggregate objective over per-period excess returns.

use crate::domain::metrics::{mean, median, quantile, trimmed_mean};
use serde::{Deserialize, Serialize};

/// Score given to a candidate with no evaluable periods.
pub const NO_EVALUABLE_PERIODS_SCORE: f64 = -1.0e9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Aggregate {
    Mean,
    Median,
    TrimmedMean { proportion: f64 },
}

impl Aggregate {
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregate::Mean => mean(values),
            Aggregate::Median => median(values),
            Aggregate::TrimmedMean { proportion } => trimmed_mean(values, *proportion),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveConfig {
    pub aggregate: Aggregate,
    /// Penalty weight λ on the lower tail.
    pub downside_lambda: f64,
    /// Lower-tail quantile Q, 0.10 for P10.
    pub tail_quantile: f64,
    /// Below this many periods the tail is the sample minimum.
    pub min_tail_samples: usize,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            aggregate: Aggregate::Mean,
            downside_lambda: 1.0,
            tail_quantile: 0.10,
            min_tail_samples: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObjectiveScore {
    pub score: f64,
    pub aggregate: f64,
    pub tail: f64,
    pub penalty: f64,
    pub periods: usize,
}

impl ObjectiveScore {
    pub fn no_evaluable_periods() -> Self {
        Self {
            score: NO_EVALUABLE_PERIODS_SCORE,
            aggregate: 0.0,
            tail: 0.0,
            penalty: 0.0,
            periods: 0,
        }
    }

    pub fn is_evaluable(&self) -> bool {
        self.periods > 0
    }
}

impl ObjectiveConfig {
    /// Lower-tail estimate: the configured quantile, or the sample minimum
    /// when there are fewer than `min_tail_samples` finite values.
    pub fn tail(&self, values: &[f64]) -> Option<f64> {
        let finite = values.iter().filter(|v| v.is_finite()).count();
        if finite < self.min_tail_samples {
            quantile(values, 0.0)
        } else {
            quantile(values, self.tail_quantile)
        }
    }

    /// `aggregate − λ · max(0, −tail)`.
    /// Non-finite values are dropped before either statistic is taken.
    pub fn score(&self, excess: &[f64]) -> ObjectiveScore {
        let finite: Vec<f64> = excess.iter().copied().filter(|v| v.is_finite()).collect();
        let periods = finite.len();
        let (Some(aggregate), Some(tail)) = (self.aggregate.apply(&finite), self.tail(&finite))
        else {
            return ObjectiveScore::no_evaluable_periods();
        };
        let penalty = self.downside_lambda * (-tail).max(0.0);
        ObjectiveScore {
            score: aggregate - penalty,
            aggregate,
            tail,
            penalty,
            periods,
        }
    }
}
