//! Target portfolio for one rebalance date.

use crate::domain::error::{KabuwalkError, SkipReason};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable code → weight mapping. Weights are non-negative and sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    date: NaiveDate,
    weights: BTreeMap<String, f64>,
}

impl Portfolio {
    /// Normalizes `weights` to sum to 1, dropping zero entries.
    ///
    /// Negative or non-finite weights are a selector bug and rejected as
    /// invalid configuration; an empty result is an `EmptyPortfolio` skip.
    pub fn new(date: NaiveDate, weights: BTreeMap<String, f64>) -> Result<Self, KabuwalkError> {
        if let Some((code, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(KabuwalkError::ConfigInvalid {
                section: "portfolio".into(),
                key: code.clone(),
                reason: format!("weight must be finite and non-negative, got {w}"),
            });
        }
        let weights: BTreeMap<String, f64> = weights.into_iter().filter(|(_, w)| *w > 0.0).collect();
        let total: f64 = weights.values().sum();
        if weights.is_empty() || total <= 0.0 {
            return Err(SkipReason::EmptyPortfolio { date }.into());
        }
        let weights = weights.into_iter().map(|(c, w)| (c, w / total)).collect();
        Ok(Self { date, weights })
    }

    pub fn equal_weight<I, S>(date: NaiveDate, codes: I) -> Result<Self, KabuwalkError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(date, codes.into_iter().map(|c| (c.into(), 1.0)).collect())
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn weight(&self, code: &str) -> Option<f64> {
        self.weights.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Drop-and-renormalize over the codes accepted by `keep`.
    ///
    /// Returns the rescaled weights and the kept share of the original weight
    /// (`coverage`). When nothing is kept the map is empty and coverage is 0.
    pub fn renormalized<F>(&self, keep: F) -> (BTreeMap<String, f64>, f64)
    where
        F: Fn(&str) -> bool,
    {
        let kept: BTreeMap<String, f64> = self
            .weights
            .iter()
            .filter(|(c, _)| keep(c))
            .map(|(c, w)| (c.clone(), *w))
            .collect();
        let coverage: f64 = kept.values().sum();
        if coverage <= 0.0 {
            return (BTreeMap::new(), 0.0);
        }
        let rescaled = kept.into_iter().map(|(c, w)| (c, w / coverage)).collect();
        (rescaled, coverage)
    }
}
