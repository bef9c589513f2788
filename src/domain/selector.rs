//! Default score-ranking portfolio selector.

use crate::domain::error::{KabuwalkError, SkipReason};
use crate::domain::features::{FeatureTable, RSI_COLUMN};
use crate::domain::params::StrategyParams;
use crate::domain::portfolio::Portfolio;
use crate::ports::selector_port::PortfolioSelector;
use std::collections::BTreeMap;

/// Ranks securities by a weighted sum of cross-sectional feature z-scores
/// plus the entry-timing score, and holds the top N in equal weight.
///
/// A security needs at least one weighted feature value to be ranked.
#[derive(Debug, Clone, Default)]
pub struct ScoreSelector;

impl ScoreSelector {
    pub fn composite_scores(table: &FeatureTable, params: &StrategyParams) -> Vec<(String, f64)> {
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();

        for (feature, weight) in params.weights.iter().filter(|(_, w)| **w != 0.0) {
            for (code, z) in z_scores(&table.column(feature)) {
                *totals.entry(code).or_insert(0.0) += weight * z;
            }
        }

        if let Some(timing) = &params.entry_timing {
            for (code, total) in totals.iter_mut() {
                if let Some(rsi) = table.get(code).and_then(|r| r.value(RSI_COLUMN)) {
                    *total += timing.weight * timing.score(rsi);
                }
            }
        }

        let mut ranked: Vec<(String, f64)> = totals
            .into_iter()
            .filter(|(_, s)| s.is_finite())
            .map(|(c, s)| (c.to_string(), s))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

impl PortfolioSelector for ScoreSelector {
    fn select(
        &self,
        table: &FeatureTable,
        params: &StrategyParams,
    ) -> Result<Portfolio, KabuwalkError> {
        let ranked = Self::composite_scores(table, params);
        if ranked.is_empty() || params.top_n == 0 {
            return Err(SkipReason::EmptyPortfolio { date: table.as_of }.into());
        }
        Portfolio::equal_weight(
            table.as_of,
            ranked.into_iter().take(params.top_n).map(|(code, _)| code),
        )
    }
}

fn z_scores<'a>(values: &[(&'a str, f64)]) -> Vec<(&'a str, f64)> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|(_, v)| v).sum::<f64>() / n;
    let var = values.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    values
        .iter()
        .map(|(c, v)| (*c, if std > 0.0 { (v - mean) / std } else { 0.0 }))
        .collect()
}
