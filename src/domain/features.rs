//! Per-security feature table for one valuation date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved column holding the entry-timing oscillator.
pub const RSI_COLUMN: &str = "rsi";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub code: String,
    pub values: BTreeMap<String, f64>,
}

impl FeatureRow {
    /// Finite value of `column`, if present.
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub as_of: NaiveDate,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Rows are kept sorted by code; duplicate codes keep the first row.
    pub fn new(as_of: NaiveDate, mut rows: Vec<FeatureRow>) -> Self {
        rows.sort_by(|a, b| a.code.cmp(&b.code));
        rows.dedup_by(|a, b| a.code == b.code);
        Self { as_of, rows }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(|r| r.code.as_str())
    }

    pub fn get(&self, code: &str) -> Option<&FeatureRow> {
        self.rows
            .binary_search_by(|r| r.code.as_str().cmp(code))
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Finite values of `column`, in code order.
    pub fn column(&self, column: &str) -> Vec<(&str, f64)> {
        self.rows
            .iter()
            .filter_map(|r| r.value(column).map(|v| (r.code.as_str(), v)))
            .collect()
    }

    /// Sets `column` on every row with an entry in `values`.
    pub fn set_column(&mut self, column: &str, values: &BTreeMap<String, f64>) {
        for row in &mut self.rows {
            if let Some(v) = values.get(&row.code) {
                row.values.insert(column.to_string(), *v);
            }
        }
    }
}
