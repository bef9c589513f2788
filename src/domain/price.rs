//! Daily price, benchmark and fundamentals records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One daily price record for a security.
///
/// `adjustment_factor` is the split ratio effective on `date`; `1.0` means no
/// event. A 2:1 split is recorded as `0.5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub code: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub adjustment_factor: f64,
}

impl PricePoint {
    /// Open price, falling back to close when open is absent or unusable.
    pub fn entry_price(&self) -> Option<f64> {
        self.open.filter(|p| is_usable(*p)).or_else(|| self.exit_price())
    }

    pub fn exit_price(&self) -> Option<f64> {
        self.close.filter(|p| is_usable(*p))
    }

    pub fn has_split_event(&self) -> bool {
        (self.adjustment_factor - 1.0).abs() > f64::EPSILON
    }
}

/// One daily benchmark (index) record. Benchmark dates define the trading
/// calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
}

impl BenchmarkBar {
    pub fn entry_price(&self) -> Option<f64> {
        self.open.filter(|p| is_usable(*p)).or_else(|| self.exit_price())
    }

    pub fn exit_price(&self) -> Option<f64> {
        self.close.filter(|p| is_usable(*p))
    }
}

/// Latest disclosed fundamentals for a security as of some date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsSnapshot {
    pub code: String,
    pub disclosed: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

fn is_usable(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Product of `1 / adjustment_factor` over events strictly after `entry` and
/// up to and including `exit`.
///
/// Returns `None` if any factor in the window is non-positive or non-finite.
pub fn split_multiplier(points: &[PricePoint], entry: NaiveDate, exit: NaiveDate) -> Option<f64> {
    let mut multiplier = 1.0;
    for point in points.iter().filter(|p| p.date > entry && p.date <= exit) {
        let factor = point.adjustment_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return None;
        }
        if point.has_split_event() {
            multiplier *= 1.0 / factor;
        }
    }
    Some(multiplier)
}
