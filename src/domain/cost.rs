//! Turnover-based transaction cost model.

use serde::{Deserialize, Serialize};

pub const BPS_DENOMINATOR: f64 = 10_000.0;

/// Every period is fully liquidated and rebuilt: 1.0 sold plus 1.0 bought.
pub const FULL_REBALANCE_TURNOVER: f64 = 2.0;

/// Costs in basis points of traded notional, separable into buy and sell legs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostModel {
    pub buy_bps: f64,
    pub sell_bps: f64,
}

impl CostModel {
    pub fn new(buy_bps: f64, sell_bps: f64) -> Self {
        Self { buy_bps, sell_bps }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Cost as a fraction of portfolio value:
    /// (buy_notional * buy_bps + sell_notional * sell_bps) / 10 000.
    pub fn cost(&self, buy_notional: f64, sell_notional: f64) -> f64 {
        (buy_notional * self.buy_bps + sell_notional * self.sell_bps) / BPS_DENOMINATOR
    }

    /// Cost of selling everything and buying a fresh portfolio.
    pub fn full_rebalance_cost(&self) -> f64 {
        self.cost(1.0, 1.0)
    }

    pub fn net_return(&self, gross_return: f64) -> f64 {
        gross_return - self.full_rebalance_cost()
    }
}
