//! Portfolio selection port.

use crate::domain::error::KabuwalkError;
use crate::domain::features::FeatureTable;
use crate::domain::params::StrategyParams;
use crate::domain::portfolio::Portfolio;

/// Pure function from a feature table and strategy parameters to a portfolio.
pub trait PortfolioSelector: Send + Sync {
    fn select(
        &self,
        table: &FeatureTable,
        params: &StrategyParams,
    ) -> Result<Portfolio, KabuwalkError>;
}
