//! Price and fundamentals store port.

use crate::domain::error::KabuwalkError;
use crate::domain::price::{BenchmarkBar, FundamentalsSnapshot, PricePoint};
use chrono::NaiveDate;

/// Read-only access to daily prices, the benchmark and fundamentals.
///
/// Implementations are shared across worker threads during a search and must
/// not mutate state on read.
pub trait PriceStore: Send + Sync {
    /// Price points for `code` with `start <= date <= end`, ascending by date.
    fn get_prices(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, KabuwalkError>;

    /// Latest fundamentals disclosed on or before `as_of`.
    fn get_fundamentals(
        &self,
        code: &str,
        as_of: NaiveDate,
    ) -> Result<Option<FundamentalsSnapshot>, KabuwalkError>;

    /// Benchmark bars with `start <= date <= end`, ascending by date.
    fn benchmark_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<BenchmarkBar>, KabuwalkError>;

    fn list_codes(&self) -> Result<Vec<String>, KabuwalkError>;

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, KabuwalkError>;

    fn get_benchmark(&self, date: NaiveDate) -> Result<Option<BenchmarkBar>, KabuwalkError> {
        Ok(self.benchmark_range(date, date)?.into_iter().next())
    }
}
