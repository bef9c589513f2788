//! Feature builder port.

use crate::domain::error::KabuwalkError;
use crate::domain::features::FeatureTable;
use chrono::NaiveDate;

/// Builds the per-security scoring table for a valuation date.
///
/// Only information available on or before `as_of` may be used. A date with
/// no data should be reported as `SkipReason::FeaturesUnavailable`.
pub trait FeatureBuilder: Send + Sync {
    fn build_features(&self, as_of: NaiveDate) -> Result<FeatureTable, KabuwalkError>;
}
