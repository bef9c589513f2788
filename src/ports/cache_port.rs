//! Persisted feature-cache port.

use crate::domain::error::KabuwalkError;
use crate::domain::feature_cache::{CacheKey, DateSnapshot};
use chrono::NaiveDate;

/// Append-only store of per-date snapshots keyed by date range and version.
pub trait CacheStore: Send + Sync {
    /// Snapshots for any of `dates` found in entries of `version`, whatever
    /// the range those entries were written under.
    fn load(&self, version: &str, dates: &[NaiveDate]) -> Result<Vec<DateSnapshot>, KabuwalkError>;

    /// Persists a new entry. Existing entries are never rewritten.
    fn append(&self, key: &CacheKey, snapshots: &[DateSnapshot]) -> Result<(), KabuwalkError>;
}
