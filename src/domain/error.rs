//! Domain error types.
//!
//! Two tiers: [`SkipReason`] covers data-level problems that are recovered
//! locally (a period, date or candidate is skipped and counted), while the
//! remaining [`KabuwalkError`] variants are structural and terminate a run.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Why a period, date or candidate was skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("no trading day found after rebalance date {rebalance_date}")]
    NoExecutionDate { rebalance_date: NaiveDate },

    #[error("exit target {target} snapped to {snapped:?}, beyond {tolerance_days} day tolerance")]
    SnapTooLarge {
        target: NaiveDate,
        snapped: Option<NaiveDate>,
        tolerance_days: i64,
    },

    #[error("exit {exit} is not after entry {entry}")]
    EmptyHoldingWindow { entry: NaiveDate, exit: NaiveDate },

    #[error("missing price data for {code}")]
    MissingPriceData { code: String },

    #[error("missing benchmark price between {entry} and {exit}")]
    MissingBenchmark { entry: NaiveDate, exit: NaiveDate },

    #[error("selector returned no securities for {date}")]
    EmptyPortfolio { date: NaiveDate },

    #[error("no security in the {date} portfolio had usable prices")]
    NoUsableSecurities { date: NaiveDate },

    #[error("features unavailable for {date}")]
    FeaturesUnavailable { date: NaiveDate },

    #[error("ambiguous direction: base {base:.2}, max {max:.2}, minimum width {min_width:.2}")]
    AmbiguousDirection { base: f64, max: f64, min_width: f64 },

    #[error("candidate has no evaluable periods")]
    NoEvaluablePeriods,
}

impl SkipReason {
    /// Stable identifier used as a counter key in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::NoExecutionDate { .. } => "no_execution_date",
            SkipReason::SnapTooLarge { .. } => "snap_too_large",
            SkipReason::EmptyHoldingWindow { .. } => "empty_holding_window",
            SkipReason::MissingPriceData { .. } => "missing_price_data",
            SkipReason::MissingBenchmark { .. } => "missing_benchmark",
            SkipReason::EmptyPortfolio { .. } => "empty_portfolio",
            SkipReason::NoUsableSecurities { .. } => "no_usable_securities",
            SkipReason::FeaturesUnavailable { .. } => "features_unavailable",
            SkipReason::AmbiguousDirection { .. } => "ambiguous_direction",
            SkipReason::NoEvaluablePeriods => "no_evaluable_periods",
        }
    }
}

/// Per-kind skip counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts(BTreeMap<&'static str, usize>);

impl SkipCounts {
    pub fn record(&mut self, reason: &SkipReason) {
        *self.0.entry(reason.kind()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &SkipCounts) {
        for (kind, count) in &other.0 {
            *self.0.entry(*kind).or_insert(0) += count;
        }
    }

    pub fn get(&self, kind: &str) -> usize {
        self.0.get(kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

/// Top-level error type for kabuwalk.
#[derive(Debug, thiserror::Error)]
pub enum KabuwalkError {
    #[error("skipped: {0}")]
    Skip(#[from] SkipReason),

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid rebalance schedule: {reason}")]
    InvalidSchedule { reason: String },

    #[error("feature build failed for {date}: {reason}")]
    FeatureBuild { date: NaiveDate, reason: String },

    #[error("cache error: {reason}")]
    Cache { reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error("thread pool error: {reason}")]
    ThreadPool { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl KabuwalkError {
    /// Splits a worker result into a recoverable skip or a structural error.
    pub fn into_skip(self) -> Result<SkipReason, KabuwalkError> {
        match self {
            KabuwalkError::Skip(reason) => Ok(reason),
            other => Err(other),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, KabuwalkError::Skip(_))
    }
}

impl From<&KabuwalkError> for std::process::ExitCode {
    fn from(err: &KabuwalkError) -> Self {
        let code: u8 = match err {
            KabuwalkError::Io(_) | KabuwalkError::ThreadPool { .. } => 1,
            KabuwalkError::ConfigParse { .. }
            | KabuwalkError::ConfigMissing { .. }
            | KabuwalkError::ConfigInvalid { .. }
            | KabuwalkError::InvalidSchedule { .. } => 2,
            KabuwalkError::Database { .. } | KabuwalkError::DatabaseQuery { .. } => 3,
            KabuwalkError::Skip(_) | KabuwalkError::FeatureBuild { .. } => 5,
            KabuwalkError::Cache { .. } | KabuwalkError::Report { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
