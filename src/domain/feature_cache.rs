//! Memoized per-date feature tables and close histories.
//!
//! The cache is an arena of immutable [`DateSnapshot`]s indexed by date.
//! Only [`FeatureCache::warm`] mutates it; every reader is side-effect free
//! and treats an absent date as data unavailable.

use crate::domain::entry_timing::rsi_by_code;
use crate::domain::error::{KabuwalkError, SkipReason};
use crate::domain::evaluator::PointInTimeStore;
use crate::domain::features::{FeatureTable, RSI_COLUMN};
use crate::domain::price_series::PriceSeries;
use crate::ports::cache_port::CacheStore;
use crate::ports::data_port::PriceStore;
use crate::ports::feature_port::FeatureBuilder;
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Identifies one persisted cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Everything the search needs for one valuation date, computed with data
/// dated on or before `date` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateSnapshot {
    pub date: NaiveDate,
    pub features: FeatureTable,
    /// Split-adjusted closes over the lookback window, ascending by date.
    pub closes: BTreeMap<String, Vec<ClosePoint>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub version: String,
    pub lookback_days: i64,
    /// RSI period for the entry-timing column; 0 disables it.
    pub rsi_period: usize,
}

impl CacheConfig {
    /// Version under which snapshots are persisted. Includes every setting
    /// that changes snapshot contents, so stale entries are never reused.
    pub fn cache_version(&self) -> String {
        format!(
            "{}-lb{}-rsi{}",
            self.version, self.lookback_days, self.rsi_period
        )
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "v1".into(),
            lookback_days: 120,
            rsi_period: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmFailure {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarmReport {
    pub requested: usize,
    pub from_memory: usize,
    pub from_persisted: usize,
    pub computed: usize,
    pub failed: Vec<WarmFailure>,
}

impl WarmReport {
    pub fn available(&self) -> usize {
        self.from_memory + self.from_persisted + self.computed
    }
}

/// Builds the snapshot for `date` from the feature builder and the store.
pub fn build_snapshot(
    date: NaiveDate,
    builder: &dyn FeatureBuilder,
    store: &dyn PriceStore,
    config: &CacheConfig,
) -> Result<DateSnapshot, KabuwalkError> {
    let mut features = builder.build_features(date)?;
    if features.as_of > date {
        return Err(KabuwalkError::FeatureBuild {
            date,
            reason: format!("feature table is dated {}", features.as_of),
        });
    }
    if features.is_empty() {
        return Err(SkipReason::FeaturesUnavailable { date }.into());
    }

    let view = PointInTimeStore::new(store, date);
    let start = date - Duration::days(config.lookback_days.max(0));
    let mut closes = BTreeMap::new();
    for code in features.codes() {
        let series = PriceSeries::new(code.to_string(), view.get_prices(code, start, date)?);
        let history: Vec<ClosePoint> = series
            .adjusted_closes(start, date)
            .into_iter()
            .map(|(date, close)| ClosePoint { date, close })
            .collect();
        if !history.is_empty() {
            closes.insert(code.to_string(), history);
        }
    }

    if config.rsi_period > 0 {
        let rsi = rsi_by_code(&closes, config.rsi_period);
        features.set_column(RSI_COLUMN, &rsi);
    }

    Ok(DateSnapshot {
        date,
        features,
        closes,
    })
}

#[derive(Debug, Default)]
pub struct FeatureCache {
    config: CacheConfig,
    snapshots: Vec<DateSnapshot>,
    index: BTreeMap<NaiveDate, usize>,
    failed: BTreeMap<NaiveDate, String>,
    recomputations: usize,
}

impl FeatureCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Makes a snapshot available for every date in `dates` that can be
    /// built. In-memory snapshots are reused first, then persisted ones, and
    /// only the remainder is computed. Newly computed snapshots are appended
    /// to `persist` as one new entry.
    ///
    /// Dates that fail with a data-level problem are left absent and listed
    /// in the report; structural errors abort the warm.
    pub fn warm(
        &mut self,
        dates: &[NaiveDate],
        builder: &dyn FeatureBuilder,
        store: &dyn PriceStore,
        persist: Option<&dyn CacheStore>,
    ) -> Result<WarmReport, KabuwalkError> {
        let requested: BTreeSet<NaiveDate> = dates.iter().copied().collect();
        let mut report = WarmReport {
            requested: requested.len(),
            ..WarmReport::default()
        };

        let mut pending: Vec<NaiveDate> = Vec::new();
        for date in &requested {
            if self.index.contains_key(date) {
                report.from_memory += 1;
            } else if let Some(reason) = self.failed.get(date) {
                report.failed.push(WarmFailure {
                    date: *date,
                    reason: reason.clone(),
                });
            } else {
                pending.push(*date);
            }
        }

        if let Some(persist) = persist.filter(|_| !pending.is_empty()) {
            let loaded = persist.load(&self.config.cache_version(), &pending)?;
            for snapshot in loaded {
                if pending.contains(&snapshot.date) && !self.index.contains_key(&snapshot.date) {
                    self.insert(snapshot);
                    report.from_persisted += 1;
                }
            }
            pending.retain(|d| !self.index.contains_key(d));
        }

        let config = &self.config;
        let results: Vec<(NaiveDate, Result<DateSnapshot, KabuwalkError>)> = pending
            .par_iter()
            .map(|date| (*date, build_snapshot(*date, builder, store, config)))
            .collect();

        let mut computed = Vec::new();
        for (date, result) in results {
            match result {
                Ok(snapshot) => computed.push(snapshot),
                Err(err @ (KabuwalkError::Skip(_) | KabuwalkError::FeatureBuild { .. })) => {
                    warn!(%date, error = %err, "feature snapshot unavailable");
                    self.failed.insert(date, err.to_string());
                    report.failed.push(WarmFailure {
                        date,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        report.failed.sort_by_key(|f| f.date);

        self.recomputations += computed.len();
        report.computed = computed.len();

        if let (Some(persist), Some(first), Some(last)) =
            (persist, computed.first(), computed.last())
        {
            let key = CacheKey {
                start: first.date,
                end: last.date,
                version: self.config.cache_version(),
            };
            persist.append(&key, &computed)?;
            debug!(start = %key.start, end = %key.end, count = computed.len(), "persisted snapshots");
        }

        for snapshot in computed {
            self.insert(snapshot);
        }

        info!(
            requested = report.requested,
            memory = report.from_memory,
            persisted = report.from_persisted,
            computed = report.computed,
            failed = report.failed.len(),
            "feature cache warmed"
        );
        Ok(report)
    }

    fn insert(&mut self, snapshot: DateSnapshot) {
        self.index.insert(snapshot.date, self.snapshots.len());
        self.snapshots.push(snapshot);
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DateSnapshot> {
        self.index.get(&date).map(|&i| &self.snapshots[i])
    }

    pub fn features(&self, date: NaiveDate) -> Result<&FeatureTable, SkipReason> {
        self.get(date)
            .map(|s| &s.features)
            .ok_or(SkipReason::FeaturesUnavailable { date })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.index.contains_key(&date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.index.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Number of snapshots built from scratch over the cache's lifetime.
    pub fn recomputations(&self) -> usize {
        self.recomputations
    }
}
