#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use kabuwalk::domain::error::{KabuwalkError, SkipReason};
use kabuwalk::domain::feature_cache::{CacheConfig, FeatureCache};
use kabuwalk::domain::features::{FeatureRow, FeatureTable};
use kabuwalk::domain::params::StrategyParams;
use kabuwalk::domain::portfolio::Portfolio;
pub use kabuwalk::domain::price::{BenchmarkBar, FundamentalsSnapshot, PricePoint};
use kabuwalk::domain::schedule::{RebalanceDates, TradingCalendar};
use kabuwalk::ports::data_port::PriceStore;
use kabuwalk::ports::feature_port::FeatureBuilder;
use kabuwalk::ports::selector_port::PortfolioSelector;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Every weekday in `[start, end]`.
pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut day = start;
    while day <= end {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day);
        }
        day += Duration::days(1);
    }
    out
}

pub fn point(code: &str, d: NaiveDate, open: f64, close: f64) -> PricePoint {
    PricePoint {
        code: code.to_string(),
        date: d,
        open: Some(open),
        close: Some(close),
        adjustment_factor: 1.0,
    }
}

pub fn split_point(code: &str, d: NaiveDate, close: f64, factor: f64) -> PricePoint {
    PricePoint {
        adjustment_factor: factor,
        ..point(code, d, close, close)
    }
}

pub fn bar(d: NaiveDate, open: f64, close: f64) -> BenchmarkBar {
    BenchmarkBar {
        date: d,
        open: Some(open),
        close: Some(close),
    }
}

pub fn params(weights: &[(&str, f64)], top_n: usize) -> StrategyParams {
    StrategyParams {
        weights: weights.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        top_n,
        entry_timing: None,
    }
}

/// In-memory price store. Data dated after `poison_after`, when set, is
/// scaled by `poison_factor` on read.
pub struct MockStore {
    pub prices: BTreeMap<String, Vec<PricePoint>>,
    pub benchmark: Vec<BenchmarkBar>,
    pub fundamentals: Vec<FundamentalsSnapshot>,
    pub poison_after: Option<NaiveDate>,
    pub poison_factor: f64,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            prices: BTreeMap::new(),
            benchmark: Vec::new(),
            fundamentals: Vec::new(),
            poison_after: None,
            poison_factor: 1.0,
        }
    }

    pub fn with_prices(mut self, points: Vec<PricePoint>) -> Self {
        for p in points {
            self.prices.entry(p.code.clone()).or_default().push(p);
        }
        for series in self.prices.values_mut() {
            series.sort_by_key(|p| p.date);
        }
        self
    }

    pub fn with_benchmark(mut self, bars: Vec<BenchmarkBar>) -> Self {
        self.benchmark.extend(bars);
        self.benchmark.sort_by_key(|b| b.date);
        self
    }

    pub fn with_fundamentals(mut self, snapshot: FundamentalsSnapshot) -> Self {
        self.fundamentals.push(snapshot);
        self
    }

    pub fn poisoned_after(mut self, cutoff: NaiveDate, factor: f64) -> Self {
        self.poison_after = Some(cutoff);
        self.poison_factor = factor;
        self
    }

    fn scale(&self, d: NaiveDate) -> f64 {
        match self.poison_after {
            Some(cutoff) if d > cutoff => self.poison_factor,
            _ => 1.0,
        }
    }

    pub fn calendar(&self) -> TradingCalendar {
        TradingCalendar::from_benchmark(&self.benchmark)
    }
}

impl PriceStore for MockStore {
    fn get_prices(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, KabuwalkError> {
        Ok(self
            .prices
            .get(code)
            .map(|series| {
                series
                    .iter()
                    .filter(|p| p.date >= start_date && p.date <= end_date)
                    .map(|p| {
                        let k = self.scale(p.date);
                        PricePoint {
                            open: p.open.map(|v| v * k),
                            close: p.close.map(|v| v * k),
                            ..p.clone()
                        }
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_fundamentals(
        &self,
        code: &str,
        as_of: NaiveDate,
    ) -> Result<Option<FundamentalsSnapshot>, KabuwalkError> {
        Ok(self
            .fundamentals
            .iter()
            .filter(|f| f.code == code && f.disclosed <= as_of)
            .max_by_key(|f| f.disclosed)
            .cloned())
    }

    fn benchmark_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<BenchmarkBar>, KabuwalkError> {
        Ok(self
            .benchmark
            .iter()
            .filter(|b| b.date >= start_date && b.date <= end_date)
            .map(|b| {
                let k = self.scale(b.date);
                BenchmarkBar {
                    date: b.date,
                    open: b.open.map(|v| v * k),
                    close: b.close.map(|v| v * k),
                }
            })
            .collect())
    }

    fn list_codes(&self) -> Result<Vec<String>, KabuwalkError> {
        Ok(self.prices.keys().cloned().collect())
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, KabuwalkError> {
        Ok(self.prices.get(code).and_then(|series| {
            let first = series.first()?.date;
            let last = series.last()?.date;
            Some((first, last, series.len()))
        }))
    }
}

/// Feature builder that serves fixed tables and counts its calls.
///
/// A request for `D` is answered from the latest table dated on or before
/// `D`, re-dated to `D`. Dates in `missing` are reported as unavailable.
pub struct MockFeatureBuilder {
    pub tables: BTreeMap<NaiveDate, Vec<FeatureRow>>,
    pub missing: BTreeSet<NaiveDate>,
    calls: AtomicUsize,
}

impl MockFeatureBuilder {
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            missing: BTreeSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_table(mut self, d: NaiveDate, rows: Vec<FeatureRow>) -> Self {
        self.tables.insert(d, rows);
        self
    }

    pub fn without(mut self, d: NaiveDate) -> Self {
        self.missing.insert(d);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeatureBuilder for MockFeatureBuilder {
    fn build_features(&self, as_of: NaiveDate) -> Result<FeatureTable, KabuwalkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(&as_of) {
            return Err(SkipReason::FeaturesUnavailable { date: as_of }.into());
        }
        match self.tables.range(..=as_of).next_back() {
            Some((_, rows)) => Ok(FeatureTable::new(as_of, rows.clone())),
            None => Err(SkipReason::FeaturesUnavailable { date: as_of }.into()),
        }
    }
}

/// Holds the same codes in equal weight whatever the features say.
pub struct FixedSelector {
    pub codes: Vec<String>,
}

impl FixedSelector {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl PortfolioSelector for FixedSelector {
    fn select(
        &self,
        table: &FeatureTable,
        _params: &StrategyParams,
    ) -> Result<Portfolio, KabuwalkError> {
        Portfolio::equal_weight(table.as_of, self.codes.iter().cloned())
    }
}

pub fn row(code: &str, values: &[(&str, f64)]) -> FeatureRow {
    FeatureRow {
        code: code.to_string(),
        values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    }
}

pub const CODES: [&str; 8] = ["1301", "1332", "2914", "4502", "6758", "7203", "8306", "9984"];

/// Synthetic market over weekdays of `[start, end]`: a slowly rising
/// benchmark and eight securities with distinct steady drifts.
pub fn synthetic_market(start: NaiveDate, end: NaiveDate) -> MockStore {
    let days = weekdays(start, end);
    let mut points = Vec::new();
    for (i, code) in CODES.iter().enumerate() {
        let base = 100.0 * (i + 1) as f64;
        let drift = 0.0004 * (i as f64 - 3.5);
        for (t, d) in days.iter().enumerate() {
            let close = base * (1.0 + drift).powi(t as i32);
            let open = base * (1.0 + drift).powi(t as i32 - 1);
            points.push(point(code, *d, open, close));
        }
    }
    let bars = days
        .iter()
        .enumerate()
        .map(|(t, d)| {
            let close = 1000.0 * 1.0002f64.powi(t as i32);
            bar(*d, close / 1.0002, close)
        })
        .collect();
    MockStore::new().with_prices(points).with_benchmark(bars)
}

/// Month-end feature tables for the synthetic market. `momentum` tracks
/// each security's drift; `value` rotates month to month.
pub fn synthetic_features(dates: &[NaiveDate]) -> MockFeatureBuilder {
    let mut builder = MockFeatureBuilder::new();
    for d in dates {
        let rows = CODES
            .iter()
            .enumerate()
            .map(|(i, code)| {
                let momentum = i as f64 - 3.5;
                let value = ((i as u32 * 3 + d.month() * 5) % 11) as f64;
                row(code, &[("momentum", momentum), ("value", value)])
            })
            .collect();
        builder = builder.with_table(*d, rows);
    }
    builder
}

pub fn month_ends(store: &MockStore, start: NaiveDate, end: NaiveDate) -> RebalanceDates {
    RebalanceDates::month_ends(&store.calendar(), start, end)
}

pub fn cache() -> FeatureCache {
    FeatureCache::new(CacheConfig::default())
}
