//! Trading calendar and rebalance schedules.

use crate::domain::error::KabuwalkError;
use crate::domain::price::BenchmarkBar;
use chrono::{Datelike, NaiveDate};

/// Sorted, distinct trading days.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TradingCalendar {
    days: Vec<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(mut days: Vec<NaiveDate>) -> Self {
        days.sort();
        days.dedup();
        Self { days }
    }

    /// Calendar of benchmark dates that carry a usable close.
    pub fn from_benchmark(bars: &[BenchmarkBar]) -> Self {
        Self::new(
            bars.iter()
                .filter(|b| b.exit_price().is_some())
                .map(|b| b.date)
                .collect(),
        )
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.binary_search(&date).is_ok()
    }

    /// First trading day strictly after `date` and on or before `as_of`.
    pub fn first_after(&self, date: NaiveDate, as_of: NaiveDate) -> Option<NaiveDate> {
        let i = self.days.partition_point(|d| *d <= date);
        self.days.get(i).copied().filter(|d| *d <= as_of)
    }

    /// Last trading day on or before `date`.
    pub fn on_or_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        let i = self.days.partition_point(|d| *d <= date);
        i.checked_sub(1).map(|j| self.days[j])
    }
}

/// Strictly increasing, distinct rebalance dates.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceDates(Vec<NaiveDate>);

impl RebalanceDates {
    pub fn new(dates: Vec<NaiveDate>) -> Result<Self, KabuwalkError> {
        if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
            return Err(KabuwalkError::InvalidSchedule {
                reason: format!(
                    "rebalance dates must be strictly increasing: {} then {}",
                    w[0], w[1]
                ),
            });
        }
        Ok(Self(dates))
    }

    /// Last trading day of each calendar month in `[start, end]`.
    pub fn month_ends(calendar: &TradingCalendar, start: NaiveDate, end: NaiveDate) -> Self {
        let mut dates: Vec<NaiveDate> = Vec::new();
        for day in calendar.days().iter().filter(|d| **d >= start && **d <= end) {
            match dates.last_mut() {
                Some(last) if (last.year(), last.month()) == (day.year(), day.month()) => {
                    *last = *day;
                }
                _ => dates.push(*day),
            }
        }
        Self(dates)
    }

    pub fn as_slice(&self) -> &[NaiveDate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.0.last().copied()
    }
}
