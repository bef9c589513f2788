//! Date-indexed price series for one security.

use crate::domain::price::PricePoint;
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub code: String,
    pub points: Vec<PricePoint>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl PriceSeries {
    pub fn new(code: String, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        let date_index = points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.date, i))
            .collect();
        Self {
            code,
            points,
            date_index,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&PricePoint> {
        self.date_index.get(&date).map(|&i| &self.points[i])
    }

    /// Points with `start <= date <= end`.
    pub fn range(&self, start: NaiveDate, end: NaiveDate) -> &[PricePoint] {
        let lo = self.points.partition_point(|p| p.date < start);
        let hi = self.points.partition_point(|p| p.date <= end);
        if lo >= hi { &[] } else { &self.points[lo..hi] }
    }

    /// Closes back-adjusted for split events up to `as_of`, so that earlier
    /// prices are expressed in the share basis in force on `as_of`.
    pub fn adjusted_closes(&self, start: NaiveDate, as_of: NaiveDate) -> Vec<(NaiveDate, f64)> {
        let window = self.range(start, as_of);
        let mut out = Vec::with_capacity(window.len());
        let mut factor = 1.0;
        for point in window.iter().rev() {
            if let Some(close) = point.exit_price() {
                out.push((point.date, close * factor));
            }
            if point.has_split_event()
                && point.adjustment_factor.is_finite()
                && point.adjustment_factor > 0.0
            {
                factor *= point.adjustment_factor;
            }
        }
        out.reverse();
        out
    }
}
