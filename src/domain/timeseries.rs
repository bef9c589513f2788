//! Chained period returns over a rebalance schedule.
//!
//! Periods are evaluated independently (in parallel where the pool allows),
//! then sorted by date and folded into one value curve seeded at 1.0. A
//! period that cannot be evaluated contributes a zero return and keeps its
//! skip reason; structural errors abort the whole series.

use crate::domain::backtest::{BacktestContext, evaluate_dates};
use crate::domain::error::{KabuwalkError, SkipCounts, SkipReason};
use crate::domain::evaluator::{ExitRule, PeriodResult};
use crate::domain::metrics::{SeriesMetrics, ValuePoint};
use crate::domain::params::StrategyParams;
use chrono::NaiveDate;
use serde::Serialize;

/// Result of one period: evaluated, or skipped with the reason.
#[derive(Debug, Clone, PartialEq)]
pub enum PeriodOutcome {
    Evaluated(PeriodResult),
    Skipped {
        rebalance_date: NaiveDate,
        reason: SkipReason,
    },
}

impl PeriodOutcome {
    pub fn rebalance_date(&self) -> NaiveDate {
        match self {
            PeriodOutcome::Evaluated(r) => r.rebalance_date,
            PeriodOutcome::Skipped { rebalance_date, .. } => *rebalance_date,
        }
    }

    pub fn result(&self) -> Option<&PeriodResult> {
        match self {
            PeriodOutcome::Evaluated(r) => Some(r),
            PeriodOutcome::Skipped { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            PeriodOutcome::Evaluated(_) => None,
            PeriodOutcome::Skipped { reason, .. } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub rebalance_date: NaiveDate,
    pub period_end: NaiveDate,
    pub net_return: f64,
    pub value: f64,
    /// Skip kind when the period contributed a zero placeholder.
    pub skipped: Option<&'static str>,
}

/// Append-only chained series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    points: Vec<SeriesPoint>,
    curve: Vec<ValuePoint>,
    #[serde(skip)]
    skips: SkipCounts,
}

impl TimeSeries {
    pub fn new(start: NaiveDate) -> Self {
        Self {
            points: Vec::new(),
            curve: vec![ValuePoint {
                date: start,
                value: 1.0,
            }],
            skips: SkipCounts::default(),
        }
    }

    /// Appends the period ending at `period_end`.
    pub fn push(&mut self, period_end: NaiveDate, outcome: &PeriodOutcome) {
        let net_return = outcome.result().map(|r| r.net_return).unwrap_or(0.0);
        let value = self.value() * (1.0 + net_return).max(0.0);
        if let Some(reason) = outcome.skip_reason() {
            self.skips.record(reason);
        }
        self.points.push(SeriesPoint {
            rebalance_date: outcome.rebalance_date(),
            period_end,
            net_return,
            value,
            skipped: outcome.skip_reason().map(SkipReason::kind),
        });
        self.curve.push(ValuePoint {
            date: period_end,
            value,
        });
    }

    /// Current cumulative value.
    pub fn value(&self) -> f64 {
        self.curve.last().map(|p| p.value).unwrap_or(1.0)
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn curve(&self) -> &[ValuePoint] {
        &self.curve
    }

    pub fn skips(&self) -> &SkipCounts {
        &self.skips
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn metrics(&self, risk_free_rate: f64) -> SeriesMetrics {
        SeriesMetrics::compute(&self.curve, risk_free_rate)
    }
}

/// Runs the chained series over adjacent pairs of `dates`: select at `t_i`,
/// enter on the first trading day after it, exit at the close of `t_{i+1}`.
///
/// Returns the outcomes in date order alongside the folded series.
pub fn run_time_series(
    ctx: &BacktestContext<'_>,
    params: &StrategyParams,
    dates: &[NaiveDate],
    as_of: NaiveDate,
) -> Result<(Vec<PeriodOutcome>, TimeSeries), KabuwalkError> {
    let Some(&start) = dates.first() else {
        return Err(KabuwalkError::InvalidSchedule {
            reason: "time series needs at least one rebalance date".into(),
        });
    };

    let periods: Vec<(NaiveDate, ExitRule)> = dates
        .windows(2)
        .map(|w| (w[0], ExitRule::NextRebalance(w[1])))
        .collect();
    let mut outcomes = evaluate_dates(ctx, params, &periods, as_of)?;
    outcomes.sort_by_key(PeriodOutcome::rebalance_date);

    let mut series = TimeSeries::new(start);
    for (outcome, (_, exit)) in outcomes.iter().zip(&periods) {
        let period_end = match exit {
            ExitRule::NextRebalance(next) => *next,
            ExitRule::Horizon { .. } => outcome.rebalance_date(),
        };
        series.push(period_end, outcome);
    }
    Ok((outcomes, series))
}
