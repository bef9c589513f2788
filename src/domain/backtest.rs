//! Evaluation of one candidate over a window of rebalance dates.

use crate::domain::error::{KabuwalkError, SkipCounts};
use crate::domain::evaluator::{EvaluatorConfig, ExitRule, PeriodResult, evaluate_period};
use crate::domain::feature_cache::FeatureCache;
use crate::domain::params::StrategyParams;
use crate::domain::parallel::chunk_len;
use crate::domain::timeseries::{PeriodOutcome, TimeSeries, run_time_series};
use crate::ports::data_port::PriceStore;
use crate::ports::selector_port::PortfolioSelector;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Shared read-only inputs for evaluating candidates.
pub struct BacktestContext<'a> {
    pub store: &'a dyn PriceStore,
    pub cache: &'a FeatureCache,
    pub selector: &'a dyn PortfolioSelector,
    pub evaluator: EvaluatorConfig,
    /// Upper bound on dates evaluated concurrently for one candidate.
    pub date_workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EvaluationMode {
    /// Each rebalance date is held for a fixed number of months.
    FixedHorizon { months: u32 },
    /// Each rebalance date is held until the next one, chained.
    TimeSeries,
}

impl EvaluationMode {
    /// Fixed horizon in months, if any.
    pub fn horizon_months(&self) -> Option<u32> {
        match self {
            EvaluationMode::FixedHorizon { months } => Some(*months),
            EvaluationMode::TimeSeries => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindowEvaluation {
    pub outcomes: Vec<PeriodOutcome>,
    /// Annualized excess return of every evaluated period, in date order.
    pub excess: Vec<f64>,
    pub skips: SkipCounts,
    pub series: Option<TimeSeries>,
}

impl WindowEvaluation {
    fn from_outcomes(outcomes: Vec<PeriodOutcome>, series: Option<TimeSeries>) -> Self {
        let mut skips = SkipCounts::default();
        let mut excess = Vec::new();
        for outcome in &outcomes {
            match outcome {
                PeriodOutcome::Evaluated(r) => {
                    excess.push(r.annualized_excess());
                    for missing in &r.missing {
                        skips.record(&missing.skip_reason());
                    }
                }
                PeriodOutcome::Skipped { reason, .. } => skips.record(reason),
            }
        }
        Self {
            outcomes,
            excess,
            skips,
            series,
        }
    }

    pub fn evaluated(&self) -> impl Iterator<Item = &PeriodResult> + '_ {
        self.outcomes.iter().filter_map(PeriodOutcome::result)
    }

    pub fn evaluated_count(&self) -> usize {
        self.excess.len()
    }
}

/// Selects a portfolio at `rebalance_date` from the cached features and
/// evaluates it.
pub fn evaluate_date(
    ctx: &BacktestContext<'_>,
    params: &StrategyParams,
    rebalance_date: NaiveDate,
    exit: ExitRule,
    as_of: NaiveDate,
) -> Result<PeriodResult, KabuwalkError> {
    let table = ctx.cache.features(rebalance_date)?;
    let portfolio = ctx.selector.select(table, params)?;
    evaluate_period(
        ctx.store,
        &portfolio,
        rebalance_date,
        exit,
        as_of,
        &ctx.evaluator,
    )
}

/// Evaluates `periods` concurrently, at most `date_workers` at a time, and
/// returns their outcomes in input order.
pub fn evaluate_dates(
    ctx: &BacktestContext<'_>,
    params: &StrategyParams,
    periods: &[(NaiveDate, ExitRule)],
    as_of: NaiveDate,
) -> Result<Vec<PeriodOutcome>, KabuwalkError> {
    let results: Vec<(NaiveDate, Result<PeriodResult, KabuwalkError>)> = periods
        .par_iter()
        .with_min_len(chunk_len(periods.len(), ctx.date_workers))
        .map(|(date, exit)| (*date, evaluate_date(ctx, params, *date, *exit, as_of)))
        .collect();

    results
        .into_iter()
        .map(|(rebalance_date, result)| match result {
            Ok(r) => Ok(PeriodOutcome::Evaluated(r)),
            Err(err) => err.into_skip().map(|reason| PeriodOutcome::Skipped {
                rebalance_date,
                reason,
            }),
        })
        .collect()
}

/// Evaluates `params` over `dates` with nothing after `as_of` visible.
pub fn evaluate_window(
    ctx: &BacktestContext<'_>,
    params: &StrategyParams,
    dates: &[NaiveDate],
    mode: EvaluationMode,
    as_of: NaiveDate,
) -> Result<WindowEvaluation, KabuwalkError> {
    match mode {
        EvaluationMode::FixedHorizon { months } => {
            let periods: Vec<(NaiveDate, ExitRule)> = dates
                .iter()
                .map(|d| (*d, ExitRule::Horizon { months }))
                .collect();
            let outcomes = evaluate_dates(ctx, params, &periods, as_of)?;
            Ok(WindowEvaluation::from_outcomes(outcomes, None))
        }
        EvaluationMode::TimeSeries => {
            if dates.len() < 2 {
                return Ok(WindowEvaluation::from_outcomes(Vec::new(), None));
            }
            let (outcomes, series) = run_time_series(ctx, params, dates, as_of)?;
            Ok(WindowEvaluation::from_outcomes(outcomes, Some(series)))
        }
    }
}
