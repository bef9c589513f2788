//! Search-run report: the batch artifact of one optimization run.

use crate::domain::backtest::{EvaluationMode, WindowEvaluation};
use crate::domain::error::SkipCounts;
use crate::domain::feature_cache::WarmReport;
use crate::domain::metrics::{DistributionSummary, SeriesMetrics};
use crate::domain::objective::{ObjectiveConfig, ObjectiveScore};
use crate::domain::parallel::ParallelBudget;
use crate::domain::search::{Candidate, SearchDiagnostics};
use crate::domain::split::EvaluationSplit;
use crate::domain::timeseries::PeriodOutcome;
use chrono::NaiveDate;
use serde::Serialize;

/// Driver phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    WarmCache,
    Search,
    SelectBest,
    EvaluateTest,
    EvaluateHoldout,
    Report,
}

/// One row of per-period diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodDiagnostic {
    pub rebalance_date: NaiveDate,
    pub entry_date: Option<NaiveDate>,
    pub exit_date: Option<NaiveDate>,
    pub holdings: usize,
    pub missing: usize,
    pub coverage: Option<f64>,
    pub net_return: Option<f64>,
    pub benchmark_return: Option<f64>,
    pub annualized_excess: Option<f64>,
    pub skipped: Option<&'static str>,
}

impl From<&PeriodOutcome> for PeriodDiagnostic {
    fn from(outcome: &PeriodOutcome) -> Self {
        match outcome {
            PeriodOutcome::Evaluated(r) => Self {
                rebalance_date: r.rebalance_date,
                entry_date: Some(r.entry_date),
                exit_date: Some(r.exit_date),
                holdings: r.securities.len(),
                missing: r.missing.len(),
                coverage: Some(r.coverage),
                net_return: Some(r.net_return),
                benchmark_return: Some(r.benchmark_return),
                annualized_excess: Some(r.annualized_excess()),
                skipped: None,
            },
            PeriodOutcome::Skipped {
                rebalance_date,
                reason,
            } => Self {
                rebalance_date: *rebalance_date,
                entry_date: None,
                exit_date: None,
                holdings: 0,
                missing: 0,
                coverage: None,
                net_return: None,
                benchmark_return: None,
                annualized_excess: None,
                skipped: Some(reason.kind()),
            },
        }
    }
}

/// Metrics of one candidate over one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub window: String,
    pub as_of: NaiveDate,
    pub dates: usize,
    pub evaluated_periods: usize,
    /// Distribution of per-period annualized excess returns.
    pub excess: Option<DistributionSummary>,
    pub score: ObjectiveScore,
    pub mean_coverage: Option<f64>,
    pub skips: SkipCounts,
    pub series: Option<SeriesMetrics>,
    pub periods: Vec<PeriodDiagnostic>,
}

impl WindowReport {
    pub fn from_evaluation(
        window: &str,
        as_of: NaiveDate,
        dates: usize,
        evaluation: &WindowEvaluation,
        objective: &ObjectiveConfig,
        risk_free_rate: f64,
    ) -> Self {
        let coverages: Vec<f64> = evaluation.evaluated().map(|r| r.coverage).collect();
        let mean_coverage = if coverages.is_empty() {
            None
        } else {
            Some(coverages.iter().sum::<f64>() / coverages.len() as f64)
        };
        Self {
            window: window.to_string(),
            as_of,
            dates,
            evaluated_periods: evaluation.evaluated_count(),
            excess: DistributionSummary::compute(&evaluation.excess),
            score: objective.score(&evaluation.excess),
            mean_coverage,
            skips: evaluation.skips.clone(),
            series: evaluation
                .series
                .as_ref()
                .map(|s| s.metrics(risk_free_rate)),
            periods: evaluation
                .outcomes
                .iter()
                .map(PeriodDiagnostic::from)
                .collect(),
        }
    }
}

/// Test-window result of one of the top train candidates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationEntry {
    pub index: usize,
    pub train_score: f64,
    pub test_score: f64,
    pub test_periods: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRunReport {
    pub mode: EvaluationMode,
    pub seed: u64,
    pub data_end: NaiveDate,
    pub budget: ParallelBudget,
    pub split: EvaluationSplit,
    pub warm: WarmReport,
    pub search: SearchDiagnostics,
    pub best: Option<Candidate>,
    pub train: Option<WindowReport>,
    pub test: Option<WindowReport>,
    pub holdout: Option<WindowReport>,
    pub validation: Vec<ValidationEntry>,
    pub phases: Vec<RunPhase>,
    /// Every skip recorded during the run, by kind.
    pub skips: SkipCounts,
}

impl SearchRunReport {
    pub fn skipped_total(&self) -> usize {
        self.skips.total()
    }
}
