//! Walk-forward / holdout optimization driver.
//!
//! INIT → WARM_CACHE → SEARCH(train) → SELECT_BEST → EVALUATE(test) →
//! [EVALUATE(holdout)] → REPORT. A run that completes always yields a
//! report, with or without a best candidate.

use crate::domain::backtest::{BacktestContext, EvaluationMode, evaluate_window};
use crate::domain::error::{KabuwalkError, SkipCounts};
use crate::domain::evaluator::EvaluatorConfig;
use crate::domain::feature_cache::{FeatureCache, WarmReport};
use crate::domain::objective::ObjectiveConfig;
use crate::domain::parallel::ParallelBudget;
use crate::domain::params::StrategyParams;
use crate::domain::report::{RunPhase, SearchRunReport, ValidationEntry, WindowReport};
use crate::domain::schedule::RebalanceDates;
use crate::domain::search::{
    Candidate, SearchConfig, SearchDiagnostics, SearchSpace, TrialEvaluation, run_search,
};
use crate::domain::split::{EvaluationSplit, SplitConfig};
use crate::ports::cache_port::CacheStore;
use crate::ports::data_port::PriceStore;
use crate::ports::feature_port::FeatureBuilder;
use crate::ports::selector_port::PortfolioSelector;
use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

/// How rebalance dates are partitioned.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitMode {
    TimeOrdered(SplitConfig),
    /// Exploratory only: train and test dates are drawn at random.
    Shuffled { ratio: f64 },
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: EvaluationMode,
    pub split: SplitMode,
    pub space: SearchSpace,
    pub search: SearchConfig,
    pub evaluator: EvaluatorConfig,
    pub budget: ParallelBudget,
    pub risk_free_rate: f64,
    /// Last date with data; the holdout cutoff.
    pub data_end: NaiveDate,
}

/// External collaborators of a run.
pub struct RunInputs<'a> {
    pub store: &'a dyn PriceStore,
    pub builder: &'a dyn FeatureBuilder,
    pub selector: &'a dyn PortfolioSelector,
    pub cache_store: Option<&'a dyn CacheStore>,
}

pub struct OptimizationRun<'a> {
    inputs: RunInputs<'a>,
    config: RunConfig,
    phases: Vec<RunPhase>,
}

impl<'a> OptimizationRun<'a> {
    pub fn new(inputs: RunInputs<'a>, config: RunConfig) -> Self {
        Self {
            inputs,
            config,
            phases: Vec::new(),
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        info!(?phase, "entering phase");
        self.phases.push(phase);
    }

    fn context<'c>(&self, cache: &'c FeatureCache) -> BacktestContext<'c>
    where
        'a: 'c,
    {
        BacktestContext {
            store: self.inputs.store,
            cache,
            selector: self.inputs.selector,
            evaluator: self.config.evaluator,
            date_workers: self.config.budget.date_workers,
        }
    }

    pub fn execute(
        mut self,
        dates: &RebalanceDates,
        cache: &mut FeatureCache,
    ) -> Result<SearchRunReport, KabuwalkError> {
        self.enter(RunPhase::Init);
        let split = self.build_split(dates)?;
        let pool = self.config.budget.build_pool()?;
        let data_end = self.config.data_end;
        let train_as_of = split.train_as_of(data_end);
        let test_as_of = split.test_as_of(data_end);
        let holdout_as_of = split.holdout_as_of(data_end);
        info!(
            train = split.train.len(),
            test = split.test.len(),
            holdout = split.holdout.len(),
            immature = split.excluded_immature.len(),
            shuffled = split.shuffled,
            "dates split"
        );

        self.enter(RunPhase::WarmCache);
        let warm = self.warm(&pool, &split, cache)?;

        self.enter(RunPhase::Search);
        let mode = self.config.mode;
        let mut search_config = self.config.search.clone();
        search_config.candidate_workers = self.config.budget.candidate_workers;
        let outcome = {
            let ctx = self.context(cache);
            let train = &split.train;
            pool.install(|| {
                run_search(&self.config.space, &search_config, |params| {
                    let window = evaluate_window(&ctx, params, train, mode, train_as_of)?;
                    Ok(TrialEvaluation {
                        excess: window.excess,
                        skips: window.skips,
                    })
                })
            })?
        };
        let mut skips = outcome.diagnostics.skips.clone();

        self.enter(RunPhase::SelectBest);
        let best = outcome.best().cloned();
        let Some(best) = best else {
            warn!("no candidate produced an evaluable period; reporting without a best candidate");
            self.enter(RunPhase::Report);
            return Ok(self.report(
                split,
                warm,
                outcome.diagnostics,
                None,
                skips,
                ReportWindows::default(),
            ));
        };
        info!(
            candidate = best.candidate.index,
            score = best.score.score,
            direction = ?best.candidate.direction(),
            "best candidate selected"
        );

        let objective = self.config.search.objective;
        let rf = self.config.risk_free_rate;
        let ctx = self.context(cache);
        let train_window = pool.install(|| {
            evaluate_window(&ctx, &best.candidate.params, &split.train, mode, train_as_of)
        })?;
        let train = WindowReport::from_evaluation(
            "train",
            train_as_of,
            split.train.len(),
            &train_window,
            &objective,
            rf,
        );

        self.enter(RunPhase::EvaluateTest);
        let mut validation = Vec::new();
        let mut test = None;
        for candidate in outcome.ranked().into_iter().take(self.config.search.top_k.max(1)) {
            let window = pool.install(|| {
                evaluate_window(&ctx, &candidate.candidate.params, &split.test, mode, test_as_of)
            })?;
            let report = WindowReport::from_evaluation(
                "test",
                test_as_of,
                split.test.len(),
                &window,
                &objective,
                rf,
            );
            validation.push(ValidationEntry {
                index: candidate.candidate.index,
                train_score: candidate.score.score,
                test_score: report.score.score,
                test_periods: report.evaluated_periods,
            });
            if candidate.candidate.index == best.candidate.index {
                skips.merge(&report.skips);
                test = Some(report);
            }
        }

        let holdout = if split.holdout.is_empty() {
            None
        } else {
            self.enter(RunPhase::EvaluateHoldout);
            let window = pool.install(|| {
                evaluate_window(&ctx, &best.candidate.params, &split.holdout, mode, holdout_as_of)
            })?;
            let report = WindowReport::from_evaluation(
                "holdout",
                holdout_as_of,
                split.holdout.len(),
                &window,
                &objective,
                rf,
            );
            skips.merge(&report.skips);
            Some(report)
        };

        self.enter(RunPhase::Report);
        Ok(self.report(
            split,
            warm,
            outcome.diagnostics,
            Some(best.candidate),
            skips,
            ReportWindows {
                train: Some(train),
                test,
                holdout,
                validation,
            },
        ))
    }

    fn build_split(&self, dates: &RebalanceDates) -> Result<EvaluationSplit, KabuwalkError> {
        match &self.config.split {
            SplitMode::TimeOrdered(split) => {
                let split = SplitConfig {
                    horizon_months: split.horizon_months.or(self.config.mode.horizon_months()),
                    ..split.clone()
                };
                EvaluationSplit::time_ordered(dates, &split)
            }
            SplitMode::Shuffled { ratio } => {
                warn!("shuffled split requested; results are exploratory only");
                let mut rng = StdRng::seed_from_u64(self.config.search.seed);
                EvaluationSplit::shuffled(dates, *ratio, &mut rng)
            }
        }
    }

    fn warm(
        &self,
        pool: &rayon::ThreadPool,
        split: &EvaluationSplit,
        cache: &mut FeatureCache,
    ) -> Result<WarmReport, KabuwalkError> {
        let mut all: Vec<NaiveDate> = split
            .train
            .iter()
            .chain(&split.test)
            .chain(&split.holdout)
            .copied()
            .collect();
        all.sort();
        let inputs = &self.inputs;
        pool.install(|| cache.warm(&all, inputs.builder, inputs.store, inputs.cache_store))
    }

    fn report(
        self,
        split: EvaluationSplit,
        warm: WarmReport,
        search: SearchDiagnostics,
        best: Option<Candidate>,
        skips: SkipCounts,
        windows: ReportWindows,
    ) -> SearchRunReport {
        SearchRunReport {
            mode: self.config.mode,
            seed: self.config.search.seed,
            data_end: self.config.data_end,
            budget: self.config.budget,
            split,
            warm,
            search,
            best,
            train: windows.train,
            test: windows.test,
            holdout: windows.holdout,
            validation: windows.validation,
            phases: self.phases,
            skips,
        }
    }
}

#[derive(Default)]
struct ReportWindows {
    train: Option<WindowReport>,
    test: Option<WindowReport>,
    holdout: Option<WindowReport>,
    validation: Vec<ValidationEntry>,
}

/// Evaluates fixed parameters over `dates` with nothing after `as_of`
/// visible. Used by the `backtest` command.
#[allow(clippy::too_many_arguments)]
pub fn backtest_params(
    inputs: &RunInputs<'_>,
    cache: &mut FeatureCache,
    params: &StrategyParams,
    dates: &RebalanceDates,
    mode: EvaluationMode,
    evaluator: EvaluatorConfig,
    budget: ParallelBudget,
    as_of: NaiveDate,
    risk_free_rate: f64,
) -> Result<WindowReport, KabuwalkError> {
    let pool = budget.build_pool()?;
    pool.install(|| {
        cache.warm(
            dates.as_slice(),
            inputs.builder,
            inputs.store,
            inputs.cache_store,
        )
    })?;
    let ctx = BacktestContext {
        store: inputs.store,
        cache,
        selector: inputs.selector,
        evaluator,
        date_workers: budget.threads(),
    };
    let window = pool.install(|| evaluate_window(&ctx, params, dates.as_slice(), mode, as_of))?;
    Ok(WindowReport::from_evaluation(
        "backtest",
        as_of,
        dates.len(),
        &window,
        &ObjectiveConfig::default(),
        risk_free_rate,
    ))
}
