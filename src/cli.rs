//! CLI definition and dispatch.

use chrono::{Months, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvPriceStore;
use crate::adapters::csv_feature_adapter::CsvFeatureBuilder;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_cache_adapter::JsonCacheStore;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::EvaluationMode;
use crate::domain::config_validation::{
    optional_date, parse_weights, validate_backtest_config, validate_cache_config,
    validate_data_config, validate_search_config, validate_strategy_config,
};
use crate::domain::cost::CostModel;
use crate::domain::driver::{OptimizationRun, RunConfig, RunInputs, SplitMode, backtest_params};
use crate::domain::error::{KabuwalkError, SkipCounts};
use crate::domain::evaluator::EvaluatorConfig;
use crate::domain::feature_cache::{CacheConfig, FeatureCache, WarmReport};
use crate::domain::objective::{Aggregate, ObjectiveConfig};
use crate::domain::parallel::ParallelBudget;
use crate::domain::params::{Direction, EntryTiming, StrategyParams};
use crate::domain::report::{SearchRunReport, WindowReport};
use crate::domain::schedule::{RebalanceDates, TradingCalendar};
use crate::domain::search::{Range, SearchConfig, SearchSpace, TimingSpace};
use crate::domain::selector::ScoreSelector;
use crate::domain::split::{SplitConfig, TrainBoundary};
use crate::ports::cache_port::CacheStore;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceStore;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "kabuwalk",
    about = "Point-in-time backtester and walk-forward parameter search"
)]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search strategy parameters on train, validate on test and holdout
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        trials: Option<usize>,
    },
    /// Backtest the fixed parameters of the [strategy] section
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Nothing after this date is visible (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Build and persist feature snapshots for every rebalance date
    WarmCache {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the data available to a configuration
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Optimize {
            config,
            output,
            seed,
            trials,
        } => run_optimize(&config, output.as_deref(), seed, trials),
        Command::Backtest {
            config,
            output,
            as_of,
        } => run_backtest(&config, output.as_deref(), as_of.as_deref()),
        Command::WarmCache { config } => run_warm_cache(&config),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, code } => run_info(&config, code.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, KabuwalkError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn build_cost_model(config: &dyn ConfigPort) -> CostModel {
    CostModel::new(
        config.get_double("backtest", "buy_cost_bps", 0.0),
        config.get_double("backtest", "sell_cost_bps", 0.0),
    )
}

pub fn build_evaluator_config(config: &dyn ConfigPort) -> EvaluatorConfig {
    let defaults = EvaluatorConfig::default();
    EvaluatorConfig {
        snap_tolerance_days: config.get_int(
            "backtest",
            "snap_tolerance_days",
            defaults.snap_tolerance_days,
        ),
        entry_search_days: config.get_int(
            "backtest",
            "entry_search_days",
            defaults.entry_search_days,
        ),
        cost: build_cost_model(config),
    }
}

pub fn build_mode(config: &dyn ConfigPort) -> EvaluationMode {
    match config.get_string("backtest", "mode").as_deref().map(str::trim) {
        Some("time_series") => EvaluationMode::TimeSeries,
        _ => EvaluationMode::FixedHorizon {
            months: config.get_int("backtest", "horizon_months", 1).max(1) as u32,
        },
    }
}

pub fn build_objective(config: &dyn ConfigPort) -> ObjectiveConfig {
    let defaults = ObjectiveConfig::default();
    let aggregate = match config.get_string("search", "aggregate").as_deref().map(str::trim) {
        Some("median") => Aggregate::Median,
        Some("trimmed_mean") => Aggregate::TrimmedMean {
            proportion: config.get_double("search", "trim_proportion", 0.1),
        },
        _ => Aggregate::Mean,
    };
    ObjectiveConfig {
        aggregate,
        downside_lambda: config.get_double("search", "downside_lambda", defaults.downside_lambda),
        tail_quantile: config.get_double("search", "tail_quantile", defaults.tail_quantile),
        min_tail_samples: config
            .get_int("search", "min_tail_samples", defaults.min_tail_samples as i64)
            .max(0) as usize,
    }
}

pub fn build_search_config(config: &dyn ConfigPort) -> SearchConfig {
    let defaults = SearchConfig::default();
    let usize_key = |key: &str, default: usize| {
        config.get_int("search", key, default as i64).max(0) as usize
    };
    let target_trials = usize_key("target_trials", defaults.target_trials);
    SearchConfig {
        target_trials,
        max_attempts: usize_key("max_attempts", target_trials * 10),
        seed: config.get_int("search", "seed", defaults.seed as i64) as u64,
        batch_size: usize_key("batch_size", defaults.batch_size).max(1),
        startup_trials: usize_key("startup_trials", defaults.startup_trials),
        refine_scale: config.get_double("search", "refine_scale", defaults.refine_scale),
        top_k: usize_key("top_k", defaults.top_k).max(1),
        candidate_workers: defaults.candidate_workers,
        objective: build_objective(config),
    }
}

fn range(config: &dyn ConfigPort, min_key: &str, max_key: &str, defaults: (f64, f64)) -> Range {
    Range::new(
        config.get_double("search", min_key, defaults.0),
        config.get_double("search", max_key, defaults.1),
    )
}

pub fn build_search_space(config: &dyn ConfigPort) -> SearchSpace {
    let lo = config.get_int("search", "top_n_min", 10).max(1) as usize;
    let hi = config.get_int("search", "top_n_max", 30).max(1) as usize;
    let entry_timing = config
        .get_bool("search", "entry_timing", false)
        .then(|| TimingSpace {
            base: range(config, "timing_base_min", "timing_base_max", (40.0, 60.0)),
            max: range(config, "timing_max_min", "timing_max_max", (20.0, 80.0)),
            min_width: config.get_double("search", "timing_min_width", 5.0),
            weight: range(config, "timing_weight_min", "timing_weight_max", (0.0, 1.0)),
        });
    SearchSpace {
        features: config.get_list("search", "features"),
        weight: range(config, "weight_min", "weight_max", (-1.0, 1.0)),
        top_n: (lo, hi.max(lo)),
        entry_timing,
    }
}

pub fn build_split_mode(config: &dyn ConfigPort) -> Result<SplitMode, KabuwalkError> {
    let ratio = config.get_double("search", "train_ratio", 0.7);
    if config.get_string("search", "split").as_deref().map(str::trim) == Some("shuffled") {
        return Ok(SplitMode::Shuffled { ratio });
    }
    let train = match optional_date(config, "search", "train_end_date")? {
        Some(date) => TrainBoundary::EndDate { date },
        None => TrainBoundary::Ratio { ratio },
    };
    Ok(SplitMode::TimeOrdered(SplitConfig {
        train,
        holdout_start: optional_date(config, "search", "holdout_start_date")?,
        horizon_months: None,
    }))
}

pub fn build_strategy_params(config: &dyn ConfigPort) -> Result<StrategyParams, KabuwalkError> {
    let raw = config
        .get_string("strategy", "weights")
        .ok_or_else(|| KabuwalkError::ConfigMissing {
            section: "strategy".into(),
            key: "weights".into(),
        })?;
    let weights = parse_weights("strategy", "weights", &raw)?;
    let entry_timing = match config.get_string("strategy", "timing_base") {
        None => None,
        Some(_) => {
            let base = config.get_double("strategy", "timing_base", f64::NAN);
            let max = config.get_double("strategy", "timing_max", f64::NAN);
            let min_width = config.get_double("strategy", "timing_min_width", 5.0);
            let direction = Direction::from_thresholds(base, max, min_width).map_err(|e| {
                KabuwalkError::ConfigInvalid {
                    section: "strategy".into(),
                    key: "timing_max".into(),
                    reason: e.to_string(),
                }
            })?;
            Some(EntryTiming {
                direction,
                base,
                max,
                weight: config.get_double("strategy", "timing_weight", 1.0),
            })
        }
    };
    Ok(StrategyParams {
        weights,
        top_n: config.get_int("strategy", "top_n", 20).max(1) as usize,
        entry_timing,
    })
}

pub fn build_cache_config(config: &dyn ConfigPort) -> CacheConfig {
    let defaults = CacheConfig::default();
    CacheConfig {
        version: config
            .get_string("cache", "version")
            .map(|v| v.trim().to_string())
            .unwrap_or(defaults.version),
        lookback_days: config.get_int("cache", "lookback_days", defaults.lookback_days),
        rsi_period: config
            .get_int("cache", "rsi_period", defaults.rsi_period as i64)
            .max(0) as usize,
    }
}

pub fn build_budget(config: &dyn ConfigPort) -> ParallelBudget {
    ParallelBudget::new(
        config.get_int("search", "cpu_budget", 0).max(0) as usize,
        config.get_int("search", "date_workers", 1).max(1) as usize,
    )
}

// ---------------------------------------------------------------------------
// Data wiring
// ---------------------------------------------------------------------------

pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn PriceStore>, KabuwalkError> {
    match config.get_string("data", "source").as_deref().map(str::trim) {
        Some("sqlite") => open_sqlite(config),
        _ => {
            let path = |key: &str| config.get_string("data", key).map(PathBuf::from);
            let missing = |key: &str| KabuwalkError::ConfigMissing {
                section: "data".into(),
                key: key.into(),
            };
            let prices = path("prices_dir").ok_or_else(|| missing("prices_dir"))?;
            let benchmark = path("benchmark_file").ok_or_else(|| missing("benchmark_file"))?;
            let fundamentals = path("fundamentals_file");
            Ok(Box::new(CsvPriceStore::open(
                &prices,
                &benchmark,
                fundamentals.as_deref(),
            )?))
        }
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &dyn ConfigPort) -> Result<Box<dyn PriceStore>, KabuwalkError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    Ok(Box::new(SqliteAdapter::from_config(config)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &dyn ConfigPort) -> Result<Box<dyn PriceStore>, KabuwalkError> {
    Err(KabuwalkError::ConfigInvalid {
        section: "data".into(),
        key: "source".into(),
        reason: "built without the sqlite feature".into(),
    })
}

pub fn open_features(config: &dyn ConfigPort) -> Result<CsvFeatureBuilder, KabuwalkError> {
    let dir = config
        .get_string("data", "features_dir")
        .ok_or_else(|| KabuwalkError::ConfigMissing {
            section: "data".into(),
            key: "features_dir".into(),
        })?;
    CsvFeatureBuilder::open(Path::new(&dir))
}

/// Persisted cache, when `[cache] dir` is set.
pub fn open_cache_store(config: &dyn ConfigPort) -> Result<Option<JsonCacheStore>, KabuwalkError> {
    match config.get_string("cache", "dir") {
        Some(dir) if !dir.trim().is_empty() => Ok(Some(JsonCacheStore::open(Path::new(dir.trim()))?)),
        _ => Ok(None),
    }
}

/// Rebalance dates and the last trading day with data.
///
/// Explicit `rebalance_dates` win; otherwise month ends of the benchmark
/// calendar between `start_date` and `end_date`.
pub fn build_schedule(
    config: &dyn ConfigPort,
    store: &dyn PriceStore,
) -> Result<(RebalanceDates, NaiveDate), KabuwalkError> {
    let explicit = config
        .get_list("backtest", "rebalance_dates")
        .iter()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| KabuwalkError::ConfigInvalid {
            section: "backtest".into(),
            key: "rebalance_dates".into(),
            reason: e.to_string(),
        })?;
    let (start, end) = match (explicit.first(), explicit.last()) {
        (Some(&first), Some(&last)) => {
            let end = optional_date(config, "backtest", "end_date")?
                .unwrap_or_else(|| last.checked_add_months(Months::new(12)).unwrap_or(last));
            (first, end.max(last))
        }
        _ => {
            let missing = |key: &str| KabuwalkError::ConfigMissing {
                section: "backtest".into(),
                key: key.into(),
            };
            (
                optional_date(config, "backtest", "start_date")?
                    .ok_or_else(|| missing("start_date"))?,
                optional_date(config, "backtest", "end_date")?.ok_or_else(|| missing("end_date"))?,
            )
        }
    };

    let calendar = TradingCalendar::from_benchmark(&store.benchmark_range(start, end)?);
    let data_end = calendar
        .days()
        .last()
        .copied()
        .ok_or_else(|| KabuwalkError::InvalidSchedule {
            reason: format!("no benchmark closes between {start} and {end}"),
        })?;

    let dates = if explicit.is_empty() {
        RebalanceDates::month_ends(&calendar, start, end)
    } else {
        RebalanceDates::new(explicit)?
    };
    if dates.is_empty() {
        return Err(KabuwalkError::InvalidSchedule {
            reason: format!("no rebalance dates between {start} and {end}"),
        });
    }
    Ok((dates, data_end))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_optimize(
    config_path: &Path,
    output_path: Option<&Path>,
    seed: Option<u64>,
    trials: Option<usize>,
) -> Result<(), KabuwalkError> {
    // Stage 1: Load and validate config
    let config = load_config(config_path)?;
    validate_data_config(&config)?;
    validate_backtest_config(&config)?;
    validate_search_config(&config)?;
    validate_cache_config(&config)?;

    // Stage 2: Open data sources
    let store = open_store(&config)?;
    let builder = open_features(&config)?;
    let cache_store = open_cache_store(&config)?;
    let (dates, data_end) = build_schedule(&config, store.as_ref())?;

    // Stage 3: Assemble run
    let mut search = build_search_config(&config);
    if let Some(seed) = seed {
        search.seed = seed;
    }
    if let Some(trials) = trials {
        search.target_trials = trials;
        search.max_attempts = search.max_attempts.max(trials);
    }
    let run_config = RunConfig {
        mode: build_mode(&config),
        split: build_split_mode(&config)?,
        space: build_search_space(&config),
        search,
        evaluator: build_evaluator_config(&config),
        budget: build_budget(&config),
        risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.0),
        data_end,
    };
    eprintln!(
        "Optimizing: {} rebalance dates, {} to {}, data through {}",
        dates.len(),
        dates.first().unwrap_or(data_end),
        dates.last().unwrap_or(data_end),
        data_end,
    );
    eprintln!(
        "  Budget: {} CPUs ({} date x {} candidate workers), seed {}",
        run_config.budget.cpu_budget,
        run_config.budget.date_workers,
        run_config.budget.candidate_workers,
        run_config.search.seed,
    );

    // Stage 4: Run
    let selector = ScoreSelector;
    let inputs = RunInputs {
        store: store.as_ref(),
        builder: &builder,
        selector: &selector,
        cache_store: cache_store.as_ref().map(|c| c as &dyn CacheStore),
    };
    let mut cache = FeatureCache::new(build_cache_config(&config));
    let report = OptimizationRun::new(inputs, run_config).execute(&dates, &mut cache)?;

    // Stage 5: Summary and report
    print_run_summary(&report);
    let output = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("kabuwalk-report.json"));
    JsonReportAdapter::new(true).write(&report, &output.to_string_lossy())?;
    eprintln!("\nReport written to: {}", output.display());
    Ok(())
}

fn run_backtest(
    config_path: &Path,
    output_path: Option<&Path>,
    as_of: Option<&str>,
) -> Result<(), KabuwalkError> {
    let config = load_config(config_path)?;
    validate_data_config(&config)?;
    validate_backtest_config(&config)?;
    validate_cache_config(&config)?;
    validate_strategy_config(&config)?;

    let params = build_strategy_params(&config)?;
    let store = open_store(&config)?;
    let builder = open_features(&config)?;
    let cache_store = open_cache_store(&config)?;
    let (dates, data_end) = build_schedule(&config, store.as_ref())?;
    let as_of = match as_of {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            KabuwalkError::ConfigInvalid {
                section: "cli".into(),
                key: "as_of".into(),
                reason: format!("invalid date '{s}', expected YYYY-MM-DD"),
            }
        })?,
        None => data_end,
    };
    let dates = RebalanceDates::new(
        dates
            .as_slice()
            .iter()
            .copied()
            .filter(|d| *d <= as_of)
            .collect(),
    )?;

    eprintln!(
        "Running backtest: {} rebalance dates, top {} of {} features, as of {}",
        dates.len(),
        params.top_n,
        params.weights.len(),
        as_of,
    );

    let selector = ScoreSelector;
    let inputs = RunInputs {
        store: store.as_ref(),
        builder: &builder,
        selector: &selector,
        cache_store: cache_store.as_ref().map(|c| c as &dyn CacheStore),
    };
    let mut cache = FeatureCache::new(build_cache_config(&config));
    let report = backtest_params(
        &inputs,
        &mut cache,
        &params,
        &dates,
        build_mode(&config),
        build_evaluator_config(&config),
        build_budget(&config),
        as_of,
        config.get_double("backtest", "risk_free_rate", 0.0),
    )?;

    eprintln!("\n=== Backtest Results ===");
    print_window(&report);
    print_skips(&report.skips);

    if let Some(output) = output_path {
        JsonReportAdapter::new(true).write_window(&report, &output.to_string_lossy())?;
        eprintln!("\nReport written to: {}", output.display());
    }
    Ok(())
}

fn run_warm_cache(config_path: &Path) -> Result<(), KabuwalkError> {
    let config = load_config(config_path)?;
    validate_data_config(&config)?;
    validate_backtest_config(&config)?;
    validate_cache_config(&config)?;

    let store = open_store(&config)?;
    let builder = open_features(&config)?;
    let cache_store = open_cache_store(&config)?;
    if cache_store.is_none() {
        eprintln!("warning: [cache] dir is not set; snapshots will not be persisted");
    }
    let (dates, _) = build_schedule(&config, store.as_ref())?;

    let mut cache = FeatureCache::new(build_cache_config(&config));
    let pool = build_budget(&config).build_pool()?;
    let report = pool.install(|| {
        cache.warm(
            dates.as_slice(),
            &builder,
            store.as_ref(),
            cache_store.as_ref().map(|c| c as &dyn CacheStore),
        )
    })?;

    print_warm(&report);
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), KabuwalkError> {
    let config = load_config(config_path)?;
    validate_data_config(&config)?;
    eprintln!("  [data]      ok");
    validate_backtest_config(&config)?;
    eprintln!("  [backtest]  ok");
    validate_cache_config(&config)?;
    eprintln!("  [cache]     ok");

    if config.get_string("search", "features").is_some() {
        validate_search_config(&config)?;
        let space = build_search_space(&config);
        eprintln!(
            "  [search]    ok: {} features, top_n {}..={}, entry timing {}",
            space.features.len(),
            space.top_n.0,
            space.top_n.1,
            if space.entry_timing.is_some() { "on" } else { "off" },
        );
    }
    if config.get_string("strategy", "weights").is_some() {
        validate_strategy_config(&config)?;
        let params = build_strategy_params(&config)?;
        let direction = params
            .direction()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "none".to_string());
        eprintln!(
            "  [strategy]  ok: {} weights, top_n {}, timing {}",
            params.weights.len(),
            params.top_n,
            direction,
        );
    }

    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_info(config_path: &Path, code: Option<&str>) -> Result<(), KabuwalkError> {
    let config = load_config(config_path)?;
    validate_data_config(&config)?;
    let store = open_store(&config)?;

    let codes = match code {
        Some(c) => vec![c.trim().to_string()],
        None => store.list_codes()?,
    };
    let mut last_date: Option<NaiveDate> = None;
    for c in &codes {
        match store.get_data_range(c)? {
            Some((min_date, max_date, count)) => {
                println!("{c}: {count} bars, {min_date} to {max_date}");
                last_date = last_date.max(Some(max_date));
            }
            None => eprintln!("{c}: no data found"),
        }
    }

    if let Some(c) = code {
        if let Some(as_of) = last_date {
            match store.get_fundamentals(c, as_of)? {
                Some(snapshot) => {
                    println!("{c}: fundamentals disclosed {}", snapshot.disclosed);
                    for (metric, value) in &snapshot.values {
                        println!("  {metric}: {value}");
                    }
                }
                None => eprintln!("{c}: no fundamentals on or before {as_of}"),
            }
        }
    }

    if let Ok(builder) = open_features(&config) {
        let dates: Vec<NaiveDate> = builder.dates().collect();
        match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => {
                println!("features: {} snapshots, {first} to {last}", dates.len())
            }
            _ => eprintln!("features: no snapshots in {}", builder.dir().display()),
        }
    }

    if let Some(cache) = open_cache_store(&config)? {
        let version = build_cache_config(&config).cache_version();
        println!("cache: {} entries for version {version}", cache.entries(&version)?.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Console output
// ---------------------------------------------------------------------------

fn print_window(report: &WindowReport) {
    eprintln!(
        "Periods:          {} evaluated of {} dates",
        report.evaluated_periods, report.dates
    );
    if let Some(excess) = &report.excess {
        eprintln!("Mean Excess:      {:.2}%", excess.mean * 100.0);
        eprintln!("Median Excess:    {:.2}%", excess.median * 100.0);
        eprintln!("P10 Excess:       {:.2}%", excess.p10 * 100.0);
        eprintln!("Win Rate:         {:.1}%", excess.win_rate * 100.0);
    }
    if report.score.is_evaluable() {
        eprintln!("Score:            {:.4}", report.score.score);
    }
    if let Some(coverage) = report.mean_coverage {
        eprintln!("Coverage:         {:.1}%", coverage * 100.0);
    }
    if let Some(series) = &report.series {
        eprintln!("Total Return:     {:.2}%", series.total_return * 100.0);
        eprintln!("Annualized:       {:.2}%", series.annualized_return * 100.0);
        eprintln!("Sharpe Ratio:     {:.2}", series.sharpe_ratio);
        eprintln!("Sortino Ratio:    {:.2}", series.sortino_ratio);
        eprintln!("Max Drawdown:     -{:.1}%", series.max_drawdown * 100.0);
    }
}

fn print_skips(skips: &SkipCounts) {
    if skips.is_empty() {
        return;
    }
    eprintln!("\n=== Skipped ===");
    for (kind, count) in skips.iter() {
        eprintln!("  {kind}: {count}");
    }
}

fn print_warm(report: &WarmReport) {
    eprintln!("\n=== Feature Cache ===");
    eprintln!("Requested:        {}", report.requested);
    eprintln!("In memory:        {}", report.from_memory);
    eprintln!("Persisted:        {}", report.from_persisted);
    eprintln!("Computed:         {}", report.computed);
    eprintln!("Failed:           {}", report.failed.len());
    for failure in &report.failed {
        eprintln!("  {}: {}", failure.date, failure.reason);
    }
}

fn print_run_summary(report: &SearchRunReport) {
    eprintln!("\n=== Split ===");
    eprintln!(
        "Train: {}  Test: {}  Holdout: {}  Immature: {}{}",
        report.split.train.len(),
        report.split.test.len(),
        report.split.holdout.len(),
        report.split.excluded_immature.len(),
        if report.split.shuffled {
            "  (shuffled, exploratory only)"
        } else {
            ""
        },
    );
    print_warm(&report.warm);

    eprintln!("\n=== Search ===");
    eprintln!(
        "Attempts: {}  Evaluated: {}  Pruned: {}  No evaluable periods: {}",
        report.search.attempts,
        report.search.evaluated,
        report.search.pruned,
        report.search.no_evaluable,
    );
    if !report.search.target_reached {
        eprintln!("warning: target trial count not reached");
    }

    let Some(best) = &report.best else {
        eprintln!("\nNo candidate produced an evaluable period.");
        print_skips(&report.skips);
        return;
    };

    eprintln!("\n=== Best Candidate #{} ===", best.index);
    for (feature, weight) in &best.params.weights {
        eprintln!("  {feature}: {weight:+.3}");
    }
    eprintln!("  top_n: {}", best.params.top_n);
    if let Some(timing) = &best.params.entry_timing {
        eprintln!(
            "  entry timing: {} (base {:.1}, max {:.1}, weight {:.2})",
            timing.direction, timing.base, timing.max, timing.weight
        );
    }

    for window in [&report.train, &report.test, &report.holdout]
        .into_iter()
        .flatten()
    {
        eprintln!("\n=== {} (as of {}) ===", window.window, window.as_of);
        print_window(window);
    }

    if report.validation.len() > 1 {
        eprintln!("\n=== Top-{} Validation ===", report.validation.len());
        for entry in &report.validation {
            eprintln!(
                "  #{:<5} train {:>9.4}  test {:>9.4}  ({} periods)",
                entry.index, entry.train_score, entry.test_score, entry.test_periods
            );
        }
    }
    print_skips(&report.skips);
}
