//! End-to-end tests over in-memory stores.
//!
//! Tests cover:
//! - Hand-computed period returns (equal weights, missing exit, split)
//! - No look-ahead: data after `as_of` cannot change an evaluation
//! - Feature cache warm idempotence, in memory and persisted
//! - A malformed feature file drops only its own date
//! - Time-series mode zero-fills skipped periods
//! - Pluggable portfolio selectors
//! - Full optimization runs, including one with no evaluable candidate

mod common;

use approx::assert_relative_eq;
use common::*;
use kabuwalk::adapters::csv_feature_adapter::CsvFeatureBuilder;
use kabuwalk::adapters::json_cache_adapter::JsonCacheStore;
use kabuwalk::domain::backtest::{BacktestContext, EvaluationMode, evaluate_window};
use kabuwalk::domain::cost::CostModel;
use kabuwalk::domain::driver::{OptimizationRun, RunConfig, RunInputs, SplitMode, backtest_params};
use kabuwalk::domain::error::SkipReason;
use kabuwalk::domain::evaluator::{
    EvaluatorConfig, ExitRule, MissingReason, PeriodResult, evaluate_period,
};
use kabuwalk::domain::feature_cache::FeatureCache;
use kabuwalk::domain::parallel::ParallelBudget;
use kabuwalk::domain::portfolio::Portfolio;
use kabuwalk::domain::report::RunPhase;
use kabuwalk::domain::search::{Range, SearchConfig, SearchSpace};
use kabuwalk::domain::selector::ScoreSelector;
use kabuwalk::domain::split::{SplitConfig, TrainBoundary};
use kabuwalk::domain::timeseries::PeriodOutcome;
use kabuwalk::ports::cache_port::CacheStore;
use std::collections::BTreeMap;

mod hand_computed_periods {
    use super::*;

    fn flat_benchmark() -> Vec<BenchmarkBar> {
        [
            date(2021, 1, 29),
            date(2021, 2, 1),
            date(2021, 2, 15),
            date(2021, 2, 26),
        ]
        .into_iter()
        .map(|d| bar(d, 1000.0, 1000.0))
        .collect()
    }

    fn half_and_half() -> Portfolio {
        Portfolio::new(
            date(2021, 1, 29),
            BTreeMap::from([("A".to_string(), 0.5), ("B".to_string(), 0.5)]),
        )
        .unwrap()
    }

    fn evaluate(store: &MockStore, portfolio: &Portfolio, config: &EvaluatorConfig) -> PeriodResult {
        evaluate_period(
            store,
            portfolio,
            date(2021, 1, 29),
            ExitRule::NextRebalance(date(2021, 2, 26)),
            date(2021, 2, 26),
            config,
        )
        .unwrap()
    }

    #[test]
    fn equal_weights_average_security_returns() {
        let store = MockStore::new()
            .with_benchmark(flat_benchmark())
            .with_prices(vec![
                point("A", date(2021, 2, 1), 100.0, 101.0),
                point("A", date(2021, 2, 26), 109.0, 110.0),
                point("B", date(2021, 2, 1), 200.0, 199.0),
                point("B", date(2021, 2, 26), 191.0, 190.0),
            ]);

        let r = evaluate(&store, &half_and_half(), &EvaluatorConfig::default());
        assert_eq!(r.entry_date, date(2021, 2, 1));
        assert_eq!(r.exit_date, date(2021, 2, 26));
        assert_relative_eq!(r.gross_return, 0.025, epsilon = 1e-12);
        assert_relative_eq!(r.benchmark_return, 0.0, epsilon = 1e-12);
        assert_relative_eq!(r.excess_return, 0.025, epsilon = 1e-12);
        assert_eq!(r.coverage, 1.0);
        assert!(r.missing.is_empty());
    }

    #[test]
    fn missing_exit_price_drops_and_renormalizes() {
        let store = MockStore::new()
            .with_benchmark(flat_benchmark())
            .with_prices(vec![
                point("A", date(2021, 2, 1), 100.0, 101.0),
                point("A", date(2021, 2, 26), 109.0, 110.0),
                point("B", date(2021, 2, 1), 200.0, 199.0),
            ]);

        let r = evaluate(&store, &half_and_half(), &EvaluatorConfig::default());
        assert_relative_eq!(r.gross_return, 0.10, epsilon = 1e-12);
        assert_relative_eq!(r.coverage, 0.5, epsilon = 1e-12);
        assert_eq!(r.securities.len(), 1);
        assert_eq!(r.securities[0].weight, 1.0);
        assert_eq!(r.missing.len(), 1);
        assert_eq!(r.missing[0].code, "B");
        assert_eq!(r.missing[0].reason, MissingReason::NoExitPrice);
    }

    #[test]
    fn split_inside_window_scales_entry_price() {
        let store = MockStore::new()
            .with_benchmark(flat_benchmark())
            .with_prices(vec![
                point("A", date(2021, 2, 1), 100.0, 100.0),
                split_point("A", date(2021, 2, 15), 52.0, 0.5),
                point("A", date(2021, 2, 26), 59.0, 60.0),
            ]);
        let portfolio = Portfolio::equal_weight(date(2021, 1, 29), ["A"]).unwrap();

        let r = evaluate(&store, &portfolio, &EvaluatorConfig::default());
        assert_eq!(r.securities[0].split_multiplier, 2.0);
        assert_relative_eq!(r.gross_return, 0.20, epsilon = 1e-12);
    }

    #[test]
    fn split_on_entry_day_is_already_in_the_price() {
        let store = MockStore::new()
            .with_benchmark(flat_benchmark())
            .with_prices(vec![
                split_point("A", date(2021, 2, 1), 50.0, 0.5),
                point("A", date(2021, 2, 26), 55.0, 55.0),
            ]);
        let portfolio = Portfolio::equal_weight(date(2021, 1, 29), ["A"]).unwrap();

        let r = evaluate(&store, &portfolio, &EvaluatorConfig::default());
        assert_eq!(r.securities[0].split_multiplier, 1.0);
        assert_relative_eq!(r.gross_return, 0.10, epsilon = 1e-12);
    }

    #[test]
    fn round_trip_cost_is_subtracted() {
        let store = MockStore::new()
            .with_benchmark(flat_benchmark())
            .with_prices(vec![
                point("A", date(2021, 2, 1), 100.0, 100.0),
                point("A", date(2021, 2, 26), 110.0, 110.0),
            ]);
        let portfolio = Portfolio::equal_weight(date(2021, 1, 29), ["A"]).unwrap();
        let config = EvaluatorConfig {
            cost: CostModel::new(10.0, 15.0),
            ..EvaluatorConfig::default()
        };

        let r = evaluate(&store, &portfolio, &config);
        assert_relative_eq!(r.cost, 0.0025, epsilon = 1e-12);
        assert_relative_eq!(r.net_return, 0.0975, epsilon = 1e-12);
    }

    #[test]
    fn nothing_priced_is_a_skip() {
        let store = MockStore::new().with_benchmark(flat_benchmark());
        let err = evaluate_period(
            &store,
            &half_and_half(),
            date(2021, 1, 29),
            ExitRule::NextRebalance(date(2021, 2, 26)),
            date(2021, 2, 26),
            &EvaluatorConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err.into_skip().unwrap(),
            SkipReason::NoUsableSecurities {
                date: date(2021, 1, 29)
            }
        );
    }

    #[test]
    fn exit_beyond_as_of_is_a_skip() {
        let store = MockStore::new()
            .with_benchmark(flat_benchmark())
            .with_prices(vec![
                point("A", date(2021, 2, 1), 100.0, 100.0),
                point("A", date(2021, 2, 26), 110.0, 110.0),
            ]);
        let portfolio = Portfolio::equal_weight(date(2021, 1, 29), ["A"]).unwrap();
        let err = evaluate_period(
            &store,
            &portfolio,
            date(2021, 1, 29),
            ExitRule::NextRebalance(date(2021, 2, 26)),
            date(2021, 2, 10),
            &EvaluatorConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err.into_skip().unwrap(),
            SkipReason::SnapTooLarge { .. }
        ));
    }
}

mod point_in_time {
    use super::*;

    fn outcomes(store: &MockStore, as_of: chrono::NaiveDate) -> Vec<PeriodOutcome> {
        let dates = month_ends(store, date(2020, 1, 1), as_of);
        let builder = synthetic_features(dates.as_slice());
        let mut cache = cache();
        cache.warm(dates.as_slice(), &builder, store, None).unwrap();
        let ctx = BacktestContext {
            store,
            cache: &cache,
            selector: &ScoreSelector,
            evaluator: EvaluatorConfig::default(),
            date_workers: 2,
        };
        let p = params(&[("momentum", 1.0), ("value", 0.5)], 3);
        evaluate_window(
            &ctx,
            &p,
            dates.as_slice(),
            EvaluationMode::FixedHorizon { months: 1 },
            as_of,
        )
        .unwrap()
        .outcomes
    }

    #[test]
    fn later_data_cannot_change_results() {
        let as_of = date(2021, 6, 30);
        let clean = synthetic_market(date(2020, 1, 1), date(2021, 12, 31));
        let poisoned = synthetic_market(date(2020, 1, 1), date(2021, 12, 31))
            .poisoned_after(as_of, 3.0);

        let a = outcomes(&clean, as_of);
        let b = outcomes(&poisoned, as_of);
        assert_eq!(a, b);
        assert!(a.iter().filter(|o| o.result().is_some()).count() >= 15);
    }

    #[test]
    fn periods_ending_after_as_of_are_skipped() {
        let as_of = date(2021, 6, 30);
        let store = synthetic_market(date(2020, 1, 1), date(2021, 12, 31));
        let last = outcomes(&store, as_of).pop().unwrap();
        assert_eq!(last.rebalance_date(), as_of);
        assert!(last.result().is_none());
    }
}

mod selectors {
    use super::*;

    #[test]
    fn evaluation_holds_what_the_selector_returns() {
        let store = synthetic_market(date(2021, 1, 1), date(2021, 6, 30));
        let dates = month_ends(&store, date(2021, 1, 1), date(2021, 6, 30));
        let builder = synthetic_features(dates.as_slice());
        let mut cache = cache();
        cache.warm(dates.as_slice(), &builder, &store, None).unwrap();
        let selector = FixedSelector::new(&["1301", "9984"]);
        let ctx = BacktestContext {
            store: &store,
            cache: &cache,
            selector: &selector,
            evaluator: EvaluatorConfig::default(),
            date_workers: 2,
        };

        let window = evaluate_window(
            &ctx,
            &params(&[("momentum", 1.0)], 5),
            dates.as_slice(),
            EvaluationMode::FixedHorizon { months: 1 },
            date(2021, 6, 30),
        )
        .unwrap();

        assert!(window.evaluated_count() >= 4);
        for r in window.evaluated() {
            let held: Vec<&str> = r.securities.iter().map(|s| s.code.as_str()).collect();
            assert_eq!(held, vec!["1301", "9984"]);
            assert!(r.securities.iter().all(|s| s.weight == 0.5));
        }
    }
}

mod cache_warm {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_warm_reuses_every_snapshot() {
        let store = synthetic_market(date(2020, 1, 1), date(2020, 12, 31));
        let dates = month_ends(&store, date(2020, 1, 1), date(2020, 12, 31));
        let builder = synthetic_features(dates.as_slice());
        let mut cache = cache();

        let first = cache.warm(dates.as_slice(), &builder, &store, None).unwrap();
        assert_eq!(first.computed, 12);
        let snapshots: Vec<_> = dates
            .as_slice()
            .iter()
            .map(|d| cache.get(*d).cloned().unwrap())
            .collect();
        let calls = builder.calls();

        let second = cache.warm(dates.as_slice(), &builder, &store, None).unwrap();
        assert_eq!(second.from_memory, 12);
        assert_eq!(second.computed, 0);
        assert_eq!(builder.calls(), calls);
        assert_eq!(cache.recomputations(), 12);
        for snapshot in &snapshots {
            assert_eq!(cache.get(snapshot.date), Some(snapshot));
        }
    }

    #[test]
    fn persisted_snapshots_skip_the_builder() {
        let dir = TempDir::new().unwrap();
        let persist = JsonCacheStore::open(dir.path()).unwrap();
        let store = synthetic_market(date(2020, 1, 1), date(2020, 6, 30));
        let dates = month_ends(&store, date(2020, 1, 1), date(2020, 6, 30));

        let builder = synthetic_features(dates.as_slice());
        let mut warm = cache();
        warm.warm(dates.as_slice(), &builder, &store, Some(&persist as &dyn CacheStore))
            .unwrap();

        let fresh_builder = synthetic_features(dates.as_slice());
        let mut fresh = cache();
        let report = fresh
            .warm(dates.as_slice(), &fresh_builder, &store, Some(&persist as &dyn CacheStore))
            .unwrap();
        assert_eq!(report.from_persisted, 6);
        assert_eq!(report.computed, 0);
        assert_eq!(fresh_builder.calls(), 0);
        for d in dates.as_slice() {
            assert_eq!(fresh.get(*d), warm.get(*d));
        }
    }

    #[test]
    fn failed_dates_are_reported_not_fatal() {
        let store = synthetic_market(date(2020, 1, 1), date(2020, 6, 30));
        let dates = month_ends(&store, date(2020, 1, 1), date(2020, 6, 30));
        let missing = dates.as_slice()[2];
        let builder = synthetic_features(dates.as_slice()).without(missing);
        let mut cache = cache();

        let report = cache.warm(dates.as_slice(), &builder, &store, None).unwrap();
        assert_eq!(report.computed, 5);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].date, missing);
        assert!(!cache.contains(missing));
    }

    #[test]
    fn malformed_feature_file_only_drops_its_date() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("2024-01-31.csv"),
            "code,momentum\n7203,0.5\n6758,-0.2\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("2024-02-29.csv"), "code,momentum\n7203,high\n").unwrap();
        let builder = CsvFeatureBuilder::open(dir.path()).unwrap();
        let store = MockStore::new();
        let dates = [date(2024, 1, 31), date(2024, 2, 29)];
        let mut cache = cache();

        let report = cache.warm(&dates, &builder, &store, None).unwrap();
        assert_eq!(report.computed, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].date, date(2024, 2, 29));
        assert!(cache.contains(date(2024, 1, 31)));
        assert!(!cache.contains(date(2024, 2, 29)));
    }
}

mod time_series_mode {
    use super::*;

    #[test]
    fn skipped_period_contributes_zero() {
        let store = synthetic_market(date(2021, 1, 1), date(2021, 6, 30));
        let dates = month_ends(&store, date(2021, 1, 1), date(2021, 6, 30));
        assert_eq!(dates.len(), 6);
        let missing = dates.as_slice()[2];
        let builder = synthetic_features(dates.as_slice()).without(missing);
        let mut cache = cache();
        cache.warm(dates.as_slice(), &builder, &store, None).unwrap();
        let ctx = BacktestContext {
            store: &store,
            cache: &cache,
            selector: &ScoreSelector,
            evaluator: EvaluatorConfig::default(),
            date_workers: 1,
        };

        let window = evaluate_window(
            &ctx,
            &params(&[("momentum", 1.0)], 2),
            dates.as_slice(),
            EvaluationMode::TimeSeries,
            date(2021, 6, 30),
        )
        .unwrap();

        assert_eq!(window.outcomes.len(), 5);
        assert_eq!(window.evaluated_count(), 4);
        assert_eq!(window.skips.get("features_unavailable"), 1);

        let series = window.series.as_ref().unwrap();
        let points = series.points();
        assert_eq!(points.len(), 5);
        assert_eq!(points[2].rebalance_date, missing);
        assert_eq!(points[2].net_return, 0.0);
        assert_eq!(points[2].skipped, Some("features_unavailable"));
        assert_eq!(points[2].value, points[1].value);

        let chained: f64 = window
            .evaluated()
            .map(|r| 1.0 + r.net_return)
            .product();
        assert_relative_eq!(series.value(), chained, epsilon = 1e-12);
    }

    #[test]
    fn periods_chain_end_to_end() {
        let store = synthetic_market(date(2021, 1, 1), date(2021, 4, 30));
        let dates = month_ends(&store, date(2021, 1, 1), date(2021, 4, 30));
        let builder = synthetic_features(dates.as_slice());
        let mut cache = cache();
        cache.warm(dates.as_slice(), &builder, &store, None).unwrap();
        let ctx = BacktestContext {
            store: &store,
            cache: &cache,
            selector: &ScoreSelector,
            evaluator: EvaluatorConfig::default(),
            date_workers: 2,
        };

        let window = evaluate_window(
            &ctx,
            &params(&[("momentum", 1.0)], 2),
            dates.as_slice(),
            EvaluationMode::TimeSeries,
            date(2021, 4, 30),
        )
        .unwrap();
        let results: Vec<_> = window.evaluated().collect();
        assert_eq!(results.len(), 3);
        for (r, next) in results.iter().zip(&dates.as_slice()[1..]) {
            assert_eq!(r.exit_date, *next);
        }
    }
}

mod optimization_run {
    use super::*;

    fn run_config(seed: u64) -> RunConfig {
        RunConfig {
            mode: EvaluationMode::FixedHorizon { months: 1 },
            split: SplitMode::TimeOrdered(SplitConfig {
                train: TrainBoundary::EndDate {
                    date: date(2020, 12, 31),
                },
                holdout_start: Some(date(2021, 7, 1)),
                horizon_months: None,
            }),
            space: SearchSpace {
                features: vec!["momentum".into(), "value".into()],
                weight: Range::new(-1.0, 1.0),
                top_n: (2, 4),
                entry_timing: None,
            },
            search: SearchConfig {
                target_trials: 6,
                max_attempts: 60,
                seed,
                batch_size: 3,
                startup_trials: 3,
                top_k: 3,
                ..SearchConfig::default()
            },
            evaluator: EvaluatorConfig::default(),
            budget: ParallelBudget::new(2, 1),
            risk_free_rate: 0.0,
            data_end: date(2021, 12, 31),
        }
    }

    fn execute(
        store: &MockStore,
        builder: &MockFeatureBuilder,
        seed: u64,
    ) -> kabuwalk::domain::report::SearchRunReport {
        let dates = month_ends(store, date(2020, 1, 1), date(2021, 12, 31));
        let inputs = RunInputs {
            store,
            builder,
            selector: &ScoreSelector,
            cache_store: None,
        };
        let mut cache = cache();
        OptimizationRun::new(inputs, run_config(seed))
            .execute(&dates, &mut cache)
            .unwrap()
    }

    #[test]
    fn full_run_reports_every_window() {
        let store = synthetic_market(date(2020, 1, 1), date(2021, 12, 31));
        let dates = month_ends(&store, date(2020, 1, 1), date(2021, 12, 31));
        let builder = synthetic_features(dates.as_slice());

        let report = execute(&store, &builder, 7);

        assert!(report.best.is_some());
        assert!(report.search.evaluated >= 1);
        assert_eq!(
            report.phases,
            vec![
                RunPhase::Init,
                RunPhase::WarmCache,
                RunPhase::Search,
                RunPhase::SelectBest,
                RunPhase::EvaluateTest,
                RunPhase::EvaluateHoldout,
                RunPhase::Report,
            ]
        );

        let split = &report.split;
        assert!(!split.shuffled);
        assert!(split.train.iter().all(|d| *d <= date(2020, 12, 31)));
        assert!(split.test.iter().all(|d| *d > date(2020, 12, 31) && *d < date(2021, 7, 1)));
        assert!(split.holdout.iter().all(|d| *d >= date(2021, 7, 1)));
        assert!(split.excluded_immature.contains(&date(2020, 12, 31)));

        assert!(report.train.is_some());
        assert!(report.test.as_ref().unwrap().evaluated_periods > 0);
        assert_eq!(report.holdout.as_ref().unwrap().dates, split.holdout.len());
        assert!(!report.validation.is_empty());
        assert!(report.validation.len() <= 3);
    }

    #[test]
    fn same_seed_same_report() {
        let store = synthetic_market(date(2020, 1, 1), date(2021, 12, 31));
        let dates = month_ends(&store, date(2020, 1, 1), date(2021, 12, 31));
        let builder = synthetic_features(dates.as_slice());

        let a = execute(&store, &builder, 11);
        let b = execute(&store, &builder, 11);
        assert_eq!(a.best, b.best);
        assert_eq!(a.validation, b.validation);
        assert_eq!(a.search, b.search);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn no_evaluable_candidate_still_reports() {
        let store = synthetic_market(date(2020, 1, 1), date(2021, 12, 31));
        let builder = MockFeatureBuilder::new();

        let report = execute(&store, &builder, 7);

        assert!(report.best.is_none());
        assert!(report.test.is_none());
        assert!(report.holdout.is_none());
        assert!(report.validation.is_empty());
        assert!(!report.search.target_reached);
        assert_eq!(report.search.evaluated, 0);
        assert!(report.skips.get("features_unavailable") > 0);
        assert_eq!(
            report.phases,
            vec![
                RunPhase::Init,
                RunPhase::WarmCache,
                RunPhase::Search,
                RunPhase::SelectBest,
                RunPhase::Report,
            ]
        );
    }

    #[test]
    fn fixed_params_backtest() {
        let store = synthetic_market(date(2020, 1, 1), date(2020, 12, 31));
        let dates = month_ends(&store, date(2020, 1, 1), date(2020, 12, 31));
        let builder = synthetic_features(dates.as_slice());
        let inputs = RunInputs {
            store: &store,
            builder: &builder,
            selector: &ScoreSelector,
            cache_store: None,
        };
        let mut cache: FeatureCache = cache();

        let report = backtest_params(
            &inputs,
            &mut cache,
            &params(&[("momentum", 1.0)], 2),
            &dates,
            EvaluationMode::FixedHorizon { months: 1 },
            EvaluatorConfig::default(),
            ParallelBudget::new(2, 2),
            date(2020, 12, 31),
            0.0,
        )
        .unwrap();

        assert_eq!(report.window, "backtest");
        assert_eq!(report.dates, 12);
        assert_eq!(report.evaluated_periods, 11);
        assert_eq!(report.skips.get("no_execution_date"), 1);
        assert!(report.score.is_evaluable());
        // the two fastest-drifting securities beat a slower benchmark
        assert!(report.excess.unwrap().mean > 0.0);
    }
}
