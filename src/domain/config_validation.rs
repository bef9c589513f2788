//! Configuration validation.
//!
//! Validates every section before a run starts so that a bad value fails
//! fast with the offending `[section] key`.

use crate::domain::error::KabuwalkError;
use crate::domain::params::Direction;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::collections::BTreeMap;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> KabuwalkError {
    KabuwalkError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> KabuwalkError {
    KabuwalkError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn require_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, KabuwalkError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(missing(section, key)),
    }
}

/// Parses a `YYYY-MM-DD` key. Absent is `Ok(None)`; malformed is an error.
pub fn optional_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, KabuwalkError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD"))),
    }
}

fn require_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, KabuwalkError> {
    optional_date(config, section, key)?.ok_or_else(|| missing(section, key))
}

/// Parses `name:weight, name:weight` pairs.
pub fn parse_weights(section: &str, key: &str, value: &str) -> Result<BTreeMap<String, f64>, KabuwalkError> {
    let mut weights = BTreeMap::new();
    for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (name, weight) = token
            .split_once(':')
            .ok_or_else(|| invalid(section, key, format!("expected name:weight, got '{token}'")))?;
        let weight: f64 = weight
            .trim()
            .parse()
            .map_err(|_| invalid(section, key, format!("weight of '{}' is not a number", name.trim())))?;
        if !weight.is_finite() {
            return Err(invalid(section, key, format!("weight of '{}' must be finite", name.trim())));
        }
        weights.insert(name.trim().to_string(), weight);
    }
    if weights.is_empty() {
        return Err(missing(section, key));
    }
    Ok(weights)
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim() {
        "csv" => {
            require_string(config, "data", "prices_dir")?;
            require_string(config, "data", "benchmark_file")?;
        }
        "sqlite" => {
            require_string(config, "data", "database")?;
        }
        other => {
            return Err(invalid(
                "data",
                "source",
                format!("unknown source '{other}', expected csv or sqlite"),
            ));
        }
    }
    require_string(config, "data", "features_dir")?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    validate_schedule(config)?;
    validate_mode(config)?;
    validate_costs(config)?;
    validate_tolerances(config)?;
    validate_risk_free_rate(config)?;
    Ok(())
}

fn validate_schedule(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    let explicit = config.get_list("backtest", "rebalance_dates");
    if !explicit.is_empty() {
        let mut previous: Option<NaiveDate> = None;
        for s in &explicit {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                invalid("backtest", "rebalance_dates", format!("'{s}' is not YYYY-MM-DD"))
            })?;
            if previous.is_some_and(|p| date <= p) {
                return Err(invalid(
                    "backtest",
                    "rebalance_dates",
                    "dates must be strictly increasing",
                ));
            }
            previous = Some(date);
        }
        return Ok(());
    }

    let start = require_date(config, "backtest", "start_date")?;
    let end = require_date(config, "backtest", "end_date")?;
    if start >= end {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_mode(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    let mode = config
        .get_string("backtest", "mode")
        .unwrap_or_else(|| "fixed_horizon".to_string());
    match mode.trim() {
        "fixed_horizon" => {
            if config.get_int("backtest", "horizon_months", 1) < 1 {
                return Err(invalid(
                    "backtest",
                    "horizon_months",
                    "horizon_months must be at least 1",
                ));
            }
            Ok(())
        }
        "time_series" => Ok(()),
        other => Err(invalid(
            "backtest",
            "mode",
            format!("unknown mode '{other}', expected fixed_horizon or time_series"),
        )),
    }
}

fn validate_costs(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    for key in ["buy_cost_bps", "sell_cost_bps"] {
        let value = config.get_double("backtest", key, 0.0);
        if !(0.0..10_000.0).contains(&value) {
            return Err(invalid("backtest", key, format!("{key} must be in [0, 10000)")));
        }
    }
    Ok(())
}

fn validate_tolerances(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    if config.get_int("backtest", "snap_tolerance_days", 7) < 0 {
        return Err(invalid(
            "backtest",
            "snap_tolerance_days",
            "snap_tolerance_days must be non-negative",
        ));
    }
    if config.get_int("backtest", "entry_search_days", 31) < 1 {
        return Err(invalid(
            "backtest",
            "entry_search_days",
            "entry_search_days must be at least 1",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

pub fn validate_search_config(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    validate_split(config)?;
    validate_budget(config)?;
    validate_objective(config)?;
    validate_space(config)?;
    Ok(())
}

fn validate_split(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    let split = config
        .get_string("search", "split")
        .unwrap_or_else(|| "time_ordered".to_string());
    let ratio = config.get_double("search", "train_ratio", 0.7);
    let ratio_ok = ratio > 0.0 && ratio < 1.0;
    match split.trim() {
        "time_ordered" => {
            let train_end = optional_date(config, "search", "train_end_date")?;
            let holdout = optional_date(config, "search", "holdout_start_date")?;
            if train_end.is_none() && !ratio_ok {
                return Err(invalid("search", "train_ratio", "train_ratio must be in (0, 1)"));
            }
            if let (Some(end), Some(start)) = (train_end, holdout) {
                if start <= end {
                    return Err(invalid(
                        "search",
                        "holdout_start_date",
                        "holdout_start_date must be after train_end_date",
                    ));
                }
            }
            Ok(())
        }
        "shuffled" => {
            if !ratio_ok {
                return Err(invalid("search", "train_ratio", "train_ratio must be in (0, 1)"));
            }
            Ok(())
        }
        other => Err(invalid(
            "search",
            "split",
            format!("unknown split '{other}', expected time_ordered or shuffled"),
        )),
    }
}

fn validate_budget(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    let target = config.get_int("search", "target_trials", 50);
    if target < 1 {
        return Err(invalid("search", "target_trials", "target_trials must be at least 1"));
    }
    if config.get_int("search", "max_attempts", target * 10) < target {
        return Err(invalid(
            "search",
            "max_attempts",
            "max_attempts must be at least target_trials",
        ));
    }
    for (key, default) in [("batch_size", 8), ("top_k", 5), ("date_workers", 1)] {
        if config.get_int("search", key, default) < 1 {
            return Err(invalid("search", key, format!("{key} must be at least 1")));
        }
    }
    for (key, default) in [("startup_trials", 20), ("cpu_budget", 0)] {
        if config.get_int("search", key, default) < 0 {
            return Err(invalid("search", key, format!("{key} must be non-negative")));
        }
    }
    let scale = config.get_double("search", "refine_scale", 0.1);
    if !(scale > 0.0 && scale <= 1.0) {
        return Err(invalid("search", "refine_scale", "refine_scale must be in (0, 1]"));
    }
    Ok(())
}

fn validate_objective(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    let aggregate = config
        .get_string("search", "aggregate")
        .unwrap_or_else(|| "mean".to_string());
    match aggregate.trim() {
        "mean" | "median" => {}
        "trimmed_mean" => {
            let p = config.get_double("search", "trim_proportion", 0.1);
            if !(0.0..0.5).contains(&p) {
                return Err(invalid(
                    "search",
                    "trim_proportion",
                    "trim_proportion must be in [0, 0.5)",
                ));
            }
        }
        other => {
            return Err(invalid(
                "search",
                "aggregate",
                format!("unknown aggregate '{other}', expected mean, median or trimmed_mean"),
            ));
        }
    }
    if config.get_double("search", "downside_lambda", 1.0) < 0.0 {
        return Err(invalid(
            "search",
            "downside_lambda",
            "downside_lambda must be non-negative",
        ));
    }
    let q = config.get_double("search", "tail_quantile", 0.1);
    if !(0.0..1.0).contains(&q) {
        return Err(invalid("search", "tail_quantile", "tail_quantile must be in [0, 1)"));
    }
    if config.get_int("search", "min_tail_samples", 10) < 0 {
        return Err(invalid(
            "search",
            "min_tail_samples",
            "min_tail_samples must be non-negative",
        ));
    }
    Ok(())
}

fn validate_range(config: &dyn ConfigPort, min_key: &str, max_key: &str, defaults: (f64, f64)) -> Result<(), KabuwalkError> {
    let lo = config.get_double("search", min_key, defaults.0);
    let hi = config.get_double("search", max_key, defaults.1);
    if !(lo.is_finite() && hi.is_finite()) || lo > hi {
        return Err(invalid(
            "search",
            min_key,
            format!("{min_key} must not exceed {max_key}"),
        ));
    }
    Ok(())
}

fn validate_space(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    if config.get_list("search", "features").is_empty() {
        return Err(missing("search", "features"));
    }
    validate_range(config, "weight_min", "weight_max", (-1.0, 1.0))?;
    let lo = config.get_int("search", "top_n_min", 10);
    let hi = config.get_int("search", "top_n_max", 30);
    if lo < 1 || hi < lo {
        return Err(invalid(
            "search",
            "top_n_min",
            "top_n_min must be at least 1 and not exceed top_n_max",
        ));
    }
    if config.get_bool("search", "entry_timing", false) {
        validate_range(config, "timing_base_min", "timing_base_max", (40.0, 60.0))?;
        validate_range(config, "timing_max_min", "timing_max_max", (20.0, 80.0))?;
        validate_range(config, "timing_weight_min", "timing_weight_max", (0.0, 1.0))?;
        if config.get_double("search", "timing_min_width", 5.0) <= 0.0 {
            return Err(invalid(
                "search",
                "timing_min_width",
                "timing_min_width must be positive",
            ));
        }
    }
    Ok(())
}

pub fn validate_cache_config(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    if let Some(version) = config.get_string("cache", "version") {
        if version.trim().is_empty() || version.contains("__") || version.contains('/') {
            return Err(invalid(
                "cache",
                "version",
                "version must be non-empty and contain no '/' or '__'",
            ));
        }
    }
    if config.get_int("cache", "lookback_days", 120) < 1 {
        return Err(invalid("cache", "lookback_days", "lookback_days must be at least 1"));
    }
    if config.get_int("cache", "rsi_period", 14) < 0 {
        return Err(invalid("cache", "rsi_period", "rsi_period must be non-negative"));
    }
    Ok(())
}

/// The fixed parameters used by the `backtest` command.
pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), KabuwalkError> {
    let weights = require_string(config, "strategy", "weights")?;
    parse_weights("strategy", "weights", &weights)?;
    if config.get_int("strategy", "top_n", 0) < 1 {
        return Err(invalid("strategy", "top_n", "top_n must be at least 1"));
    }
    if config.get_string("strategy", "timing_base").is_some() {
        let base = config.get_double("strategy", "timing_base", f64::NAN);
        let max = config.get_double("strategy", "timing_max", f64::NAN);
        if !(base.is_finite() && max.is_finite()) {
            return Err(missing("strategy", "timing_max"));
        }
        let width = config.get_double("strategy", "timing_min_width", 5.0);
        Direction::from_thresholds(base, max, width)
            .map_err(|e| invalid("strategy", "timing_max", e.to_string()))?;
    }
    Ok(())
}
