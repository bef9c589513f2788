//! Core domain types and logic.

pub mod price;
pub mod price_series;
pub mod features;
pub mod portfolio;
pub mod params;
pub mod entry_timing;
pub mod selector;
pub mod cost;
pub mod schedule;
pub mod evaluator;
pub mod feature_cache;
pub mod metrics;
pub mod objective;
pub mod timeseries;
pub mod backtest;
pub mod parallel;
pub mod split;
pub mod search;
pub mod report;
pub mod driver;
pub mod config_validation;
pub mod error;
