//! RSI oscillator used for entry timing.
//!
//! Wilder's smoothing:
//! - First average: simple mean of gains/losses over the first `period` changes
//! - Subsequent: avg = (prev_avg * (period - 1) + current) / period
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss); 100 when avg_loss is zero.

use std::collections::BTreeMap;

use crate::domain::feature_cache::ClosePoint;

/// Latest RSI over `closes`, or `None` with fewer than `period` changes.
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| if c > 0.0 { c } else { 0.0 };
    let loss = |c: f64| if c < 0.0 { -c } else { 0.0 };

    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / period as f64;

    for &c in &changes[period..] {
        avg_gain = (avg_gain * (period - 1) as f64 + gain(c)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss(c)) / period as f64;
    }

    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    };
    Some(rsi)
}

/// Latest RSI per security from cached close histories.
pub fn rsi_by_code(
    histories: &BTreeMap<String, Vec<ClosePoint>>,
    period: usize,
) -> BTreeMap<String, f64> {
    histories
        .iter()
        .filter_map(|(code, points)| {
            let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
            latest_rsi(&closes, period).map(|rsi| (code.clone(), rsi))
        })
        .collect()
}
