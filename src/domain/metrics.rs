//! Performance metrics and distribution statistics.

use chrono::NaiveDate;
use serde::Serialize;

/// Rebalances per year for the monthly schedule.
pub const PERIODS_PER_YEAR: f64 = 12.0;

/// One point on a cumulative value curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Risk and return metrics over a chained value curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of periods spent below a previous peak.
    pub max_drawdown_duration: i64,
    pub win_rate: f64,
    pub periods: usize,
}

impl SeriesMetrics {
    /// `curve` starts with the seed point; each later point is one period.
    pub fn compute(curve: &[ValuePoint], risk_free_rate: f64) -> Self {
        let initial = curve.first().map(|p| p.value).unwrap_or(1.0);
        let final_value = curve.last().map(|p| p.value).unwrap_or(initial);

        let total_return = if initial > 0.0 {
            (final_value - initial) / initial
        } else {
            0.0
        };

        let periods = curve.len().saturating_sub(1);
        let years = periods as f64 / PERIODS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0
        {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(curve);

        let period_rf = risk_free_rate / PERIODS_PER_YEAR;
        let returns = period_returns(curve);
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&returns, period_rf);

        SeriesMetrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            win_rate: win_rate(&returns),
            periods,
        }
    }
}

/// Summary statistics of a sample of per-period values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p10: f64,
    pub min: f64,
    pub max: f64,
    pub win_rate: f64,
}

impl DistributionSummary {
    /// `None` for an empty sample.
    pub fn compute(values: &[f64]) -> Option<Self> {
        let sorted = sorted_finite(values);
        if sorted.is_empty() {
            return None;
        }
        Some(Self {
            count: sorted.len(),
            mean: mean(&sorted)?,
            median: quantile_sorted(&sorted, 0.5)?,
            p10: quantile_sorted(&sorted, 0.1)?,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            win_rate: win_rate(&sorted),
        })
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Linear-interpolation quantile, `q` clamped to `[0, 1]`. Non-finite values
/// are ignored.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    quantile_sorted(&sorted_finite(values), q)
}

/// Mean after removing `floor(proportion * n)` values from each tail.
///
/// Falls back to the median when trimming would remove everything.
pub fn trimmed_mean(values: &[f64], proportion: f64) -> Option<f64> {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return None;
    }
    let cut = (proportion.clamp(0.0, 0.5) * sorted.len() as f64).floor() as usize;
    if 2 * cut >= sorted.len() {
        return quantile_sorted(&sorted, 0.5);
    }
    mean(&sorted[cut..sorted.len() - cut])
}

/// Share of strictly positive values; 0 for an empty sample.
pub fn win_rate(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|v| **v > 0.0).count() as f64 / values.len() as f64
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn period_returns(curve: &[ValuePoint]) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| {
            let prev = w[0].value;
            let curr = w[1].value;
            if prev > 0.0 { (curr - prev) / prev } else { 0.0 }
        })
        .collect()
}

fn compute_drawdown(curve: &[ValuePoint]) -> (f64, i64) {
    if curve.is_empty() {
        return (0.0, 0);
    }

    let mut peak = curve[0].value;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in curve {
        if point.value > peak {
            peak = point.value;
            current_dd_duration = 0;
        } else if peak > 0.0 && point.value < peak {
            let dd = (peak - point.value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(returns: &[f64], period_rf: f64) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let excess_return = mean - period_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
