//! Train / test / holdout partition of rebalance dates.

use crate::domain::error::KabuwalkError;
use crate::domain::schedule::RebalanceDates;
use chrono::{Duration, Months, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;

/// Where the training window ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TrainBoundary {
    /// Dates on or before `date` are train.
    EndDate { date: NaiveDate },
    /// The first `ratio` share of the pre-holdout dates are train.
    Ratio { ratio: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitConfig {
    pub train: TrainBoundary,
    pub holdout_start: Option<NaiveDate>,
    /// Fixed investment horizon; enables the maturity filter.
    pub horizon_months: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSplit {
    pub train: Vec<NaiveDate>,
    pub test: Vec<NaiveDate>,
    pub holdout: Vec<NaiveDate>,
    pub train_end: NaiveDate,
    pub holdout_start: Option<NaiveDate>,
    /// Dates dropped because their outcome matures after the window end.
    pub excluded_immature: Vec<NaiveDate>,
    /// Exploratory split that ignores time order.
    pub shuffled: bool,
}

fn split_error(key: &str, reason: impl Into<String>) -> KabuwalkError {
    KabuwalkError::ConfigInvalid {
        section: "search".into(),
        key: key.into(),
        reason: reason.into(),
    }
}

/// `date + months`, saturating at the far future.
fn matures_on(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

impl EvaluationSplit {
    /// Time-ordered split: every test and holdout date is strictly later
    /// than every train date.
    ///
    /// With a fixed horizon `H`, a train date is kept only if
    /// `date + H <= train_end`, and a test date only if it matures before the
    /// holdout starts.
    pub fn time_ordered(
        dates: &RebalanceDates,
        config: &SplitConfig,
    ) -> Result<Self, KabuwalkError> {
        let all = dates.as_slice();
        let (pre_holdout, holdout): (Vec<NaiveDate>, Vec<NaiveDate>) = match config.holdout_start
        {
            Some(start) => all.iter().partition(|d| **d < start),
            None => (all.to_vec(), Vec::new()),
        };

        let train_end = match config.train {
            TrainBoundary::EndDate { date } => date,
            TrainBoundary::Ratio { ratio } => {
                if !(ratio > 0.0 && ratio < 1.0) {
                    return Err(split_error("train_ratio", format!("{ratio} not in (0, 1)")));
                }
                if pre_holdout.len() < 2 {
                    return Err(split_error(
                        "train_ratio",
                        "need at least two dates before the holdout",
                    ));
                }
                let n = ((pre_holdout.len() as f64 * ratio).floor() as usize)
                    .clamp(1, pre_holdout.len() - 1);
                pre_holdout[n - 1]
            }
        };
        if let Some(start) = config.holdout_start.filter(|s| *s <= train_end) {
            return Err(split_error(
                "holdout_start_date",
                format!("{start} must be after train end {train_end}"),
            ));
        }

        let mut excluded_immature = Vec::new();
        let mut train = Vec::new();
        let mut test = Vec::new();
        let test_end = config.holdout_start.map(|s| s - Duration::days(1));
        for date in pre_holdout {
            let (bucket, window_end) = if date <= train_end {
                (&mut train, Some(train_end))
            } else {
                (&mut test, test_end)
            };
            let mature = match (config.horizon_months, window_end) {
                (Some(h), Some(end)) => matures_on(date, h) <= end,
                _ => true,
            };
            if mature {
                bucket.push(date);
            } else {
                excluded_immature.push(date);
            }
        }

        if train.is_empty() {
            return Err(split_error("train_end_date", "no usable train dates"));
        }
        if test.is_empty() {
            return Err(split_error("train_end_date", "no usable test dates"));
        }

        Ok(Self {
            train,
            test,
            holdout,
            train_end,
            holdout_start: config.holdout_start,
            excluded_immature,
            shuffled: false,
        })
    }

    /// Exploratory split that assigns dates to train and test at random.
    /// Never use its results operationally: test dates may precede train
    /// dates.
    pub fn shuffled(
        dates: &RebalanceDates,
        ratio: f64,
        rng: &mut StdRng,
    ) -> Result<Self, KabuwalkError> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(split_error("train_ratio", format!("{ratio} not in (0, 1)")));
        }
        let mut all = dates.as_slice().to_vec();
        if all.len() < 2 {
            return Err(split_error("train_ratio", "need at least two dates"));
        }
        all.shuffle(rng);
        let n = ((all.len() as f64 * ratio).floor() as usize).clamp(1, all.len() - 1);
        let mut train = all[..n].to_vec();
        let mut test = all[n..].to_vec();
        train.sort();
        test.sort();
        let train_end = train[train.len() - 1];
        Ok(Self {
            train,
            test,
            holdout: Vec::new(),
            train_end,
            holdout_start: None,
            excluded_immature: Vec::new(),
            shuffled: true,
        })
    }

    /// Cutoff for train evaluation.
    pub fn train_as_of(&self, data_end: NaiveDate) -> NaiveDate {
        if self.shuffled {
            data_end
        } else {
            self.train_end
        }
    }

    /// Cutoff for test evaluation: the day before the holdout starts.
    pub fn test_as_of(&self, data_end: NaiveDate) -> NaiveDate {
        match self.holdout_start {
            Some(start) if !self.shuffled => (start - Duration::days(1)).min(data_end),
            _ => data_end,
        }
    }

    pub fn holdout_as_of(&self, data_end: NaiveDate) -> NaiveDate {
        data_end
    }
}
