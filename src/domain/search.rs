//! Seeded, direction-constrained parameter search.
//!
//! Candidates are proposed sequentially from one explicitly seeded RNG and
//! only then evaluated in parallel, so the proposal sequence never depends on
//! thread scheduling. Results are collected by candidate index.

use crate::domain::error::{KabuwalkError, SkipCounts, SkipReason};
use crate::domain::objective::{ObjectiveConfig, ObjectiveScore};
use crate::domain::parallel::chunk_len;
use crate::domain::params::{Direction, EntryTiming, StrategyParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Closed interval of a continuous parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn width(&self) -> f64 {
        (self.max - self.min).max(0.0)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max.max(self.min))
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        sample_between(rng, self.min, self.max)
    }
}

fn sample_between(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    if hi > lo { rng.gen_range(lo..=hi) } else { lo }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSpace {
    pub base: Range,
    pub max: Range,
    /// Minimum `|max - base|` for a direction to be unambiguous.
    pub min_width: f64,
    pub weight: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    /// Feature columns that receive a sampled weight.
    pub features: Vec<String>,
    pub weight: Range,
    /// Inclusive bounds on the number of holdings.
    pub top_n: (usize, usize),
    pub entry_timing: Option<TimingSpace>,
}

impl SearchSpace {
    fn top_n_bounds(&self) -> (usize, usize) {
        let (lo, hi) = self.top_n;
        (lo.max(1), hi.max(lo.max(1)))
    }
}

/// Draws a fresh parameter vector.
pub fn sample_params(space: &SearchSpace, rng: &mut StdRng) -> Result<StrategyParams, SkipReason> {
    let weights: BTreeMap<String, f64> = space
        .features
        .iter()
        .map(|f| (f.clone(), space.weight.sample(rng)))
        .collect();
    let (lo, hi) = space.top_n_bounds();
    let top_n = rng.gen_range(lo..=hi);
    let entry_timing = match &space.entry_timing {
        Some(timing) => Some(sample_timing(timing, rng)?),
        None => None,
    };
    Ok(StrategyParams {
        weights,
        top_n,
        entry_timing,
    })
}

/// Samples `base`, then the direction, then `max` on the chosen side of
/// `base` at least `min_width` away.
pub fn sample_timing(space: &TimingSpace, rng: &mut StdRng) -> Result<EntryTiming, SkipReason> {
    let base = space.base.sample(rng);
    let w = space.min_width;

    let momentum = (space.max.min.max(base + w), space.max.max);
    let reversal = (space.max.min, space.max.max.min(base - w));
    let momentum_ok = momentum.0 <= momentum.1;
    let reversal_ok = reversal.0 <= reversal.1;

    let direction = match (momentum_ok, reversal_ok) {
        (true, true) => {
            if rng.gen_bool(0.5) {
                Direction::Momentum
            } else {
                Direction::Reversal
            }
        }
        (true, false) => Direction::Momentum,
        (false, true) => Direction::Reversal,
        (false, false) => {
            return Err(SkipReason::AmbiguousDirection {
                base,
                max: base,
                min_width: w,
            });
        }
    };

    let (lo, hi) = match direction {
        Direction::Momentum => momentum,
        Direction::Reversal => reversal,
    };
    let timing = EntryTiming {
        direction,
        base,
        max: sample_between(rng, lo, hi),
        weight: space.weight.sample(rng),
    };
    timing.validate(w)?;
    Ok(timing)
}

/// Local move around `parent`; the direction is inherited and re-validated.
pub fn perturb_params(
    parent: &StrategyParams,
    space: &SearchSpace,
    scale: f64,
    rng: &mut StdRng,
) -> Result<StrategyParams, SkipReason> {
    let jitter = |range: &Range, value: f64, rng: &mut StdRng| {
        let step = range.width() * scale;
        if step > 0.0 {
            range.clamp(value + rng.gen_range(-step..=step))
        } else {
            range.clamp(value)
        }
    };

    let weights: BTreeMap<String, f64> = parent
        .weights
        .iter()
        .map(|(f, w)| (f.clone(), jitter(&space.weight, *w, rng)))
        .collect();

    let (lo, hi) = space.top_n_bounds();
    let delta = (((hi - lo) as f64 * scale).round() as i64).max(1);
    let top_n = (parent.top_n as i64 + rng.gen_range(-delta..=delta)).clamp(lo as i64, hi as i64)
        as usize;

    let entry_timing = match (&parent.entry_timing, &space.entry_timing) {
        (Some(t), Some(ts)) => {
            let timing = EntryTiming {
                direction: t.direction,
                base: jitter(&ts.base, t.base, rng),
                max: jitter(&ts.max, t.max, rng),
                weight: jitter(&ts.weight, t.weight, rng),
            };
            timing.validate(ts.min_width)?;
            Some(timing)
        }
        (parent_timing, _) => parent_timing.clone(),
    };

    Ok(StrategyParams {
        weights,
        top_n,
        entry_timing,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CandidateOrigin {
    Random,
    Refined { parent: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub index: usize,
    pub params: StrategyParams,
    pub origin: CandidateOrigin,
}

impl Candidate {
    pub fn direction(&self) -> Option<Direction> {
        self.params.direction()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Successfully evaluated candidates to collect.
    pub target_trials: usize,
    /// Proposals allowed in total, pruned ones included.
    pub max_attempts: usize,
    pub seed: u64,
    /// Candidates proposed before each parallel evaluation round. Fixed so
    /// results do not depend on the machine.
    pub batch_size: usize,
    /// Random proposals before refinement starts.
    pub startup_trials: usize,
    /// Perturbation size as a fraction of each parameter range.
    pub refine_scale: f64,
    /// Candidates carried to test validation and used as refinement parents.
    pub top_k: usize,
    pub candidate_workers: usize,
    pub objective: ObjectiveConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            target_trials: 50,
            max_attempts: 500,
            seed: 42,
            batch_size: 8,
            startup_trials: 20,
            refine_scale: 0.1,
            top_k: 5,
            candidate_workers: 1,
            objective: ObjectiveConfig::default(),
        }
    }
}

/// What the search needs back from one candidate evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialEvaluation {
    /// Per-period annualized excess returns.
    pub excess: Vec<f64>,
    pub skips: SkipCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateResult {
    pub candidate: Candidate,
    pub score: ObjectiveScore,
    pub skips: SkipCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchDiagnostics {
    pub attempts: usize,
    pub evaluated: usize,
    pub pruned: usize,
    pub no_evaluable: usize,
    pub target_reached: bool,
    /// Prune and no-evaluable reasons, plus every period skip seen.
    pub skips: SkipCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Evaluated candidates in index order.
    pub results: Vec<CandidateResult>,
    /// Candidates that produced no evaluable period, scored with the sentinel.
    pub unevaluable: Vec<CandidateResult>,
    pub diagnostics: SearchDiagnostics,
}

impl SearchOutcome {
    /// Highest score; ties go to the lowest candidate index.
    pub fn best(&self) -> Option<&CandidateResult> {
        let mut best: Option<&CandidateResult> = None;
        for r in &self.results {
            if best.is_none_or(|b| r.score.score > b.score.score) {
                best = Some(r);
            }
        }
        best
    }

    /// Evaluated candidates by descending score, then ascending index.
    pub fn ranked(&self) -> Vec<&CandidateResult> {
        ranked(&self.results)
    }
}

fn ranked(results: &[CandidateResult]) -> Vec<&CandidateResult> {
    let mut out: Vec<&CandidateResult> = results.iter().collect();
    out.sort_by(|a, b| {
        b.score
            .score
            .total_cmp(&a.score.score)
            .then_with(|| a.candidate.index.cmp(&b.candidate.index))
    });
    out
}

/// Runs the search until `target_trials` candidates have been evaluated or
/// `max_attempts` proposals have been made.
///
/// `evaluate` is called concurrently; any structural error it returns
/// aborts the search.
pub fn run_search<F>(
    space: &SearchSpace,
    config: &SearchConfig,
    evaluate: F,
) -> Result<SearchOutcome, KabuwalkError>
where
    F: Fn(&StrategyParams) -> Result<TrialEvaluation, KabuwalkError> + Sync,
{
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut outcome = SearchOutcome::default();
    let mut next_index = 0usize;

    while outcome.results.len() < config.target_trials
        && outcome.diagnostics.attempts < config.max_attempts
    {
        let remaining = config.target_trials - outcome.results.len();
        let batch = config.batch_size.max(1).min(remaining);
        let proposals = propose_batch(space, config, &outcome, batch, &mut next_index, &mut rng);

        for (index, reason) in &proposals.pruned {
            debug!(candidate = index, reason = %reason, "candidate pruned");
            outcome.diagnostics.pruned += 1;
            outcome.diagnostics.skips.record(reason);
        }
        outcome.diagnostics.attempts += proposals.attempts;

        let evaluations: Vec<(Candidate, Result<TrialEvaluation, KabuwalkError>)> = proposals
            .candidates
            .into_par_iter()
            .with_min_len(chunk_len(batch, config.candidate_workers))
            .map(|c| {
                let result = evaluate(&c.params);
                (c, result)
            })
            .collect();

        for (candidate, result) in evaluations {
            let trial = match result {
                Ok(trial) => trial,
                Err(err) => {
                    let reason = err.into_skip()?;
                    let mut skips = SkipCounts::default();
                    skips.record(&reason);
                    TrialEvaluation {
                        excess: Vec::new(),
                        skips,
                    }
                }
            };
            outcome.diagnostics.skips.merge(&trial.skips);
            let score = config.objective.score(&trial.excess);
            let result = CandidateResult {
                candidate,
                score,
                skips: trial.skips,
            };
            if score.is_evaluable() {
                debug!(
                    candidate = result.candidate.index,
                    score = score.score,
                    periods = score.periods,
                    "candidate evaluated"
                );
                outcome.results.push(result);
            } else {
                debug!(candidate = result.candidate.index, "candidate has no evaluable periods");
                outcome.diagnostics.no_evaluable += 1;
                outcome
                    .diagnostics
                    .skips
                    .record(&SkipReason::NoEvaluablePeriods);
                outcome.unevaluable.push(result);
            }
        }
    }

    outcome.diagnostics.evaluated = outcome.results.len();
    outcome.diagnostics.target_reached = outcome.results.len() >= config.target_trials;
    info!(
        evaluated = outcome.diagnostics.evaluated,
        pruned = outcome.diagnostics.pruned,
        no_evaluable = outcome.diagnostics.no_evaluable,
        attempts = outcome.diagnostics.attempts,
        "search finished"
    );
    Ok(outcome)
}

struct Proposals {
    candidates: Vec<Candidate>,
    pruned: Vec<(usize, SkipReason)>,
    attempts: usize,
}

fn propose_batch(
    space: &SearchSpace,
    config: &SearchConfig,
    outcome: &SearchOutcome,
    batch: usize,
    next_index: &mut usize,
    rng: &mut StdRng,
) -> Proposals {
    let parents: Vec<&CandidateResult> = ranked(&outcome.results)
        .into_iter()
        .take(config.top_k.max(1))
        .collect();
    let refining = outcome.results.len() >= config.startup_trials && !parents.is_empty();

    let mut proposals = Proposals {
        candidates: Vec::new(),
        pruned: Vec::new(),
        attempts: 0,
    };
    while proposals.candidates.len() < batch
        && outcome.diagnostics.attempts + proposals.attempts < config.max_attempts
    {
        proposals.attempts += 1;
        let index = *next_index;
        *next_index += 1;

        let (params, origin) = if refining && rng.gen_bool(0.5) {
            let parent = parents[rng.gen_range(0..parents.len())];
            (
                perturb_params(&parent.candidate.params, space, config.refine_scale, rng),
                CandidateOrigin::Refined {
                    parent: parent.candidate.index,
                },
            )
        } else {
            (sample_params(space, rng), CandidateOrigin::Random)
        };

        match params {
            Ok(params) => proposals.candidates.push(Candidate {
                index,
                params,
                origin,
            }),
            Err(reason) => proposals.pruned.push((index, reason)),
        }
    }
    proposals
}
