//! T2 swing exit-rule sweep.
//!
//! Replays each resolved swing signal's forward returns under every
//! combination of minimum score, stop/target pair and holding period, and
//! reports the combination with the best mean realized return.
//!
//! The sweep is a pure function of the corpus and the grid: the same inputs
//! always produce the same rows in the same order, which the grid fingerprint
//! makes easy to check across runs.

use serde::{Deserialize, Serialize};
use sigtrack_core::{round2, ForwardReturns, Horizon, ResolvedSignal, SignalStore, StoreError};
use thiserror::Error;
use tracing::{debug, info};

/// Combinations with fewer surviving signals than this are not evaluated.
pub const MIN_SAMPLE: usize = 3;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exit parameters for one simulated swing trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitRule {
    /// Negative percent; exit when a checkpoint is at or below it.
    pub stop_pct: f64,
    /// Positive percent; exit when a checkpoint is at or above it.
    pub target_pct: f64,
    /// Checkpoints beyond this many days are ignored.
    pub max_hold_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Stop,
    Target,
    /// Held to the last eligible checkpoint.
    Time,
    /// No checkpoint within the holding period had data.
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedExit {
    pub return_pct: f64,
    pub reason: ExitReason,
    /// Checkpoint day the trade closed on, if any.
    pub day: Option<u32>,
}

/// Replay one signal under an exit rule.
///
/// Checkpoints are visited in ascending order and only those within
/// `max_hold_days` with data count. Within a checkpoint the stop is checked
/// before the target, and a triggered exit fills at exactly the threshold.
pub fn simulate_exit(returns: &ForwardReturns, rule: &ExitRule) -> SimulatedExit {
    let mut last = None;
    for horizon in Horizon::ALL {
        let day = horizon.days() as u32;
        if day > rule.max_hold_days {
            break;
        }
        let Some(value) = returns.get(horizon) else {
            continue;
        };
        if value <= rule.stop_pct {
            return SimulatedExit {
                return_pct: rule.stop_pct,
                reason: ExitReason::Stop,
                day: Some(day),
            };
        }
        if value >= rule.target_pct {
            return SimulatedExit {
                return_pct: rule.target_pct,
                reason: ExitReason::Target,
                day: Some(day),
            };
        }
        last = Some((day, value));
    }

    match last {
        Some((day, value)) => SimulatedExit {
            return_pct: value,
            reason: ExitReason::Time,
            day: Some(day),
        },
        None => SimulatedExit {
            return_pct: 0.0,
            reason: ExitReason::NoData,
            day: None,
        },
    }
}

/// Candidate lists for the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct T2Grid {
    pub min_scores: Vec<i64>,
    pub stop_target_pairs: Vec<(f64, f64)>,
    pub max_hold_days: Vec<u32>,
}

impl T2Grid {
    /// Reject grids that could never describe a sensible trade.
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.min_scores.is_empty() {
            return Err(SweepError::InvalidGrid("no min_score candidates".into()));
        }
        if self.stop_target_pairs.is_empty() {
            return Err(SweepError::InvalidGrid("no stop/target pairs".into()));
        }
        if self.max_hold_days.is_empty() {
            return Err(SweepError::InvalidGrid("no max_hold candidates".into()));
        }
        for &(stop, target) in &self.stop_target_pairs {
            if !stop.is_finite() || !target.is_finite() {
                return Err(SweepError::InvalidGrid(format!(
                    "non-finite stop/target ({stop}, {target})"
                )));
            }
            if stop >= 0.0 {
                return Err(SweepError::InvalidGrid(format!(
                    "stop {stop} must be negative"
                )));
            }
            if target <= 0.0 {
                return Err(SweepError::InvalidGrid(format!(
                    "target {target} must be positive"
                )));
            }
        }
        if self.max_hold_days.contains(&0) {
            return Err(SweepError::InvalidGrid("max_hold of 0 days".into()));
        }
        Ok(())
    }

    /// Number of combinations.
    pub fn len(&self) -> usize {
        self.min_scores.len() * self.stop_target_pairs.len() * self.max_hold_days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All combinations in evaluation order: min_score, then pair, then hold.
    pub fn combinations(&self) -> Vec<(i64, ExitRule)> {
        let mut out = Vec::with_capacity(self.len());
        for &min_score in &self.min_scores {
            for &(stop_pct, target_pct) in &self.stop_target_pairs {
                for &max_hold_days in &self.max_hold_days {
                    out.push((
                        min_score,
                        ExitRule {
                            stop_pct,
                            target_pct,
                            max_hold_days,
                        },
                    ));
                }
            }
        }
        out
    }
}

/// One evaluated grid combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct T2Row {
    pub min_score: i64,
    pub stop_pct: f64,
    pub target_pct: f64,
    pub max_hold_days: u32,
    pub n_signals: usize,
    /// Mean simulated return, percent, rounded to 2 decimals.
    pub avg_return: f64,
    /// Percent of simulated returns above zero, rounded to 2 decimals.
    pub win_rate: f64,
}

impl T2Row {
    pub fn rule(&self) -> ExitRule {
        ExitRule {
            stop_pct: self.stop_pct,
            target_pct: self.target_pct,
            max_hold_days: self.max_hold_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct T2SweepResult {
    pub best: Option<T2Row>,
    /// Every combination that met the sample minimum, in grid order.
    pub grid: Vec<T2Row>,
    /// Resolved signals that entered the sweep before score filtering.
    pub corpus_size: usize,
    /// blake3 hex digest of `grid`.
    pub fingerprint: String,
}

/// A sweep input: score and forward returns of one resolved signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingSample {
    pub score: i64,
    pub returns: ForwardReturns,
}

impl From<&ResolvedSignal> for SwingSample {
    fn from(r: &ResolvedSignal) -> Self {
        Self {
            score: r.signal.score,
            returns: r.outcome.returns(),
        }
    }
}

/// A grid row together with the unrounded statistics it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub row: T2Row,
    pub mean: f64,
    pub win_rate: f64,
}

/// Evaluate one combination, or `None` below the sample minimum.
pub fn evaluate_rule(
    samples: &[SwingSample],
    min_score: i64,
    rule: &ExitRule,
) -> Option<Evaluation> {
    let returns: Vec<f64> = samples
        .iter()
        .filter(|s| s.score >= min_score)
        .map(|s| simulate_exit(&s.returns, rule).return_pct)
        .collect();
    if returns.len() < MIN_SAMPLE {
        return None;
    }

    let n = returns.len() as f64;
    let wins = returns.iter().filter(|r| **r > 0.0).count() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let win_rate = 100.0 * wins / n;
    Some(Evaluation {
        row: T2Row {
            min_score,
            stop_pct: rule.stop_pct,
            target_pct: rule.target_pct,
            max_hold_days: rule.max_hold_days,
            n_signals: returns.len(),
            avg_return: round2(mean),
            win_rate: round2(win_rate),
        },
        mean,
        win_rate,
    })
}

/// Highest mean, then highest win rate; earlier rows win remaining ties.
///
/// Compares the unrounded statistics, so means that only differ past the
/// reported precision still rank.
pub fn select_best(evaluated: &[Evaluation]) -> Option<&Evaluation> {
    let mut best: Option<&Evaluation> = None;
    for e in evaluated {
        let better = match best {
            None => true,
            Some(b) => e.mean > b.mean || (e.mean == b.mean && e.win_rate > b.win_rate),
        };
        if better {
            best = Some(e);
        }
    }
    best
}

/// Stable digest of evaluated rows.
pub fn grid_fingerprint(rows: &[T2Row]) -> String {
    let json = serde_json::to_string(rows).unwrap_or_default();
    blake3::hash(json.as_bytes()).to_hex().to_string()
}

/// Run the sweep over an in-memory corpus.
pub fn sweep_samples(samples: &[SwingSample], grid: &T2Grid) -> Result<T2SweepResult, SweepError> {
    sweep_samples_with_progress(samples, grid, |_, _| {})
}

/// Run the sweep, reporting `(done, total)` after each combination.
pub fn sweep_samples_with_progress<F>(
    samples: &[SwingSample],
    grid: &T2Grid,
    mut on_progress: F,
) -> Result<T2SweepResult, SweepError>
where
    F: FnMut(usize, usize),
{
    grid.validate()?;

    let combos = grid.combinations();
    let total = combos.len();
    let mut evaluated = Vec::new();
    for (i, (min_score, rule)) in combos.iter().enumerate() {
        match evaluate_rule(samples, *min_score, rule) {
            Some(e) => evaluated.push(e),
            None => debug!(min_score, ?rule, "too few signals, skipped"),
        }
        on_progress(i + 1, total);
    }

    let best = select_best(&evaluated).map(|e| e.row.clone());
    let rows: Vec<T2Row> = evaluated.into_iter().map(|e| e.row).collect();
    Ok(T2SweepResult {
        fingerprint: grid_fingerprint(&rows),
        best,
        grid: rows,
        corpus_size: samples.len(),
    })
}

/// Load the swing corpus from the store and sweep it.
pub fn run_t2_sweep(
    store: &SignalStore,
    scan_types: &[String],
    grid: &T2Grid,
) -> Result<T2SweepResult, SweepError> {
    grid.validate()?;

    let whitelist: Vec<String> = scan_types
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let corpus = store.resolved_for_scan_types(&whitelist)?;
    let samples: Vec<SwingSample> = corpus.iter().map(SwingSample::from).collect();

    let result = sweep_samples(&samples, grid)?;
    match &result.best {
        Some(best) => info!(
            corpus = result.corpus_size,
            evaluated = result.grid.len(),
            combos = grid.len(),
            min_score = best.min_score,
            stop = best.stop_pct,
            target = best.target_pct,
            max_hold = best.max_hold_days,
            avg_return = best.avg_return,
            "swing sweep finished"
        ),
        None => info!(
            corpus = result.corpus_size,
            combos = grid.len(),
            "swing sweep found no combination with enough signals"
        ),
    }
    Ok(result)
}
