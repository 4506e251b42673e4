//! Outcome resolver: fills forward returns for mature, unresolved signals.
//!
//! A signal becomes due once it is `DUE_AFTER_DAYS` calendar days old. The
//! resolver fetches about a month of daily closes from the signal date
//! forward and maps horizons onto that series **by index**: T+1 is the second
//! close on/after the signal date, T+3 the fourth, T+5 the sixth, T+10 the
//! eleventh. The calendar-day due check and the index-based offsets are
//! deliberately different measures; the due check only guesses when enough
//! sessions should exist.
//!
//! Every per-signal failure (provider error, short history, missing entry
//! price) leaves that signal pending and the batch moves on.

use std::collections::HashSet;

use chrono::{Duration, Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::data::provider::{DailyBar, HistoryProvider};
use crate::domain::{Horizon, Outcome, Signal, SignalId};
use crate::store::{now_utc, SignalStore, StoreError};

/// Calendar days after which a signal is considered mature enough for T+10.
///
/// This is an approximation of "eleven sessions have printed". Weekends and
/// holidays can leave T+10 null when the signal resolves, and a resolved
/// signal is never revisited. Overridable per run.
pub const DUE_AFTER_DAYS: i64 = 11;

/// Calendar days of history requested per signal.
pub const FETCH_WINDOW_DAYS: i64 = 31;

/// Minimum number of sessions on/after the signal date for any outcome.
const MIN_FORWARD_ROWS: usize = 2;

/// Why a due signal was left pending.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// `price_at_signal` is null or non-positive; the signal can never resolve.
    DegeneratePrice,
    /// The provider failed for this ticker.
    HistoryUnavailable(String),
    /// Too few rows came back.
    InsufficientHistory { total: usize, forward: usize },
}

/// Result of handling one due signal.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveStatus {
    Resolved,
    Skipped(SkipReason),
    /// Already resolved earlier in this same run.
    AlreadyResolved,
}

/// State for one resolver invocation, owned by the caller.
///
/// Holds the reference date, the maturity threshold and the ids resolved so
/// far. Repeated passes with the same run object never refetch a signal, even
/// if its outcome row disappeared from the store in between; such a signal is
/// reported as `AlreadyResolved` and left for a fresh run.
#[derive(Debug, Clone)]
pub struct ResolverRun {
    today: NaiveDate,
    due_after_days: i64,
    fetch_window_days: i64,
    resolved: HashSet<SignalId>,
    skipped: Vec<(SignalId, SkipReason)>,
}

impl ResolverRun {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            due_after_days: DUE_AFTER_DAYS,
            fetch_window_days: FETCH_WINDOW_DAYS,
            resolved: HashSet::new(),
            skipped: Vec::new(),
        }
    }

    /// A run dated with the local calendar day.
    pub fn today() -> Self {
        Self::new(Local::now().date_naive())
    }

    pub fn with_due_after_days(mut self, days: i64) -> Self {
        self.due_after_days = days;
        self
    }

    pub fn with_fetch_window_days(mut self, days: i64) -> Self {
        self.fetch_window_days = days.max(1);
        self
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.today
    }

    /// Latest signal date that counts as due.
    pub fn cutoff(&self) -> NaiveDate {
        self.today - Duration::days(self.due_after_days)
    }

    pub fn resolved_ids(&self) -> &HashSet<SignalId> {
        &self.resolved
    }

    /// Signals left pending by the last pass, with the reason.
    pub fn skipped(&self) -> &[(SignalId, SkipReason)] {
        &self.skipped
    }

    fn fetch_range(&self, signal_date: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = (signal_date + Duration::days(self.fetch_window_days)).min(self.today);
        (signal_date, end)
    }
}

/// Progress callback for a resolver pass.
pub trait ResolveProgress {
    fn on_start(&self, due: usize);
    fn on_signal(&self, index: usize, total: usize, signal: &Signal, status: &ResolveStatus);
    fn on_complete(&self, resolved: usize, total: usize);
}

/// Prints one line per signal to stdout.
pub struct StdoutProgress;

impl ResolveProgress for StdoutProgress {
    fn on_start(&self, due: usize) {
        println!("Resolving {due} due signal(s)...");
    }

    fn on_signal(&self, index: usize, total: usize, signal: &Signal, status: &ResolveStatus) {
        let label = format!(
            "[{}/{}] {} {} ({})",
            index + 1,
            total,
            signal.ticker,
            signal.signal_date,
            signal.scan_type
        );
        match status {
            ResolveStatus::Resolved => println!("  OK: {label}"),
            ResolveStatus::AlreadyResolved => println!("  SEEN: {label}"),
            ResolveStatus::Skipped(reason) => println!("  PENDING: {label}: {reason:?}"),
        }
    }

    fn on_complete(&self, resolved: usize, total: usize) {
        println!("\nResolved {resolved}/{total} due signal(s)");
    }
}

/// Map a history onto horizon closes by index from the signal date.
///
/// Fails with `InsufficientHistory` when there are fewer than two rows in
/// total or fewer than two rows on/after the signal date. Horizons beyond the
/// available rows are `None` individually.
pub fn forward_closes(
    bars: &[DailyBar],
    signal_date: NaiveDate,
) -> Result<[Option<f64>; 4], SkipReason> {
    let forward: Vec<f64> = bars
        .iter()
        .filter(|b| b.date >= signal_date && b.close.is_finite())
        .map(|b| b.close)
        .collect();

    if bars.len() < MIN_FORWARD_ROWS || forward.len() < MIN_FORWARD_ROWS {
        return Err(SkipReason::InsufficientHistory {
            total: bars.len(),
            forward: forward.len(),
        });
    }

    let mut closes = [None; 4];
    for horizon in Horizon::ALL {
        closes[horizon.slot()] = forward.get(horizon.days()).copied();
    }
    Ok(closes)
}

/// Resolve every due signal, returning how many received an outcome row.
///
/// Only storage failures are returned as errors; everything else leaves the
/// affected signal pending and is recorded in `run.skipped()`.
pub fn resolve_due_outcomes(
    store: &SignalStore,
    provider: &dyn HistoryProvider,
    run: &mut ResolverRun,
    progress: Option<&dyn ResolveProgress>,
) -> Result<usize, StoreError> {
    let due = store.due_signals(run.cutoff())?;
    let total = due.len();
    run.skipped.clear();

    info!(
        due = total,
        cutoff = %run.cutoff(),
        provider = provider.name(),
        "starting outcome resolution"
    );
    if let Some(p) = progress {
        p.on_start(total);
    }

    let mut resolved = 0;
    for (index, signal) in due.iter().enumerate() {
        let status = if run.resolved.contains(&signal.id) {
            ResolveStatus::AlreadyResolved
        } else {
            match resolve_one(store, provider, run, signal)? {
                Ok(()) => {
                    run.resolved.insert(signal.id);
                    resolved += 1;
                    ResolveStatus::Resolved
                }
                Err(reason) => {
                    run.skipped.push((signal.id, reason.clone()));
                    ResolveStatus::Skipped(reason)
                }
            }
        };
        if let Some(p) = progress {
            p.on_signal(index, total, signal, &status);
        }
    }

    info!(resolved, pending = run.skipped.len(), "outcome resolution finished");
    if let Some(p) = progress {
        p.on_complete(resolved, total);
    }
    Ok(resolved)
}

/// Resolve a single signal. The outer `Result` carries storage failures, the
/// inner one the reason a signal stays pending.
fn resolve_one(
    store: &SignalStore,
    provider: &dyn HistoryProvider,
    run: &ResolverRun,
    signal: &Signal,
) -> Result<Result<(), SkipReason>, StoreError> {
    if signal.base_price().is_none() {
        debug!(signal_id = %signal.id, ticker = %signal.ticker, "no usable entry price");
        return Ok(Err(SkipReason::DegeneratePrice));
    }

    let (start, end) = run.fetch_range(signal.signal_date);
    let bars = match provider.daily_history(&signal.ticker, start, end) {
        Ok(bars) => bars,
        Err(e) => {
            warn!(
                signal_id = %signal.id,
                ticker = %signal.ticker,
                error = %e,
                "history unavailable"
            );
            return Ok(Err(SkipReason::HistoryUnavailable(e.to_string())));
        }
    };

    let closes = match forward_closes(&bars, signal.signal_date) {
        Ok(closes) => closes,
        Err(reason) => {
            debug!(signal_id = %signal.id, ticker = %signal.ticker, ?reason, "history too short");
            return Ok(Err(reason));
        }
    };

    let Some(outcome) = Outcome::from_forward_closes(signal, closes, now_utc()) else {
        return Ok(Err(SkipReason::DegeneratePrice));
    };
    if !store.upsert_outcome(&outcome)? {
        return Ok(Err(SkipReason::DegeneratePrice));
    }
    debug!(signal_id = %signal.id, ticker = %signal.ticker, "outcome written");
    Ok(Ok(()))
}
