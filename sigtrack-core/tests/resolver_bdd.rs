//! BDD tests for signal recording, outcome resolution and scan statistics.
//!
//! Every scenario runs against an in-memory SQLite store and a
//! `MemoryProvider`, so no network access is needed.

use std::cell::RefCell;

use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use sigtrack_core::data::MemoryProvider;
use sigtrack_core::{
    resolve_due_outcomes, Horizon, ResolveProgress, ResolveStatus, ResolverRun, Signal,
    SignalState, SignalStore, SkipReason,
};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// One close per calendar day starting at `start`.
fn daily(start: NaiveDate, closes: &[f64]) -> Vec<(NaiveDate, f64)> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| (start + Duration::days(i as i64), *c))
        .collect()
}

#[test]
fn bdd_scenario_aapl_swing_signal_resolves_all_horizons() {
    // GIVEN an AAPL "Swing" signal with score 80 at $100.00 on day D
    let day = d("2024-03-04");
    let store = SignalStore::open_in_memory().unwrap();
    let id = store
        .record_signal_on(day, "AAPL", "Swing", 80, 100.00)
        .unwrap()
        .unwrap();

    // AND synthetic closes D+1=98, D+3=103, D+5=101, D+10=97
    let mut provider = MemoryProvider::new();
    provider.insert_closes(
        "AAPL",
        &daily(
            day,
            &[100.0, 98.0, 99.0, 103.0, 102.0, 101.0, 100.0, 99.0, 98.0, 97.5, 97.0],
        ),
    );

    // WHEN resolving on D+11
    let mut run = ResolverRun::new(day + Duration::days(11));
    let resolved = resolve_due_outcomes(&store, &provider, &mut run, None).unwrap();

    // THEN the signal resolves with the expected percent changes
    assert_eq!(resolved, 1);
    let outcome = store.outcome(id).unwrap().unwrap();
    assert_eq!(outcome.price_t1, Some(98.0));
    assert_eq!(outcome.pct_t1, Some(-2.0));
    assert_eq!(outcome.pct_t3, Some(3.0));
    assert_eq!(outcome.pct_t5, Some(1.0));
    assert_eq!(outcome.pct_t10, Some(-3.0));
    assert!(run.resolved_ids().contains(&id));
    assert_eq!(
        store.signal_state(id, day + Duration::days(11), 11).unwrap(),
        Some(SignalState::Resolved)
    );
}

#[test]
fn bdd_scenario_second_pass_is_a_no_op() {
    // GIVEN a store with one resolved signal
    let day = d("2024-03-04");
    let store = SignalStore::open_in_memory().unwrap();
    store
        .record_signal_on(day, "MSFT", "Swing", 70, "$400.00")
        .unwrap();
    let mut provider = MemoryProvider::new();
    provider.insert_closes("MSFT", &daily(day, &[400.0, 404.0, 408.0, 412.0]));

    let today = day + Duration::days(12);
    let first =
        resolve_due_outcomes(&store, &provider, &mut ResolverRun::new(today), None).unwrap();
    assert_eq!(first, 1);
    let before = store.outcomes().unwrap();

    // WHEN the resolver runs again with no newly-due signals
    let second =
        resolve_due_outcomes(&store, &provider, &mut ResolverRun::new(today), None).unwrap();

    // THEN nothing is resolved and stored outcomes are unchanged
    assert_eq!(second, 0);
    assert_eq!(store.outcomes().unwrap(), before);
    assert_eq!(provider.requests().len(), 1);
}

/// Records the status reported for each signal.
#[derive(Default)]
struct StatusLog(RefCell<Vec<ResolveStatus>>);

impl ResolveProgress for StatusLog {
    fn on_start(&self, _due: usize) {}

    fn on_signal(&self, _index: usize, _total: usize, _signal: &Signal, status: &ResolveStatus) {
        self.0.borrow_mut().push(status.clone());
    }

    fn on_complete(&self, _resolved: usize, _total: usize) {}
}

#[test]
fn bdd_scenario_same_run_never_refetches_a_resolved_signal() {
    // GIVEN a signal resolved by a run
    let day = d("2024-03-04");
    let store = SignalStore::open_in_memory().unwrap();
    store
        .record_signal_on(day, "NVDA", "Swing", 75, "$800.00")
        .unwrap();
    let mut provider = MemoryProvider::new();
    provider.insert_closes("NVDA", &daily(day, &[800.0, 808.0, 816.0, 824.0]));
    let mut run = ResolverRun::new(day + Duration::days(12));
    assert_eq!(resolve_due_outcomes(&store, &provider, &mut run, None).unwrap(), 1);

    // AND its outcome row removed behind the resolver's back
    store.connection().execute("DELETE FROM outcomes", []).unwrap();

    // WHEN the same run passes again
    let log = StatusLog::default();
    let again = resolve_due_outcomes(&store, &provider, &mut run, Some(&log)).unwrap();

    // THEN the signal is reported as already resolved and not fetched again
    assert_eq!(again, 0);
    assert_eq!(*log.0.borrow(), vec![ResolveStatus::AlreadyResolved]);
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(store.outcome_count().unwrap(), 0);

    // AND a fresh run resolves it
    let mut fresh = ResolverRun::new(day + Duration::days(12));
    assert_eq!(resolve_due_outcomes(&store, &provider, &mut fresh, None).unwrap(), 1);
    assert_eq!(provider.requests().len(), 2);
}

#[test]
fn bdd_scenario_due_set_only_shrinks() {
    // GIVEN three due signals, one of which has no data yet
    let day = d("2024-03-04");
    let store = SignalStore::open_in_memory().unwrap();
    for ticker in ["AAA", "BBB", "CCC"] {
        store.record_signal_on(day, ticker, "Swing", 60, 10.0).unwrap();
    }
    let mut provider = MemoryProvider::new();
    provider.insert_closes("AAA", &daily(day, &[10.0, 11.0]));
    provider.insert_closes("BBB", &daily(day, &[10.0, 9.0]));

    let today = day + Duration::days(11);
    let cutoff = ResolverRun::new(today).cutoff();
    let due_before = store.due_signals(cutoff).unwrap();
    assert_eq!(due_before.len(), 3);

    // WHEN resolving
    resolve_due_outcomes(&store, &provider, &mut ResolverRun::new(today), None).unwrap();

    // THEN resolved signals never reappear in the due selection
    let due_after = store.due_signals(cutoff).unwrap();
    assert_eq!(due_after.len(), 1);
    assert_eq!(due_after[0].ticker, "CCC");
    assert!(due_after.iter().all(|s| due_before.contains(s)));
}

#[test]
fn bdd_scenario_one_failing_ticker_does_not_abort_the_batch() {
    // GIVEN two due signals where the provider is down for one ticker
    let day = d("2024-03-04");
    let store = SignalStore::open_in_memory().unwrap();
    let bad = store
        .record_signal_on(day, "DOWN", "Swing", 60, 50.0)
        .unwrap()
        .unwrap();
    let good = store
        .record_signal_on(day, "UP", "Swing", 60, 50.0)
        .unwrap()
        .unwrap();

    let mut provider = MemoryProvider::new();
    provider.insert_closes("DOWN", &daily(day, &[50.0, 51.0]));
    provider.fail_ticker("DOWN");
    provider.insert_closes("UP", &daily(day, &[50.0, 55.0]));

    // WHEN resolving
    let mut run = ResolverRun::new(day + Duration::days(11));
    let resolved = resolve_due_outcomes(&store, &provider, &mut run, None).unwrap();

    // THEN the healthy ticker resolves and the failing one stays pending
    assert_eq!(resolved, 1);
    assert!(store.outcome(good).unwrap().is_some());
    assert!(store.outcome(bad).unwrap().is_none());
    assert_eq!(run.skipped().len(), 1);
    assert_eq!(run.skipped()[0].0, bad);
    assert!(matches!(run.skipped()[0].1, SkipReason::HistoryUnavailable(_)));
}

#[test]
fn bdd_scenario_degenerate_prices_never_fetch_or_write() {
    // GIVEN signals with missing, zero and unparsable entry prices
    let day = d("2024-03-04");
    let store = SignalStore::open_in_memory().unwrap();
    store.record_signal_on(day, "NUL", "Swing", 60, Value::Null).unwrap();
    store.record_signal_on(day, "ZER", "Swing", 60, 0.0).unwrap();
    store.record_signal_on(day, "TXT", "Swing", 60, "call me").unwrap();

    let mut provider = MemoryProvider::new();
    for t in ["NUL", "ZER", "TXT"] {
        provider.insert_closes(t, &daily(day, &[1.0, 2.0, 3.0]));
    }

    // WHEN resolving
    let mut run = ResolverRun::new(day + Duration::days(11));
    let resolved = resolve_due_outcomes(&store, &provider, &mut run, None).unwrap();

    // THEN no outcome is written and the provider is never asked
    assert_eq!(resolved, 0);
    assert_eq!(store.outcome_count().unwrap(), 0);
    assert!(provider.requests().is_empty());
    assert!(run
        .skipped()
        .iter()
        .all(|(_, r)| *r == SkipReason::DegeneratePrice));
}

#[test]
fn bdd_scenario_short_history_leaves_partial_horizons_null() {
    // GIVEN a signal with only four sessions of forward data
    let day = d("2024-03-04");
    let store = SignalStore::open_in_memory().unwrap();
    let id = store
        .record_signal_on(day, "SHRT", "Swing", 60, 20.0)
        .unwrap()
        .unwrap();
    let mut provider = MemoryProvider::new();
    provider.insert_closes("SHRT", &daily(day, &[20.0, 21.0, 22.0, 19.0]));

    // WHEN resolving
    let resolved = resolve_due_outcomes(
        &store,
        &provider,
        &mut ResolverRun::new(day + Duration::days(11)),
        None,
    )
    .unwrap();

    // THEN the partial outcome still counts, with later horizons null
    assert_eq!(resolved, 1);
    let outcome = store.outcome(id).unwrap().unwrap();
    assert_eq!(outcome.pct_t1, Some(5.0));
    assert_eq!(outcome.pct_t3, Some(-5.0));
    assert_eq!(outcome.pct_t5, None);
    assert_eq!(outcome.pct_t10, None);
}

#[test]
fn bdd_scenario_young_signals_are_not_fetched() {
    // GIVEN a signal only five days old
    let day = d("2024-03-04");
    let store = SignalStore::open_in_memory().unwrap();
    let id = store
        .record_signal_on(day, "NEW", "Swing", 60, 20.0)
        .unwrap()
        .unwrap();
    let provider = MemoryProvider::new();

    // WHEN resolving
    let today = day + Duration::days(5);
    let resolved =
        resolve_due_outcomes(&store, &provider, &mut ResolverRun::new(today), None).unwrap();

    // THEN it stays pending untouched
    assert_eq!(resolved, 0);
    assert!(provider.requests().is_empty());
    assert_eq!(
        store.signal_state(id, today, 11).unwrap(),
        Some(SignalState::Pending)
    );
}

#[test]
fn bdd_scenario_stats_from_resolved_batch() {
    // GIVEN ten resolved "Breakout" signals, six of them up at T+1
    let day = d("2024-03-04");
    let store = SignalStore::open_in_memory().unwrap();
    let mut provider = MemoryProvider::new();
    let next_closes = [101.0, 102.0, 103.0, 101.5, 100.5, 104.0, 99.0, 98.0, 100.0, 97.0];
    let rows: Vec<Value> = (0..10)
        .map(|i| json!({"Ticker": format!("T{i}"), "Score": 50 + i, "Price": 100.0}))
        .collect();
    store.record_signals_batch_on(day, &rows, "Breakout").unwrap();
    for (i, close) in next_closes.iter().enumerate() {
        provider.insert_closes(&format!("T{i}"), &daily(day, &[100.0, *close]));
    }
    resolve_due_outcomes(
        &store,
        &provider,
        &mut ResolverRun::new(day + Duration::days(11)),
        None,
    )
    .unwrap();

    // WHEN computing stats with various minimums
    let stats = store.stats_for_scan_type("Breakout", 10).unwrap().unwrap();

    // THEN win rate is 60% and the sample size counts every joined row
    assert_eq!(stats.sample_size, 10);
    assert_eq!(stats.win_rate(Horizon::T1), Some(60.0));
    assert_eq!(stats.avg_return(Horizon::T1), Some(0.6));
    assert_eq!(stats.win_rate(Horizon::T3), None);

    assert!(store.stats_for_scan_type("Breakout", 11).unwrap().is_none());
    assert!(store.stats_for_scan_type("Unknown", 0).unwrap().is_some());
    assert_eq!(store.stats_all_scan_types(5).unwrap().len(), 1);
}
