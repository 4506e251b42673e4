//! SigTrack Core: signal store, outcome resolver, market history, scan statistics.
//!
//! This crate holds everything with persistent state:
//! - Domain types (signals, outcomes, horizons, lifecycle)
//! - Loose-input normalization for producers
//! - SQLite signal store with idempotent outcome upserts
//! - Market history providers (Yahoo, CSV directory, in-memory)
//! - Outcome resolver with an explicit per-invocation state object
//! - Per-scan-type statistics

pub mod data;
pub mod domain;
pub mod ingest;
pub mod resolver;
pub mod stats;
pub mod store;

pub use data::{DailyBar, DataError, HistoryProvider, PricePanel};
pub use domain::{
    percent_change, round2, ForwardReturns, Horizon, Outcome, ResolvedSignal, Signal, SignalId,
    SignalState,
};
pub use resolver::{
    resolve_due_outcomes, ResolveProgress, ResolveStatus, ResolverRun, SkipReason,
    DUE_AFTER_DAYS, FETCH_WINDOW_DAYS,
};
pub use stats::{HorizonStats, ScanStats};
pub use store::{SignalStore, StoreError};

#[cfg(test)]
mod send_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn domain_types_are_send_sync() {
        assert_send::<Signal>();
        assert_sync::<Signal>();
        assert_send::<Outcome>();
        assert_sync::<Outcome>();
        assert_send::<ScanStats>();
        assert_sync::<ScanStats>();
        assert_send::<PricePanel>();
        assert_sync::<PricePanel>();
    }

    #[test]
    fn store_and_run_state_can_move_between_threads() {
        assert_send::<SignalStore>();
        assert_send::<ResolverRun>();
    }
}
