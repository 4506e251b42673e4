//! Shared breaker that stops history fetches after a ban or repeated 429s.
//!
//! A resolver pass can issue hundreds of per-signal fetches. Once the breaker
//! opens, every later fetch fails fast with `CircuitBreakerTripped` and the
//! affected signals simply stay pending until a later run.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::provider::DataError;

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30 * 60);
const DEFAULT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { since: Instant },
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
}

/// Failure counter plus cooldown, safe to share behind an `Arc`.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    cooldown: Duration,
    threshold: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
            }),
            cooldown,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Consecutive failures needed to open the breaker (minimum 1).
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another thread panicked mid-update;
        // the counters are still meaningful.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a request may go out now. Closes the breaker once the
    /// cooldown has elapsed.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open { since } if since.elapsed() >= self.cooldown => {
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                true
            }
            BreakerState::Open { .. } => false,
        }
    }

    /// `Ok` when a request may go out, the provider error otherwise.
    pub fn guard(&self) -> Result<(), DataError> {
        if self.is_allowed() {
            Ok(())
        } else {
            Err(DataError::CircuitBreakerTripped)
        }
    }

    pub fn record_success(&self) {
        self.lock().failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;
        if inner.failures >= self.threshold {
            inner.state = BreakerState::Open {
                since: Instant::now(),
            };
        }
    }

    /// Open immediately, e.g. on HTTP 403.
    pub fn trip(&self) {
        self.lock().state = BreakerState::Open {
            since: Instant::now(),
        };
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn remaining_cooldown(&self) -> Duration {
        match self.lock().state {
            BreakerState::Closed => Duration::ZERO,
            BreakerState::Open { since } => self.cooldown.saturating_sub(since.elapsed()),
        }
    }
}
