//! Domain types: signals, outcomes, horizons, lifecycle state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row id of a recorded signal. Assigned by the store, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(pub i64);

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scanner's claim that a ticker qualified for a strategy on a date.
///
/// Signals are append-only: once recorded they are never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub ticker: String,
    pub scan_type: String,
    pub signal_date: NaiveDate,
    pub score: i64,
    pub price_at_signal: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    /// The entry price, if it is usable as a percent-change base.
    pub fn base_price(&self) -> Option<f64> {
        self.price_at_signal.filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Fixed forward offsets at which a signal's outcome is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    T1,
    T3,
    T5,
    T10,
}

impl Horizon {
    pub const ALL: [Horizon; 4] = [Horizon::T1, Horizon::T3, Horizon::T5, Horizon::T10];

    /// Offset in trading sessions after the signal date.
    pub fn days(self) -> usize {
        match self {
            Horizon::T1 => 1,
            Horizon::T3 => 3,
            Horizon::T5 => 5,
            Horizon::T10 => 10,
        }
    }

    /// Position of this horizon in `Horizon::ALL`.
    pub fn slot(self) -> usize {
        match self {
            Horizon::T1 => 0,
            Horizon::T3 => 1,
            Horizon::T5 => 2,
            Horizon::T10 => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Horizon::T1 => "t1",
            Horizon::T3 => "t3",
            Horizon::T5 => "t5",
            Horizon::T10 => "t10",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T+{}", self.days())
    }
}

/// Percent changes at each horizon; `None` where the horizon did not resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardReturns {
    pub t1: Option<f64>,
    pub t3: Option<f64>,
    pub t5: Option<f64>,
    pub t10: Option<f64>,
}

impl ForwardReturns {
    pub fn new(t1: Option<f64>, t3: Option<f64>, t5: Option<f64>, t10: Option<f64>) -> Self {
        Self { t1, t3, t5, t10 }
    }

    pub fn get(&self, horizon: Horizon) -> Option<f64> {
        match horizon {
            Horizon::T1 => self.t1,
            Horizon::T3 => self.t3,
            Horizon::T5 => self.t5,
            Horizon::T10 => self.t10,
        }
    }
}

/// Realized forward performance of one signal.
///
/// Only ever built for signals with a positive `price_at_signal`; the store
/// additionally refuses to persist an outcome for any other signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub signal_id: SignalId,
    pub price_t1: Option<f64>,
    pub price_t3: Option<f64>,
    pub price_t5: Option<f64>,
    pub price_t10: Option<f64>,
    pub pct_t1: Option<f64>,
    pub pct_t3: Option<f64>,
    pub pct_t5: Option<f64>,
    pub pct_t10: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Outcome {
    /// Build an outcome from forward closes ordered as `Horizon::ALL`.
    ///
    /// Returns `None` when the signal has no usable entry price.
    pub fn from_forward_closes(
        signal: &Signal,
        closes: [Option<f64>; 4],
        updated_at: DateTime<Utc>,
    ) -> Option<Self> {
        let base = signal.base_price()?;
        let pct = |close: Option<f64>| close.and_then(|c| percent_change(c, base));
        Some(Self {
            signal_id: signal.id,
            price_t1: closes[0],
            price_t3: closes[1],
            price_t5: closes[2],
            price_t10: closes[3],
            pct_t1: pct(closes[0]),
            pct_t3: pct(closes[1]),
            pct_t5: pct(closes[2]),
            pct_t10: pct(closes[3]),
            updated_at,
        })
    }

    pub fn price(&self, horizon: Horizon) -> Option<f64> {
        match horizon {
            Horizon::T1 => self.price_t1,
            Horizon::T3 => self.price_t3,
            Horizon::T5 => self.price_t5,
            Horizon::T10 => self.price_t10,
        }
    }

    pub fn returns(&self) -> ForwardReturns {
        ForwardReturns::new(self.pct_t1, self.pct_t3, self.pct_t5, self.pct_t10)
    }

    /// True when at least one horizon carries a forward price.
    pub fn has_any_price(&self) -> bool {
        Horizon::ALL.iter().any(|h| self.price(*h).is_some())
    }
}

/// A signal joined with its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSignal {
    pub signal: Signal,
    pub outcome: Outcome,
}

/// Lifecycle of a signal with respect to outcome resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalState {
    /// No outcome yet and too young to resolve.
    Pending,
    /// Old enough to resolve, no outcome yet.
    Due,
    /// An outcome row exists. Terminal.
    Resolved,
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `round((forward - base) / base * 100, 2)`; `None` for a non-positive base.
pub fn percent_change(forward: f64, base: f64) -> Option<f64> {
    if !base.is_finite() || base <= 0.0 || !forward.is_finite() {
        return None;
    }
    Some(round2((forward - base) / base * 100.0))
}
