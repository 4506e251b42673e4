//! Rotation backtest seam and the bundled momentum rotation engine.
//!
//! The T1 sweep treats the engine as a black box behind `RotationBacktest`:
//! aligned closes in, total return and final equity out.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sigtrack_core::{round2, PricePanel};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BacktestError {
    #[error("no sessions between {start} and {end}")]
    EmptyWindow { start: NaiveDate, end: NaiveDate },

    #[error("need {needed} warm-up sessions before the window, have {available}")]
    InsufficientWarmup { needed: usize, available: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// A signal ticker and the instrument actually traded when it leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPair {
    pub signal: String,
    #[serde(default)]
    pub leveraged: Option<String>,
}

impl RotationPair {
    pub fn new(signal: &str, leveraged: Option<&str>) -> Self {
        Self {
            signal: signal.trim().to_uppercase(),
            leveraged: leveraged
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty()),
        }
    }

    /// The ticker bought when this pair leads.
    pub fn instrument(&self) -> &str {
        self.leveraged.as_deref().unwrap_or(&self.signal)
    }
}

/// Candidate set for the rotation strategy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RotationUniverse {
    pub pairs: Vec<RotationPair>,
}

impl RotationUniverse {
    pub fn new(pairs: Vec<RotationPair>) -> Self {
        Self { pairs }
    }

    /// Every ticker to fetch: signal tickers then leveraged pairs, deduplicated.
    pub fn tickers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let all = self
            .pairs
            .iter()
            .map(|p| p.signal.clone())
            .chain(self.pairs.iter().filter_map(|p| p.leveraged.clone()));
        for ticker in all {
            if !out.contains(&ticker) {
                out.push(ticker);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationResult {
    pub total_return_pct: f64,
    pub final_equity: f64,
    /// Completed round trips.
    pub trades: usize,
}

/// A rotation strategy backtest over an aligned close panel.
pub trait RotationBacktest {
    fn run(
        &self,
        panel: &PricePanel,
        start: NaiveDate,
        end: NaiveDate,
        stop_pct: f64,
        principal: f64,
    ) -> Result<RotationResult, BacktestError>;
}

/// Hold the leveraged pair of the strongest signal ticker.
///
/// Each session the signal tickers are ranked by close-to-close change over
/// `momentum_lookback` sessions. The leader's instrument is held at the
/// close; with no positive leader the book is cash. A close at or below
/// `entry × (1 − stop_pct/100)` exits to cash, and the strategy stays flat
/// until a different ticker leads.
#[derive(Debug, Clone)]
pub struct MomentumRotation {
    pub universe: RotationUniverse,
    pub momentum_lookback: usize,
}

#[derive(Debug, Clone)]
struct Position {
    leader: String,
    instrument: String,
    units: f64,
    entry: f64,
    last: f64,
}

impl MomentumRotation {
    pub fn new(universe: RotationUniverse, momentum_lookback: usize) -> Self {
        Self {
            universe,
            momentum_lookback,
        }
    }

    fn close(panel: &PricePanel, ticker: &str, i: usize) -> Option<f64> {
        panel
            .series(ticker)
            .and_then(|s| s.get(i).copied())
            .filter(|c| c.is_finite() && *c > 0.0)
    }

    /// Leader at session `i`: highest positive momentum, first pair on ties.
    fn leader(&self, panel: &PricePanel, i: usize) -> Option<&RotationPair> {
        let mut best: Option<(&RotationPair, f64)> = None;
        for pair in &self.universe.pairs {
            let (Some(now), Some(then)) = (
                Self::close(panel, &pair.signal, i),
                Self::close(panel, &pair.signal, i - self.momentum_lookback),
            ) else {
                continue;
            };
            let momentum = now / then - 1.0;
            if momentum > 0.0 && best.map_or(true, |(_, m)| momentum > m) {
                best = Some((pair, momentum));
            }
        }
        best.map(|(p, _)| p)
    }

    /// Instrument to buy for a leader, falling back to the signal ticker
    /// when the leveraged pair has no close this session.
    fn buy_target(panel: &PricePanel, pair: &RotationPair, i: usize) -> Option<(String, f64)> {
        let instrument = pair.instrument();
        if let Some(price) = Self::close(panel, instrument, i) {
            return Some((instrument.to_string(), price));
        }
        Self::close(panel, &pair.signal, i).map(|p| (pair.signal.clone(), p))
    }
}

impl RotationBacktest for MomentumRotation {
    fn run(
        &self,
        panel: &PricePanel,
        start: NaiveDate,
        end: NaiveDate,
        stop_pct: f64,
        principal: f64,
    ) -> Result<RotationResult, BacktestError> {
        if !(stop_pct > 0.0 && stop_pct < 100.0) {
            return Err(BacktestError::InvalidParameter(format!(
                "stop_pct {stop_pct} outside (0, 100)"
            )));
        }
        if !(principal.is_finite() && principal > 0.0) {
            return Err(BacktestError::InvalidParameter(format!(
                "principal {principal} must be positive"
            )));
        }
        if self.momentum_lookback == 0 {
            return Err(BacktestError::InvalidParameter(
                "momentum_lookback must be at least 1".into(),
            ));
        }

        let (Some(first), Some(last)) = (
            panel.index_on_or_after(start),
            panel.index_on_or_before(end),
        ) else {
            return Err(BacktestError::EmptyWindow { start, end });
        };
        if first > last {
            return Err(BacktestError::EmptyWindow { start, end });
        }
        if first < self.momentum_lookback {
            return Err(BacktestError::InsufficientWarmup {
                needed: self.momentum_lookback,
                available: first,
            });
        }

        let stop_factor = 1.0 - stop_pct / 100.0;
        let mut cash = principal;
        let mut position: Option<Position> = None;
        let mut stopped_out_of: Option<String> = None;
        let mut trades = 0;

        for i in first..=last {
            // Mark to market and check the stop.
            if let Some(pos) = position.as_mut() {
                if let Some(price) = Self::close(panel, &pos.instrument, i) {
                    pos.last = price;
                    if price <= pos.entry * stop_factor {
                        debug!(instrument = %pos.instrument, %price, entry = pos.entry, "stop hit");
                        cash = pos.units * price;
                        stopped_out_of = Some(pos.leader.clone());
                        position = None;
                        trades += 1;
                    }
                }
            }

            let leader = self.leader(panel, i);
            if stopped_out_of.as_deref() != leader.map(|p| p.signal.as_str()) {
                stopped_out_of = None;
            }

            let wanted = match leader {
                Some(pair) if stopped_out_of.is_none() => Some(pair),
                _ => None,
            };

            let keep = matches!(
                (&position, wanted),
                (Some(pos), Some(pair)) if pos.leader == pair.signal
            );
            if keep {
                continue;
            }

            // Exit whatever is held; a missing close postpones the switch.
            if let Some(pos) = position.as_ref() {
                let Some(price) = Self::close(panel, &pos.instrument, i) else {
                    continue;
                };
                cash = pos.units * price;
                position = None;
                trades += 1;
            }

            if let Some(pair) = wanted {
                if let Some((instrument, price)) = Self::buy_target(panel, pair, i) {
                    position = Some(Position {
                        leader: pair.signal.clone(),
                        instrument,
                        units: cash / price,
                        entry: price,
                        last: price,
                    });
                    cash = 0.0;
                }
            }
        }

        let final_equity = match &position {
            Some(pos) => cash + pos.units * pos.last,
            None => cash,
        };
        Ok(RotationResult {
            total_return_pct: round2((final_equity - principal) / principal * 100.0),
            final_equity: round2(final_equity),
            trades,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn panel(series: &[(&str, Vec<f64>)]) -> PricePanel {
        let len = series[0].1.len();
        let start = d("2024-01-01");
        PricePanel {
            dates: (0..len).map(|i| start + Duration::days(i as i64)).collect(),
            closes: series
                .iter()
                .map(|(t, s)| (t.to_string(), s.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn universe() -> RotationUniverse {
        RotationUniverse::new(vec![
            RotationPair::new("qqq", Some("tqqq")),
            RotationPair::new("GLD", None),
        ])
    }

    #[test]
    fn universe_tickers_are_deduplicated() {
        let u = RotationUniverse::new(vec![
            RotationPair::new("QQQ", Some("TQQQ")),
            RotationPair::new("SPY", Some("TQQQ")),
            RotationPair::new("GLD", Some(" ")),
        ]);
        assert_eq!(u.tickers(), vec!["QQQ", "SPY", "GLD", "TQQQ"]);
        assert_eq!(u.pairs[2].instrument(), "GLD");
    }

    #[test]
    fn holds_leveraged_pair_of_rising_leader() {
        let p = panel(&[
            ("QQQ", vec![100.0, 101.0, 102.0, 103.0, 104.0]),
            ("TQQQ", vec![50.0, 51.0, 52.0, 53.0, 55.0]),
            ("GLD", vec![100.0, 100.0, 100.0, 100.0, 100.0]),
        ]);
        let engine = MomentumRotation::new(universe(), 1);
        let r = engine
            .run(&p, d("2024-01-02"), d("2024-01-05"), 5.0, 1000.0)
            .unwrap();
        // Buy TQQQ at 51 on day 1, hold to 55.
        assert_eq!(r.final_equity, round2(1000.0 / 51.0 * 55.0));
        assert_eq!(r.trades, 0);
    }

    #[test]
    fn stop_exits_and_stays_flat_while_leader_unchanged() {
        let p = panel(&[
            ("QQQ", vec![100.0, 101.0, 102.0, 103.0, 104.0]),
            ("TQQQ", vec![50.0, 100.0, 90.0, 120.0, 130.0]),
            ("GLD", vec![100.0, 100.0, 100.0, 100.0, 100.0]),
        ]);
        let engine = MomentumRotation::new(universe(), 1);
        let r = engine
            .run(&p, d("2024-01-02"), d("2024-01-05"), 5.0, 1000.0)
            .unwrap();
        // Entry 100, stopped at 90, then flat while QQQ keeps leading.
        assert_eq!(r.final_equity, 900.0);
        assert_eq!(r.total_return_pct, -10.0);
        assert_eq!(r.trades, 1);

        let wide = engine
            .run(&p, d("2024-01-02"), d("2024-01-05"), 20.0, 1000.0)
            .unwrap();
        assert_eq!(wide.final_equity, 1300.0);
    }

    #[test]
    fn no_positive_momentum_means_cash() {
        let p = panel(&[
            ("QQQ", vec![100.0, 99.0, 98.0]),
            ("TQQQ", vec![50.0, 49.0, 48.0]),
            ("GLD", vec![100.0, 100.0, 100.0]),
        ]);
        let engine = MomentumRotation::new(universe(), 1);
        let r = engine
            .run(&p, d("2024-01-02"), d("2024-01-03"), 5.0, 1000.0)
            .unwrap();
        assert_eq!(r.final_equity, 1000.0);
        assert_eq!(r.total_return_pct, 0.0);
    }

    #[test]
    fn leader_switch_rotates_holdings() {
        let p = panel(&[
            ("QQQ", vec![100.0, 110.0, 110.0, 110.0]),
            ("TQQQ", vec![10.0, 20.0, 20.0, 20.0]),
            ("GLD", vec![100.0, 100.0, 120.0, 150.0]),
        ]);
        let engine = MomentumRotation::new(universe(), 1);
        let r = engine
            .run(&p, d("2024-01-02"), d("2024-01-04"), 50.0, 1000.0)
            .unwrap();
        // Day 1 buy TQQQ at 20; day 2 GLD leads, sell TQQQ at 20, buy GLD at 120;
        // day 3 hold GLD to 150.
        assert_eq!(r.trades, 1);
        assert_eq!(r.final_equity, 1250.0);
    }

    #[test]
    fn window_and_warmup_errors() {
        let p = panel(&[
            ("QQQ", vec![100.0, 101.0, 102.0]),
            ("GLD", vec![100.0, 100.0, 100.0]),
        ]);
        let engine = MomentumRotation::new(universe(), 2);
        assert_eq!(
            engine.run(&p, d("2024-01-02"), d("2024-01-03"), 5.0, 1000.0),
            Err(BacktestError::InsufficientWarmup { needed: 2, available: 1 })
        );
        assert!(matches!(
            engine.run(&p, d("2025-01-01"), d("2025-02-01"), 5.0, 1000.0),
            Err(BacktestError::EmptyWindow { .. })
        ));
        assert!(matches!(
            engine.run(&p, d("2024-01-03"), d("2024-01-03"), 0.0, 1000.0),
            Err(BacktestError::InvalidParameter(_))
        ));
    }
}
