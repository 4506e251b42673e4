//! T1 rotation stop sweep.
//!
//! Fetches one aligned close panel for the whole rotation universe, then
//! backtests it once per stop candidate. Data problems never surface as
//! errors here: the outcome carries an abort reason instead, so an optimizer
//! run can still report its swing results.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sigtrack_core::data::align_closes;
use sigtrack_core::HistoryProvider;
use tracing::{info, warn};

use crate::rotation::{RotationBacktest, RotationUniverse};
use crate::t2_sweep::SweepError;

/// Calendar days spanned by `trading_days` sessions.
pub fn calendar_days_for(trading_days: u32) -> i64 {
    (trading_days as i64 * 365 + 251) / 252
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct T1Params {
    pub lookback_days: u32,
    pub stop_candidates: Vec<f64>,
    pub principal: f64,
    pub warmup_days: i64,
}

impl T1Params {
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.lookback_days == 0 {
            return Err(SweepError::InvalidGrid("lookback_days must be at least 1".into()));
        }
        if self.stop_candidates.is_empty() {
            return Err(SweepError::InvalidGrid("no stop candidates".into()));
        }
        if let Some(bad) = self
            .stop_candidates
            .iter()
            .find(|s| !(**s > 0.0 && **s < 100.0))
        {
            return Err(SweepError::InvalidGrid(format!(
                "stop candidate {bad} outside (0, 100)"
            )));
        }
        if !(self.principal.is_finite() && self.principal > 0.0) {
            return Err(SweepError::InvalidGrid("principal must be positive".into()));
        }
        if self.warmup_days < 0 {
            return Err(SweepError::InvalidGrid("warmup_days must not be negative".into()));
        }
        Ok(())
    }

    /// `(fetch_start, backtest_start, end)` for a sweep run on `today`.
    pub fn window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate, NaiveDate) {
        let start = today - Duration::days(calendar_days_for(self.lookback_days));
        (start - Duration::days(self.warmup_days), start, today)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct T1Row {
    pub stop_pct: f64,
    pub total_return_pct: f64,
    pub final_equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct T1SweepOutcome {
    pub best: Option<T1Row>,
    pub grid: Vec<T1Row>,
    /// Set when the sweep stopped early; `best` is then `None`.
    pub abort_reason: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl T1SweepOutcome {
    fn aborted(reason: String, start: NaiveDate, end: NaiveDate) -> Self {
        warn!(%reason, "rotation sweep aborted");
        Self {
            best: None,
            grid: Vec::new(),
            abort_reason: Some(reason),
            start,
            end,
        }
    }
}

/// Run the stop sweep as of `today`.
///
/// Only malformed parameters are errors. Any fetch failure, an empty panel
/// or a backtest failure yields an outcome with `abort_reason` set.
pub fn run_t1_sweep(
    provider: &dyn HistoryProvider,
    engine: &dyn RotationBacktest,
    universe: &RotationUniverse,
    params: &T1Params,
    today: NaiveDate,
) -> Result<T1SweepOutcome, SweepError> {
    params.validate()?;
    let (fetch_start, start, end) = params.window(today);

    let tickers = universe.tickers();
    if tickers.is_empty() {
        return Ok(T1SweepOutcome::aborted(
            "rotation universe is empty".into(),
            start,
            end,
        ));
    }

    if !provider.is_available() {
        return Ok(T1SweepOutcome::aborted(
            format!("history provider {} is unavailable", provider.name()),
            start,
            end,
        ));
    }

    let mut bars = HashMap::new();
    for ticker in &tickers {
        match provider.daily_history(ticker, fetch_start, end) {
            Ok(b) => {
                bars.insert(ticker.clone(), b);
            }
            Err(e) => {
                return Ok(T1SweepOutcome::aborted(
                    format!("failed to fetch {ticker}: {e}"),
                    start,
                    end,
                ));
            }
        }
    }

    let panel = align_closes(bars);
    if panel.is_empty() {
        return Ok(T1SweepOutcome::aborted(
            "no price history for the rotation universe".into(),
            start,
            end,
        ));
    }
    info!(
        tickers = tickers.len(),
        sessions = panel.dates.len(),
        %fetch_start,
        %start,
        %end,
        "rotation panel ready"
    );

    let mut grid = Vec::with_capacity(params.stop_candidates.len());
    for &stop_pct in &params.stop_candidates {
        match engine.run(&panel, start, end, stop_pct, params.principal) {
            Ok(r) => grid.push(T1Row {
                stop_pct,
                total_return_pct: r.total_return_pct,
                final_equity: r.final_equity,
            }),
            Err(e) => {
                return Ok(T1SweepOutcome::aborted(
                    format!("backtest failed at stop {stop_pct}%: {e}"),
                    start,
                    end,
                ));
            }
        }
    }

    let mut best: Option<T1Row> = None;
    for row in &grid {
        if best.map_or(true, |b| row.total_return_pct > b.total_return_pct) {
            best = Some(*row);
        }
    }
    if let Some(b) = &best {
        info!(
            stop = b.stop_pct,
            total_return = b.total_return_pct,
            "rotation sweep finished"
        );
    }

    Ok(T1SweepOutcome {
        best,
        grid,
        abort_reason: None,
        start,
        end,
    })
}
