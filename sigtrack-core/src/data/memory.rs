//! In-memory history provider for tests and offline demos.

use super::provider::{sort_and_dedup, DailyBar, DataError, HistoryProvider};
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Serves bars from memory. Tickers can be marked as failing to simulate an
/// unreachable provider. Every request is recorded for later inspection.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    bars: HashMap<String, Vec<DailyBar>>,
    failing: HashSet<String>,
    requests: RefCell<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bars for a ticker, replacing any previous series.
    pub fn insert(&mut self, ticker: &str, bars: Vec<DailyBar>) {
        self.bars.insert(ticker.to_string(), sort_and_dedup(bars));
    }

    /// Store a close-only series (open/high/low equal the close).
    pub fn insert_closes(&mut self, ticker: &str, closes: &[(NaiveDate, f64)]) {
        let bars = closes
            .iter()
            .map(|&(date, close)| DailyBar {
                date,
                open: close,
                high: close,
                low: close,
                close,
                volume: 0,
                adj_close: close,
            })
            .collect();
        self.insert(ticker, bars);
    }

    /// Make every fetch for `ticker` fail with a network error.
    pub fn fail_ticker(&mut self, ticker: &str) {
        self.failing.insert(ticker.to_string());
    }

    /// Requests served so far as `(ticker, start, end)`.
    pub fn requests(&self) -> Vec<(String, NaiveDate, NaiveDate)> {
        self.requests.borrow().clone()
    }
}

impl HistoryProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, DataError> {
        self.requests
            .borrow_mut()
            .push((ticker.to_string(), start, end));

        if self.failing.contains(ticker) {
            return Err(DataError::NetworkUnreachable(format!(
                "simulated outage for {ticker}"
            )));
        }

        let bars = self
            .bars
            .get(ticker)
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            })?;

        Ok(bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn serves_requested_range_and_records_requests() {
        let mut provider = MemoryProvider::new();
        provider.insert_closes("SPY", &[(d(2), 1.0), (d(3), 2.0), (d(4), 3.0)]);

        let bars = provider.daily_history("SPY", d(3), d(10)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(provider.requests(), vec![("SPY".to_string(), d(3), d(10))]);
    }

    #[test]
    fn failing_and_unknown_tickers_error() {
        let mut provider = MemoryProvider::new();
        provider.insert_closes("SPY", &[(d(2), 1.0)]);
        provider.fail_ticker("SPY");

        assert!(matches!(
            provider.daily_history("SPY", d(1), d(5)),
            Err(DataError::NetworkUnreachable(_))
        ));
        assert!(matches!(
            provider.daily_history("QQQ", d(1), d(5)),
            Err(DataError::SymbolNotFound { .. })
        ));
    }
}
