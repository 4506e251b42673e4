//! Market history provider trait and structured error types.
//!
//! The HistoryProvider trait abstracts over data sources (Yahoo Finance, CSV
//! directories, in-memory fixtures) so the resolver and the rotation sweep can
//! be driven by any of them and mocked in tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One daily OHLCV bar as delivered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: f64,
}

impl DailyBar {
    /// Adjusted close when the provider supplied one, raw close otherwise.
    pub fn adjusted_close(&self) -> f64 {
        if self.adj_close.is_finite() {
            self.adj_close
        } else {
            self.close
        }
    }
}

/// Structured error types for history fetches.
///
/// Every variant is a data-unavailable condition from the caller's point of
/// view; none of them should abort a batch of unrelated tickers.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("csv import error for {symbol}: {message}")]
    CsvImport { symbol: String, message: String },

    #[error("data error: {0}")]
    Other(String),
}

/// Source of daily price history.
pub trait HistoryProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Daily bars for `ticker` with `start <= date <= end`, oldest first.
    ///
    /// An empty vector is a valid answer (no sessions in range).
    fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, DataError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool {
        true
    }
}

impl<P: HistoryProvider + ?Sized> HistoryProvider for &P {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, DataError> {
        (**self).daily_history(ticker, start, end)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

/// Sort bars by date and drop duplicate dates (first occurrence wins).
pub fn sort_and_dedup(mut bars: Vec<DailyBar>) -> Vec<DailyBar> {
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}
