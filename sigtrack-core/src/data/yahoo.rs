//! Yahoo Finance daily history over the v8 chart endpoint.
//!
//! Unofficial API: the payload shape can change without notice, so every
//! structural surprise maps to `ResponseFormatChanged` and `CsvDirProvider`
//! exists as the offline fallback. Requests retry with exponential backoff
//! and share a `CircuitBreaker` so one ban stops the whole resolver pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use super::provider::{sort_and_dedup, DailyBar, DataError, HistoryProvider};

const CHART_ENDPOINT: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Deserialize)]
struct Envelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<Series>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Quote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Outcome of one HTTP round trip.
enum Attempt {
    Done(Vec<DailyBar>),
    /// Transient; worth another try after backoff.
    Retry(DataError),
    /// Permanent for this request.
    Fail(DataError),
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Attempts after the first request.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Query URL covering whole UTC days from `start` through `end`.
    fn chart_url(ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        let from = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let to = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp()
            - 1;
        format!(
            "{CHART_ENDPOINT}/{ticker}?period1={from}&period2={to}&interval=1d&includeAdjustedClose=true"
        )
    }

    /// Decode a chart payload into sorted daily bars.
    ///
    /// Rows with no OHLCV values at all are holidays and are dropped; a
    /// missing individual field becomes NaN (volume 0).
    fn parse_chart(ticker: &str, body: &str) -> Result<Vec<DailyBar>, DataError> {
        let envelope: Envelope = serde_json::from_str(body).map_err(|e| {
            DataError::ResponseFormatChanged(format!("undecodable chart for {ticker}: {e}"))
        })?;

        let series = match (envelope.chart.result, envelope.chart.error) {
            (Some(mut results), _) if !results.is_empty() => results.swap_remove(0),
            (_, Some(err)) if err.code == "Not Found" => {
                return Err(DataError::SymbolNotFound {
                    symbol: ticker.to_string(),
                })
            }
            (_, Some(err)) => {
                return Err(DataError::ResponseFormatChanged(format!(
                    "{}: {}",
                    err.code, err.description
                )))
            }
            (_, None) => {
                return Err(DataError::ResponseFormatChanged(
                    "chart has neither result nor error".into(),
                ))
            }
        };

        let quote = series.indicators.quote.into_iter().next().unwrap_or_default();
        let adj = series
            .indicators
            .adjclose
            .into_iter()
            .next()
            .map(|a| a.adjclose)
            .unwrap_or_default();
        let at = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();

        let mut bars = Vec::with_capacity(series.timestamp.len());
        for (i, &ts) in series.timestamp.iter().enumerate() {
            let (open, high, low, close) = (
                at(&quote.open, i),
                at(&quote.high, i),
                at(&quote.low, i),
                at(&quote.close, i),
            );
            let volume = quote.volume.get(i).copied().flatten();
            if [open, high, low, close].iter().all(Option::is_none) && volume.is_none() {
                continue;
            }

            let date = DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| DataError::ResponseFormatChanged(format!("bad timestamp {ts}")))?;
            bars.push(DailyBar {
                date,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0),
                adj_close: at(&adj, i).unwrap_or(f64::NAN),
            });
        }
        Ok(sort_and_dedup(bars))
    }

    fn attempt(&self, ticker: &str, url: &str) -> Attempt {
        let resp = match self.client.get(url).send() {
            Ok(resp) => resp,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Attempt::Retry(DataError::NetworkUnreachable(e.to_string()))
            }
            Err(e) => return Attempt::Fail(DataError::NetworkUnreachable(e.to_string())),
        };

        match resp.status() {
            StatusCode::FORBIDDEN => {
                warn!(ticker, "history provider answered 403, opening circuit breaker");
                self.breaker.trip();
                Attempt::Fail(DataError::CircuitBreakerTripped)
            }
            StatusCode::UNAUTHORIZED => Attempt::Fail(DataError::AuthenticationRequired(
                "Yahoo Finance requires authentication".into(),
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                self.breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                Attempt::Retry(DataError::RateLimited { retry_after_secs })
            }
            status if !status.is_success() => {
                self.breaker.record_failure();
                Attempt::Retry(DataError::Other(format!("HTTP {status} for {ticker}")))
            }
            _ => {
                let body = match resp.text() {
                    Ok(body) => body,
                    Err(e) => return Attempt::Retry(DataError::NetworkUnreachable(e.to_string())),
                };
                match Self::parse_chart(ticker, &body) {
                    Ok(bars) => {
                        self.breaker.record_success();
                        Attempt::Done(bars)
                    }
                    Err(e) => Attempt::Fail(e),
                }
            }
        }
    }

    /// Delay before retry `attempt` (1-based), doubling each time.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, DataError> {
        let url = Self::chart_url(ticker, start, end);
        let mut last_error = DataError::Other("no request attempted".into());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                debug!(ticker, attempt, ?delay, "retrying history request");
                std::thread::sleep(delay);
            }
            self.breaker.guard()?;

            match self.attempt(ticker, &url) {
                Attempt::Done(bars) => return Ok(bars),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}

impl HistoryProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, DataError> {
        let mut bars = self.fetch(ticker, start, end)?;
        bars.retain(|b| b.date >= start && b.date <= end);
        Ok(bars)
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}
