//! Multi-ticker close alignment.
//!
//! Given bars for several tickers, build a price panel on a common timeline.
//! Missing sessions get strict NaN (no forward-fill of tradable price data).

use super::provider::DailyBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Adjusted closes for several tickers on one shared date axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricePanel {
    /// The common date axis (sorted ascending).
    pub dates: Vec<NaiveDate>,
    /// Closes per ticker; each Vec has the same length as `dates`.
    pub closes: BTreeMap<String, Vec<f64>>,
}

impl PricePanel {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.closes.is_empty()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.closes.keys().map(|s| s.as_str())
    }

    /// Close series for a ticker, aligned to `dates`.
    pub fn series(&self, ticker: &str) -> Option<&[f64]> {
        self.closes.get(ticker).map(|v| v.as_slice())
    }

    /// Index of the first session on or after `date`.
    pub fn index_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.dates.partition_point(|d| *d < date);
        (idx < self.dates.len()).then_some(idx)
    }

    /// Index of the last session on or before `date`.
    pub fn index_on_or_before(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.dates.partition_point(|d| *d <= date);
        idx.checked_sub(1)
    }
}

/// Align tickers to the union of their dates using adjusted closes.
///
/// Tickers with no bars at all are dropped from the panel.
pub fn align_closes(ticker_bars: HashMap<String, Vec<DailyBar>>) -> PricePanel {
    let all_dates: BTreeSet<NaiveDate> = ticker_bars
        .values()
        .flat_map(|bars| bars.iter().map(|b| b.date))
        .collect();
    let dates: Vec<NaiveDate> = all_dates.into_iter().collect();

    let mut closes = BTreeMap::new();
    for (ticker, bars) in &ticker_bars {
        if bars.is_empty() {
            continue;
        }
        let by_date: HashMap<NaiveDate, f64> =
            bars.iter().map(|b| (b.date, b.adjusted_close())).collect();
        let series = dates
            .iter()
            .map(|d| by_date.get(d).copied().unwrap_or(f64::NAN))
            .collect();
        closes.insert(ticker.clone(), series);
    }

    PricePanel { dates, closes }
}
