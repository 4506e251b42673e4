//! Offline history provider backed by a directory of per-ticker CSV files.
//!
//! Layout: `<dir>/<TICKER>.csv` with a header row containing at least
//! `date` and `close`. `open`, `high`, `low`, `volume` and `adj_close` are
//! optional; header matching ignores case.

use super::provider::{sort_and_dedup, DailyBar, DataError, HistoryProvider};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub struct CsvDirProvider {
    dir: PathBuf,
}

impl CsvDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{ticker}.csv"))
    }

    fn read_all(&self, ticker: &str) -> Result<Vec<DailyBar>, DataError> {
        let path = self.path_for(ticker);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            });
        }

        let csv_err = |message: String| DataError::CsvImport {
            symbol: ticker.to_string(),
            message,
        };

        let mut reader = csv::Reader::from_path(&path).map_err(|e| csv_err(e.to_string()))?;
        let headers = reader.headers().map_err(|e| csv_err(e.to_string()))?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let date_col = column("date").ok_or_else(|| csv_err("missing `date` column".into()))?;
        let close_col = column("close").ok_or_else(|| csv_err("missing `close` column".into()))?;
        let open_col = column("open");
        let high_col = column("high");
        let low_col = column("low");
        let volume_col = column("volume");
        let adj_col = column("adj_close").or_else(|| column("adj close"));

        let mut bars = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| csv_err(e.to_string()))?;
            let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::trim);
            let number = |idx: Option<usize>| {
                field(idx)
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(f64::NAN)
            };

            let date_str = field(Some(date_col)).unwrap_or_default();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| csv_err(format!("row {}: bad date {date_str:?}: {e}", line + 2)))?;
            let close = number(Some(close_col));
            if !close.is_finite() {
                continue;
            }

            bars.push(DailyBar {
                date,
                open: number(open_col),
                high: number(high_col),
                low: number(low_col),
                close,
                volume: field(volume_col)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(0),
                adj_close: number(adj_col),
            });
        }

        Ok(sort_and_dedup(bars))
    }
}

impl HistoryProvider for CsvDirProvider {
    fn name(&self) -> &str {
        "csv_dir"
    }

    fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, DataError> {
        Ok(self
            .read_all(ticker)?
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect())
    }

    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn reads_range_with_mixed_case_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("AAPL.csv"),
            "Date,Open,High,Low,Close,Volume,Adj_Close\n\
             2024-01-03,1,1,1,101.0,10,100.5\n\
             2024-01-02,1,1,1,100.0,10,99.5\n\
             2024-01-04,1,1,1,,10,\n\
             2024-01-05,1,1,1,102.0,10,101.5\n",
        )
        .unwrap();

        let provider = CsvDirProvider::new(dir.path());
        let bars = provider
            .daily_history("AAPL", d("2024-01-02"), d("2024-01-04"))
            .unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, d("2024-01-02"));
        assert_eq!(bars[1].close, 101.0);
        assert_eq!(bars[1].adj_close, 100.5);
    }

    #[test]
    fn close_only_files_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SPY.csv"), "date,close\n2024-01-02,470.0\n").unwrap();

        let provider = CsvDirProvider::new(dir.path());
        let bars = provider
            .daily_history("SPY", d("2024-01-01"), d("2024-12-31"))
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].adjusted_close(), 470.0);
    }

    #[test]
    fn missing_file_is_symbol_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvDirProvider::new(dir.path());
        let err = provider
            .daily_history("NOPE", d("2024-01-01"), d("2024-12-31"))
            .unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[test]
    fn bad_date_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("X.csv"), "date,close\n01/02/2024,5\n").unwrap();
        let provider = CsvDirProvider::new(dir.path());
        let err = provider
            .daily_history("X", d("2024-01-01"), d("2024-12-31"))
            .unwrap_err();
        assert!(err.to_string().contains("bad date"));
    }
}
