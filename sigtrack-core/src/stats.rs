//! Per-scan-type win rate and average return at each horizon.

use serde::{Deserialize, Serialize};

use crate::domain::{round2, ForwardReturns, Horizon};
use crate::store::{SignalStore, StoreError};

/// Statistics for one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonStats {
    pub horizon: Horizon,
    /// Non-null observations at this horizon.
    pub observations: usize,
    /// Percent of observations strictly above zero.
    pub win_rate: Option<f64>,
    /// Mean percent change, rounded to 2 decimals.
    pub avg_return: Option<f64>,
}

/// Aggregate performance of a scan type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub scan_type: String,
    /// Joined signal/outcome rows, regardless of per-horizon nulls.
    pub sample_size: usize,
    pub horizons: Vec<HorizonStats>,
}

impl ScanStats {
    pub fn horizon(&self, horizon: Horizon) -> Option<&HorizonStats> {
        self.horizons.iter().find(|h| h.horizon == horizon)
    }

    pub fn win_rate(&self, horizon: Horizon) -> Option<f64> {
        self.horizon(horizon).and_then(|h| h.win_rate)
    }

    pub fn avg_return(&self, horizon: Horizon) -> Option<f64> {
        self.horizon(horizon).and_then(|h| h.avg_return)
    }
}

/// Summarize one horizon across a sample.
pub fn horizon_stats(horizon: Horizon, rows: &[ForwardReturns]) -> HorizonStats {
    let values: Vec<f64> = rows.iter().filter_map(|r| r.get(horizon)).collect();
    if values.is_empty() {
        return HorizonStats {
            horizon,
            observations: 0,
            win_rate: None,
            avg_return: None,
        };
    }
    let n = values.len() as f64;
    let wins = values.iter().filter(|v| **v > 0.0).count() as f64;
    HorizonStats {
        horizon,
        observations: values.len(),
        win_rate: Some(100.0 * wins / n),
        avg_return: Some(round2(values.iter().sum::<f64>() / n)),
    }
}

/// Aggregate a sample, or `None` when it has fewer than `min_signals` rows.
pub fn aggregate(
    scan_type: &str,
    rows: &[ForwardReturns],
    min_signals: usize,
) -> Option<ScanStats> {
    if rows.len() < min_signals {
        return None;
    }
    Some(ScanStats {
        scan_type: scan_type.to_string(),
        sample_size: rows.len(),
        horizons: Horizon::ALL
            .iter()
            .map(|h| horizon_stats(*h, rows))
            .collect(),
    })
}

impl SignalStore {
    /// Win rate and average return per horizon for one scan type.
    ///
    /// `Ok(None)` means the sample is too small, which is not an error.
    pub fn stats_for_scan_type(
        &self,
        scan_type: &str,
        min_signals: usize,
    ) -> Result<Option<ScanStats>, StoreError> {
        let rows: Vec<ForwardReturns> = self
            .resolved_for_scan_type(scan_type)?
            .iter()
            .map(|r| r.outcome.returns())
            .collect();
        Ok(aggregate(scan_type.trim(), &rows, min_signals))
    }

    /// Stats for every scan type that meets `min_signals`, ordered by name.
    pub fn stats_all_scan_types(&self, min_signals: usize) -> Result<Vec<ScanStats>, StoreError> {
        let mut out = Vec::new();
        for scan_type in self.scan_types()? {
            if let Some(stats) = self.stats_for_scan_type(&scan_type, min_signals)? {
                out.push(stats);
            }
        }
        Ok(out)
    }
}
