//! CSV export of evaluated sweep grids.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::t1_sweep::T1Row;
use crate::t2_sweep::T2Row;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unsupported artifact version {found} (max supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

fn rows_to_csv<T: Serialize>(rows: &[T]) -> Result<String, ArtifactError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row)?;
    }
    let data = wtr
        .into_inner()
        .map_err(|e| ArtifactError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// Swing grid as CSV, one row per evaluated combination, header included.
pub fn t2_grid_csv(rows: &[T2Row]) -> Result<String, ArtifactError> {
    if rows.is_empty() {
        return Ok(
            "min_score,stop_pct,target_pct,max_hold_days,n_signals,avg_return,win_rate\n".into(),
        );
    }
    rows_to_csv(rows)
}

pub fn t1_grid_csv(rows: &[T1Row]) -> Result<String, ArtifactError> {
    if rows.is_empty() {
        return Ok("stop_pct,total_return_pct,final_equity\n".into());
    }
    rows_to_csv(rows)
}

/// Write a CSV string, creating parent directories as needed.
pub fn write_csv(path: &Path, csv: &str) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, csv)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t2_row(min_score: i64) -> T2Row {
        T2Row {
            min_score,
            stop_pct: -3.0,
            target_pct: 6.0,
            max_hold_days: 5,
            n_signals: 12,
            avg_return: 1.25,
            win_rate: 58.33,
        }
    }

    #[test]
    fn t2_csv_has_header_and_rows() {
        let csv = t2_grid_csv(&[t2_row(0), t2_row(70)]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "min_score,stop_pct,target_pct,max_hold_days,n_signals,avg_return,win_rate"
        );
        assert_eq!(lines[2], "70,-3.0,6.0,5,12,1.25,58.33");
    }

    #[test]
    fn empty_grids_still_have_headers() {
        assert_eq!(t2_grid_csv(&[]).unwrap().lines().count(), 1);
        assert_eq!(
            t1_grid_csv(&[]).unwrap(),
            "stop_pct,total_return_pct,final_equity\n"
        );
    }

    #[test]
    fn t1_csv_and_write() {
        let rows = [T1Row {
            stop_pct: 5.0,
            total_return_pct: 12.5,
            final_equity: 11250.0,
        }];
        let csv = t1_grid_csv(&rows).unwrap();
        assert_eq!(csv, "stop_pct,total_return_pct,final_equity\n5.0,12.5,11250.0\n");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t1.csv");
        write_csv(&path, &csv).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), csv);
    }
}
