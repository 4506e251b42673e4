//! Recommendation artifact written after an optimizer run.
//!
//! The JSON carries a flat `recommendations` map for downstream consumers
//! that only want numbers, plus the full best rows and run metadata.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::export::ArtifactError;
use crate::t1_sweep::{T1Row, T1SweepOutcome};
use crate::t2_sweep::{T2Row, T2SweepResult};

/// Current artifact schema version. Newer versions are rejected on load.
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub recommendations: BTreeMap<String, Value>,
    pub t2_best: Option<T2Row>,
    pub t1_best: Option<T1Row>,
    pub t1_abort_reason: Option<String>,
    pub t2_grid_fingerprint: Option<String>,
    pub t2_corpus_size: Option<usize>,
}

impl Recommendation {
    /// Assemble the artifact from whichever sweeps ran.
    pub fn build(
        t2: Option<&T2SweepResult>,
        t1: Option<&T1SweepOutcome>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut recommendations = BTreeMap::new();

        let t2_best = t2.and_then(|r| r.best.clone());
        if let Some(best) = &t2_best {
            recommendations.insert("swing_min_score".into(), Value::from(best.min_score));
            recommendations.insert("swing_stop_pct".into(), Value::from(best.stop_pct));
            recommendations.insert("swing_target_pct".into(), Value::from(best.target_pct));
            recommendations.insert("swing_max_hold_days".into(), Value::from(best.max_hold_days));
            recommendations.insert(
                "swing_expected_return_pct".into(),
                Value::from(best.avg_return),
            );
            recommendations.insert("swing_win_rate".into(), Value::from(best.win_rate));
        }

        let t1_best = t1.and_then(|o| o.best);
        if let Some(best) = &t1_best {
            recommendations.insert("rotation_stop_pct".into(), Value::from(best.stop_pct));
            recommendations.insert(
                "rotation_total_return_pct".into(),
                Value::from(best.total_return_pct),
            );
        }

        Self {
            schema_version: ARTIFACT_VERSION,
            generated_at,
            recommendations,
            t2_best,
            t1_best,
            t1_abort_reason: t1.and_then(|o| o.abort_reason.clone()),
            t2_grid_fingerprint: t2.map(|r| r.fingerprint.clone()),
            t2_corpus_size: t2.map(|r| r.corpus_size),
        }
    }

    pub fn to_json(&self) -> Result<String, ArtifactError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let rec: Self = serde_json::from_str(json)?;
        if rec.schema_version > ARTIFACT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: rec.schema_version,
                supported: ARTIFACT_VERSION,
            });
        }
        Ok(rec)
    }

    /// Write pretty JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
