//! TOML configuration for the store, resolver and both optimizers.
//!
//! Every section is optional; a missing file or section falls back to the
//! defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sigtrack_core::{DUE_AFTER_DAYS, FETCH_WINDOW_DAYS};
use thiserror::Error;

use crate::rotation::{RotationPair, RotationUniverse};
use crate::t1_sweep::T1Params;
use crate::t2_sweep::T2Grid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SigtrackConfig {
    pub store: StoreConfig,
    pub resolver: ResolverConfig,
    pub t2: T2Config,
    pub t1: T1Config,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/signals.sqlite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Calendar days before a signal counts as due.
    pub due_after_days: i64,
    /// Calendar days of history fetched per signal.
    pub fetch_window_days: i64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            due_after_days: DUE_AFTER_DAYS,
            fetch_window_days: FETCH_WINDOW_DAYS,
        }
    }
}

/// Swing exit-rule sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct T2Config {
    /// Scan types whose resolved signals form the sweep corpus.
    pub scan_types: Vec<String>,
    pub min_scores: Vec<i64>,
    /// `[stop_pct, target_pct]` pairs, stop negative and target positive.
    pub stop_target_pairs: Vec<(f64, f64)>,
    pub max_hold_days: Vec<u32>,
}

impl Default for T2Config {
    fn default() -> Self {
        Self {
            scan_types: ["Swing", "Swing Setup", "Swing Pullback", "Swing Breakout"]
                .into_iter()
                .map(String::from)
                .collect(),
            min_scores: vec![0, 50, 60, 70, 80],
            stop_target_pairs: vec![(-3.0, 6.0), (-5.0, 10.0), (-7.0, 14.0)],
            max_hold_days: vec![3, 5, 10],
        }
    }
}

impl T2Config {
    pub fn grid(&self) -> T2Grid {
        T2Grid {
            min_scores: self.min_scores.clone(),
            stop_target_pairs: self.stop_target_pairs.clone(),
            max_hold_days: self.max_hold_days.clone(),
        }
    }
}

/// Rotation stop sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct T1Config {
    /// Backtest length in trading days.
    pub lookback_days: u32,
    /// Trailing stop candidates, in percent below entry.
    pub stop_candidates: Vec<f64>,
    pub principal: f64,
    /// Extra calendar days fetched before the backtest window for momentum warm-up.
    pub warmup_days: i64,
    /// Sessions of trailing momentum used to rank the signal tickers.
    pub momentum_lookback: usize,
    pub pairs: Vec<RotationPair>,
}

impl Default for T1Config {
    fn default() -> Self {
        Self {
            lookback_days: 252,
            stop_candidates: vec![3.0, 4.0, 5.0, 6.0, 7.0],
            principal: 10_000.0,
            warmup_days: 120,
            momentum_lookback: 63,
            pairs: [
                ("QQQ", "TQQQ"),
                ("SPY", "UPRO"),
                ("IWM", "TNA"),
                ("GLD", "UGL"),
                ("TLT", "TMF"),
            ]
            .into_iter()
            .map(|(signal, leveraged)| RotationPair::new(signal, Some(leveraged)))
            .collect(),
        }
    }
}

impl T1Config {
    pub fn params(&self) -> T1Params {
        T1Params {
            lookback_days: self.lookback_days,
            stop_candidates: self.stop_candidates.clone(),
            principal: self.principal,
            warmup_days: self.warmup_days,
        }
    }

    pub fn universe(&self) -> RotationUniverse {
        RotationUniverse::new(self.pairs.clone())
    }
}

impl SigtrackConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Like `from_file`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.due_after_days < 0 {
            return Err(ConfigError::Invalid(
                "resolver.due_after_days must not be negative".into(),
            ));
        }
        if self.resolver.fetch_window_days < 1 {
            return Err(ConfigError::Invalid(
                "resolver.fetch_window_days must be at least 1".into(),
            ));
        }
        if self.t2.scan_types.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid("t2.scan_types is empty".into()));
        }
        self.t2
            .grid()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("t2: {e}")))?;
        self.t1
            .params()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("t1: {e}")))?;
        if self.t1.momentum_lookback == 0 {
            return Err(ConfigError::Invalid(
                "t1.momentum_lookback must be at least 1".into(),
            ));
        }
        if self.t1.pairs.is_empty() {
            return Err(ConfigError::Invalid("t1.pairs is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SigtrackConfig::default();
        config.validate().unwrap();
        assert_eq!(config.resolver.due_after_days, 11);
        assert_eq!(config.t1.pairs.len(), 5);
        assert_eq!(config.t2.grid().len(), 5 * 3 * 3);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = SigtrackConfig::from_toml(
            r#"
[store]
db_path = "/tmp/x.sqlite"

[t2]
min_scores = [70]
stop_target_pairs = [[-2.0, 4.0]]

[[t1.pairs]]
signal = "QQQ"
leveraged = "TQQQ"

[[t1.pairs]]
signal = "GLD"
"#,
        )
        .unwrap();

        assert_eq!(config.store.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(config.t2.min_scores, vec![70]);
        assert_eq!(config.t2.stop_target_pairs, vec![(-2.0, 4.0)]);
        assert_eq!(config.t2.max_hold_days, vec![3, 5, 10]);
        assert_eq!(config.t1.pairs.len(), 2);
        assert_eq!(config.t1.pairs[1].leveraged, None);
        assert_eq!(config.resolver, ResolverConfig::default());
    }

    #[test]
    fn malformed_grid_is_rejected() {
        let err = SigtrackConfig::from_toml("[t2]\nstop_target_pairs = [[2.0, 4.0]]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SigtrackConfig::from_toml("[t1]\nstop_candidates = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SigtrackConfig::from_toml("[t2]\nmax_hold_days = [0]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = SigtrackConfig::from_toml("[t2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SigtrackConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SigtrackConfig::default());

        let err = SigtrackConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
