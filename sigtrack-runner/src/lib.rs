//! SigTrack Runner: strategy optimizers over recorded signals and market history.
//!
//! - `t2_sweep`: swing exit-rule grid search over resolved signal outcomes
//! - `t1_sweep`: stop-loss sweep for the rotation strategy
//! - `rotation`: the rotation backtest seam and a momentum reference engine
//! - `recommendation`: the JSON artifact handed to downstream consumers
//! - `config`: TOML configuration for the whole tool

pub mod config;
pub mod export;
pub mod recommendation;
pub mod rotation;
pub mod t1_sweep;
pub mod t2_sweep;

pub use config::{ConfigError, SigtrackConfig};
pub use export::ArtifactError;
pub use recommendation::Recommendation;
pub use rotation::{
    BacktestError, MomentumRotation, RotationBacktest, RotationPair, RotationResult,
    RotationUniverse,
};
pub use t1_sweep::{run_t1_sweep, T1Params, T1Row, T1SweepOutcome};
pub use t2_sweep::{
    run_t2_sweep, simulate_exit, Evaluation, ExitReason, ExitRule, SimulatedExit, SweepError,
    T2Grid, T2Row, T2SweepResult,
};
