//! Fit Core - Foundation for the regression-data pipeline
//!
//! Provides the error taxonomy, validated configuration and the row,
//! manifest and file-set types shared by the splitting, accumulation,
//! weighting and checkpoint crates.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::{
    CycleConfig, JobConfig, PipelineConfig, RegressionAlgorithm, SolverConfig, WeightMethod,
    WeightRequest, WeightSet, WeightTerm, WeightingConfig,
};
pub use error::{Error, ErrorKind, Result};
pub use types::*;
