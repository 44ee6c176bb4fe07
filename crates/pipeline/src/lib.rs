//! Fit Pipeline - regression-data preparation across active-learning cycles
//!
//! Ties the components together for one cycle:
//! - generates per-row weights for the cycle's fresh rows
//! - accumulates them into the running combined set
//! - splits the combined matrix for large distributed solves
//! - archives restart checkpoints and rebuilds resume invocations
//!
//! # Example
//!
//! ```no_run
//! use fit_core::PipelineConfig;
//! use pipeline::FitPipeline;
//!
//! # async fn example() -> fit_core::Result<()> {
//! let config = PipelineConfig::load("fitprep.json").await?;
//! let pipeline = FitPipeline::new(config)?;
//!
//! let plan = pipeline.prepare_solve(2).await?;
//! println!("{}", plan.invocation.command_line());
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod fit_pipeline;

pub use collaborators::{CommandLauncher, ContributionEvaluator, JobHandle, SolverLauncher};
pub use fit_pipeline::{FitPipeline, SolvePlan, EVALUATED_KINDS, SOLUTION_FILES};
