//! Solve and resume preparation for one active-learning cycle

use std::path::Path;

use checkpoint::{RestartLedger, ResumePlan, SolverInvocation, LIVE_CHECKPOINT};
use cycle_accumulator::{verify_aligned, Accumulation, CycleAccumulator, CycleLayout};
use fit_core::{Cycle, Error, FileKind, FileSet, PipelineConfig, Result};
use matrix_split::{clear_partitions, MatrixSplitter, SplitReport};
use row_store::RowFile;
use tokio::fs;
use tracing::{debug, info, instrument};
use weighting::WeightEngine;

use crate::collaborators::ContributionEvaluator;

/// Solver outputs whose presence marks a finished solve
pub const SOLUTION_FILES: [&str; 2] = ["Ax.txt", "x.txt"];

/// Kinds an external evaluator produces; weights are derived afterwards
pub const EVALUATED_KINDS: [FileKind; 4] = [
    FileKind::AMatrix,
    FileKind::BVector,
    FileKind::LabeledB,
    FileKind::Natoms,
];

/// Outcome of preparing a cycle's solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolvePlan {
    pub cycle: Cycle,
    pub accumulation: Accumulation,

    /// Present when the combined matrix was partitioned
    pub split: Option<SplitReport>,
    pub invocation: SolverInvocation,
}

/// Orchestrates weighting, accumulation, splitting and checkpoints
#[derive(Debug, Clone)]
pub struct FitPipeline {
    config: PipelineConfig,
    layout: CycleLayout,
    weights: WeightEngine,
    accumulator: CycleAccumulator,
}

impl FitPipeline {
    /// Validate `config` and resolve every weighting request
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let weights = WeightEngine::new(&config.weighting)?;
        let accumulator = CycleAccumulator::new(config.solver.algorithm);
        let layout = CycleLayout::new(&config.cycle.root);
        Ok(Self {
            config,
            layout,
            weights,
            accumulator,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &CycleLayout {
        &self.layout
    }

    /// Weight, accumulate and (for large distributed solves) split the
    /// cycle's data, then build the solver invocation.
    #[instrument(skip(self))]
    pub async fn prepare_solve(&self, cycle: Cycle) -> Result<SolvePlan> {
        let store = self.layout.store(cycle);
        let fresh = self.layout.fresh(cycle);
        let starts_lineage = self.config.cycle.starts_lineage(cycle);

        if starts_lineage && store.exists(FileKind::AMatrix.combined_name()).await {
            info!(cycle, "Combined set already adopted, skipping weights");
        } else {
            self.generate_weights(cycle, &fresh, starts_lineage).await?;
        }

        let previous = (!starts_lineage).then(|| self.layout.combined(cycle - 1));
        let accumulation = self
            .accumulator
            .accumulate(cycle, &fresh, previous.as_ref())
            .await?;

        let solver = &self.config.solver;
        let job = &self.config.job;
        let slots = job.slots();
        let mut invocation = SolverInvocation::new(solver, job, store.base_path());
        let mut split = None;

        if solver.algorithm.is_distributed() && accumulation.rows >= slots as u64 {
            clear_partitions(&store).await?;
            let combined = &accumulation.combined;
            let report = MatrixSplitter::new(store.clone())
                .split(
                    &RowFile::new(combined.path(FileKind::AMatrix)),
                    &RowFile::new(combined.path(FileKind::BVector)),
                    slots,
                )
                .await?;
            if report.partition_count() > slots {
                return Err(Error::Internal {
                    message: format!(
                        "split produced {} partitions for {} process slots",
                        report.partition_count(),
                        slots
                    ),
                });
            }
            invocation = invocation.with_partitions(report.partition_count());
            split = Some(report);
        } else {
            debug!(rows = accumulation.rows, slots, "Solving without split");
        }

        info!(
            cycle,
            rows = accumulation.rows,
            cores = invocation.cores,
            split = invocation.split,
            "Solve prepared"
        );
        Ok(SolvePlan {
            cycle,
            accumulation,
            split,
            invocation,
        })
    }

    async fn generate_weights(&self, cycle: Cycle, fresh: &FileSet, starts_lineage: bool) -> Result<()> {
        let out = fresh.path(FileKind::Weights);
        match (&self.config.weighting.alc0_weights, starts_lineage) {
            (Some(initial), true) => {
                fs::copy(initial, &out).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::PathNotFound {
                            path: initial.clone(),
                        }
                    } else {
                        Error::Io(e)
                    }
                })?;
                info!(cycle, source = %initial.display(), "Using user-supplied initial weights");
            }
            _ => {
                self.weights
                    .write_weights(
                        &RowFile::new(fresh.path(FileKind::LabeledB)),
                        &RowFile::new(fresh.path(FileKind::Natoms)),
                        &RowFile::new(out),
                        cycle,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Archive the live checkpoint of the cycle's solve and rebuild the
    /// invocation that continues it
    #[instrument(skip(self))]
    pub async fn prepare_resume(&self, cycle: Cycle) -> Result<ResumePlan> {
        RestartLedger::new(self.layout.store(cycle), &self.config.solver, &self.config.job)
            .prepare_resume()
            .await
    }

    /// The solver has written its live checkpoint
    pub async fn solve_started(&self, cycle: Cycle) -> bool {
        self.layout.store(cycle).exists(LIVE_CHECKPOINT).await
    }

    /// The solver has written its solution
    pub async fn solve_completed(&self, cycle: Cycle) -> bool {
        let store = self.layout.store(cycle);
        for name in SOLUTION_FILES {
            if !store.exists(name).await {
                return false;
            }
        }
        true
    }

    /// Evaluate a parameter set against a trajectory and install the result
    /// as the cycle's fresh inputs, returning the row count
    #[instrument(skip(self, evaluator, parameter_file, trajectory))]
    pub async fn ingest_contributions(
        &self,
        cycle: Cycle,
        evaluator: &dyn ContributionEvaluator,
        parameter_file: &Path,
        trajectory: &Path,
    ) -> Result<u64> {
        let produced = evaluator.evaluate(parameter_file, trajectory).await?;
        let rows = verify_aligned(&produced, &EVALUATED_KINDS).await?;

        let fresh = self.layout.fresh(cycle);
        if produced.path(FileKind::AMatrix) != fresh.path(FileKind::AMatrix) {
            fs::create_dir_all(fresh.dir()).await?;
            for kind in EVALUATED_KINDS {
                fs::copy(produced.path(kind), fresh.path(kind)).await?;
            }
        }
        info!(cycle, rows, "Contributions ingested");
        Ok(rows)
    }
}
