//! Solver invocation parameters

use std::path::{Path, PathBuf};

use fit_core::{FileKind, JobConfig, RegressionAlgorithm, SolverConfig};
use matrix_split::SPLIT_INPUT;
use serde::{Deserialize, Serialize};

/// Fully-formed arguments for one run of the external solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverInvocation {
    pub executable: String,
    pub algorithm: RegressionAlgorithm,

    /// SVD eps or Lasso alpha
    pub regularization: f64,
    pub normalize: bool,
    pub nodes: usize,

    /// Solver processes; the produced partition count when split
    pub cores: usize,

    /// Read `A.NNNN.txt` partitions instead of the combined matrix
    pub split: bool,
    pub mpi_exec: String,

    /// Archived checkpoint to continue from
    pub restart_from: Option<String>,

    /// Directory the solver runs in
    pub workdir: PathBuf,
}

impl SolverInvocation {
    /// Unsplit invocation using every process slot of the job
    pub fn new(solver: &SolverConfig, job: &JobConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            executable: solver.executable.clone(),
            algorithm: solver.algorithm,
            regularization: solver.regularization,
            normalize: solver.normalize,
            nodes: job.nodes,
            cores: job.slots(),
            split: false,
            mpi_exec: solver.mpi_exec.clone(),
            restart_from: None,
            workdir: workdir.into(),
        }
    }

    /// Read `partitions` split files, one per process
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.split = true;
        self.cores = partitions;
        self
    }

    pub fn resuming(mut self, checkpoint: impl Into<String>) -> Self {
        self.restart_from = Some(checkpoint.into());
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Matrix argument handed to the solver
    pub fn input_matrix(&self) -> &'static str {
        if self.split && self.algorithm.is_distributed() {
            SPLIT_INPUT
        } else {
            FileKind::AMatrix.combined_name()
        }
    }

    /// Solver arguments, excluding the executable
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--A".into(),
            self.input_matrix().into(),
            "--b".into(),
            FileKind::BVector.combined_name().into(),
            "--weights".into(),
            FileKind::Weights.combined_name().into(),
            "--algorithm".into(),
            self.algorithm.as_str().into(),
        ];

        match self.algorithm {
            RegressionAlgorithm::Dlasso | RegressionAlgorithm::Dlars => {
                args.extend([
                    "--active".to_string(),
                    "True".to_string(),
                    "--alpha".to_string(),
                    self.regularization.to_string(),
                    "--normalize".to_string(),
                    python_bool(self.normalize).to_string(),
                    "--nodes".to_string(),
                    self.nodes.to_string(),
                    "--cores".to_string(),
                    self.cores.to_string(),
                ]);
                if self.split {
                    args.extend(["--split_files".to_string(), "True".to_string()]);
                }
            }
            RegressionAlgorithm::Svd => {
                args.extend(["--eps".to_string(), self.regularization.to_string()]);
            }
            RegressionAlgorithm::Lasso | RegressionAlgorithm::Lassolars => {
                args.extend(["--alpha".to_string(), self.regularization.to_string()]);
            }
        }

        args.extend(["--mpiexecmnd".to_string(), self.mpi_exec.clone()]);

        if let Some(checkpoint) = &self.restart_from {
            args.extend(["--restart_dlasso_dlars".to_string(), checkpoint.clone()]);
        }
        args
    }

    /// Executable followed by its arguments, space separated
    pub fn command_line(&self) -> String {
        let mut parts = Vec::new();
        if !self.executable.is_empty() {
            parts.push(self.executable.clone());
        }
        parts.extend(self.to_args());
        parts.join(" ")
    }
}

// The solver parses its boolean flags as Python literals
fn python_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}
