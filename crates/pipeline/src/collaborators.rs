//! External collaborators at the pipeline boundary
//!
//! The solver executable and the MD driver that evaluates parameter
//! contributions are black boxes; the pipeline only talks to them through
//! these traits.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use checkpoint::SolverInvocation;
use fit_core::{Error, FileSet, Result};
use tokio::process::{Child, Command};
use tracing::{info, instrument};

/// File the launched solver's standard output is captured into
pub const SOLVER_OUTPUT: &str = "params.txt";

/// Opaque handle to a launched solve
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    child: Option<Child>,
}

impl JobHandle {
    /// Handle for a job tracked elsewhere (a scheduler job id)
    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            child: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for a locally spawned solver and return its exit code.
    ///
    /// Externally tracked jobs return `None` immediately.
    pub async fn wait(self) -> Result<Option<i32>> {
        match self.child {
            Some(mut child) => {
                let status = child.wait().await?;
                Ok(status.code())
            }
            None => Ok(None),
        }
    }
}

/// Starts the external solver
#[async_trait]
pub trait SolverLauncher: Send + Sync {
    /// Launch `invocation` in its working directory
    async fn launch(&self, invocation: &SolverInvocation) -> Result<JobHandle>;
}

/// Evaluates a parameter set against a trajectory with an external MD driver
#[async_trait]
pub trait ContributionEvaluator: Send + Sync {
    /// Produce a fresh file set (A, b, labeled b, natoms) holding the rows
    /// left to fit once the parameter set's contribution is subtracted
    async fn evaluate(&self, parameter_file: &Path, trajectory: &Path) -> Result<FileSet>;
}

/// Runs the solver executable as a local child process
#[derive(Debug, Clone, Default)]
pub struct CommandLauncher;

impl CommandLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SolverLauncher for CommandLauncher {
    #[instrument(skip_all, fields(workdir = %invocation.workdir().display()))]
    async fn launch(&self, invocation: &SolverInvocation) -> Result<JobHandle> {
        if invocation.executable.is_empty() {
            return Err(Error::InvalidConfig {
                message: "solver.executable must be set to launch the solver".to_string(),
            });
        }

        let output = tokio::fs::File::create(invocation.workdir().join(SOLVER_OUTPUT))
            .await?
            .into_std()
            .await;

        let child = Command::new(&invocation.executable)
            .args(invocation.to_args())
            .current_dir(invocation.workdir())
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .spawn()?;

        let id = child
            .id()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "exited".to_string());
        info!(pid = %id, executable = %invocation.executable, "Solver launched");

        Ok(JobHandle {
            id,
            child: Some(child),
        })
    }
}
