//! fitprep binary entry point
//!
//! Usage: `fitprep <config.json> <solve|resume|status> <cycle>`

use std::process::ExitCode;

use checkpoint::SolverInvocation;
use fit_core::{telemetry, Cycle, PipelineConfig};
use pipeline::{CommandLauncher, FitPipeline, SolverLauncher};

const USAGE: &str = "usage: fitprep <config.json> <solve|resume|status> <cycle>";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    telemetry::init(telemetry::DEFAULT_FILTER);

    match run(std::env::args().skip(1).collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Vec<String>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let [config_path, command, cycle] = args.as_slice() else {
        return Err(USAGE.into());
    };
    let cycle: Cycle = cycle
        .parse()
        .map_err(|_| format!("invalid cycle {:?}\n{}", cycle, USAGE))?;

    let config = PipelineConfig::load(config_path).await?;
    let launch = config.solver.launch;
    let pipeline = FitPipeline::new(config)?;

    match command.as_str() {
        "solve" => {
            let plan = pipeline.prepare_solve(cycle).await?;
            submit(&plan.invocation, launch).await?;
        }
        "resume" => {
            let plan = pipeline.prepare_resume(cycle).await?;
            tracing::info!(
                "Archived restart.txt as {} (snapshot {})",
                plan.checkpoint,
                plan.snapshot_dir.display()
            );
            submit(&plan.invocation, launch).await?;
        }
        "status" => {
            let started = pipeline.solve_started(cycle).await;
            let completed = pipeline.solve_completed(cycle).await;
            println!("cycle {}: started={} completed={}", cycle, started, completed);
        }
        other => return Err(format!("unknown command {:?}\n{}", other, USAGE).into()),
    }

    Ok(())
}

async fn submit(
    invocation: &SolverInvocation,
    launch: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("{}", invocation.command_line());
    if !launch {
        return Ok(());
    }

    let handle = CommandLauncher::new().launch(invocation).await?;
    tracing::info!("Solver running as pid {}", handle.id());
    match handle.wait().await? {
        Some(0) | None => Ok(()),
        Some(code) => Err(format!("solver exited with status {}", code).into()),
    }
}
