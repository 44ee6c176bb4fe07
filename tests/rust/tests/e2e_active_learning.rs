//! End-to-end active-learning simulation
//!
//! Runs several cycles through the pipeline with a distributed solver:
//! - fresh rows are weighted and folded into the combined set
//! - large combined sets are split across the job's process slots
//! - an interrupted solve is resumed twice, extending the restart chain

use anyhow::Result;
use checkpoint::ATTEMPT_FILE;
use fit_core::{Cycle, FileKind, PipelineConfig};
use matrix_split::{read_manifest, PartitionCensus};
use pipeline::FitPipeline;
use row_store::LocalStore;
use tempfile::TempDir;

fn config_json(root: &std::path::Path) -> String {
    format!(
        r#"{{
            "weighting": {{
                "force": {{ "methods": ["A", "B"], "params": [[1.0], [2.0, 1.0]] }},
                "energy": {{ "method": "E", "params": [2.0] }}
            }},
            "solver": {{ "algorithm": "dlasso", "executable": "/opt/lsq/lsq2.py", "mpi_exec": "mpirun" }},
            "job": {{ "nodes": 1, "ppn": 4 }},
            "cycle": {{ "root": {:?} }}
        }}"#,
        root.display().to_string()
    )
}

/// Simulates the external generator writing a cycle's fresh rows
async fn generate_cycle(pipeline: &FitPipeline, cycle: Cycle, labels: &[&str]) -> Result<()> {
    let store = pipeline.layout().store(cycle);
    let mut a = String::new();
    let mut b = String::new();
    let mut labeled = String::new();
    let mut natoms = String::new();
    for (i, label) in labels.iter().enumerate() {
        let id = format!("{}.{}", cycle, i);
        a.push_str(&format!("{} 0.1 0.2 0.3 0.4\n", id));
        b.push_str(&format!("{}\n", id));
        labeled.push_str(&format!("{} {}\n", label, id));
        natoms.push_str("2\n");
    }
    store.write("A.txt", a.as_bytes()).await?;
    store.write("b.txt", b.as_bytes()).await?;
    store.write("b-labeled.txt", labeled.as_bytes()).await?;
    store.write("natoms.txt", natoms.as_bytes()).await?;
    Ok(())
}

/// Simulates the solver getting far enough to write its state, then dying
async fn interrupt_solve(store: &LocalStore, state: &str) -> Result<()> {
    store.write("restart.txt", state.as_bytes()).await?;
    store.write("dlars.log", b"iteration 42\n").await?;
    store.write("traj.txt", b"0 0.1\n1 0.05\n").await?;
    Ok(())
}

#[tokio::test]
async fn test_three_cycle_run_with_resume() -> Result<()> {
    let root = TempDir::new()?;
    let config = PipelineConfig::from_json(&config_json(root.path()))?;
    let pipeline = FitPipeline::new(config)?;

    // Cycle 0: 3 rows on 4 slots, solved unsplit
    generate_cycle(&pipeline, 0, &["Fx", "C1+1", "Fy"]).await?;
    let plan = pipeline.prepare_solve(0).await?;
    assert!(plan.accumulation.adopted);
    assert!(plan.split.is_none());
    assert_eq!(plan.invocation.cores, 4);
    assert_eq!(plan.accumulation.dim.map(|d| (d.columns, d.total_rows)), Some((5, 3)));

    // Cycle 1: 6 combined rows are split 2 per partition
    generate_cycle(&pipeline, 1, &["Fz", "C1+1", "Fx"]).await?;
    let plan = pipeline.prepare_solve(1).await?;
    assert_eq!(plan.accumulation.rows, 6);
    let split = plan.split.clone().expect("cycle 1 should be split");
    assert_eq!(split.lines_per_partition, 2);
    assert_eq!(split.partition_count(), 3);
    assert_eq!(plan.invocation.cores, 3);
    assert!(plan
        .invocation
        .command_line()
        .starts_with("/opt/lsq/lsq2.py --A A.txt --b b_comb.txt"));

    let store = pipeline.layout().store(1);
    let last = read_manifest(&store, 2).await?;
    assert_eq!((last.first_row, last.last_row, last.total_rows), (4, 5, 6));

    // The solve starts, then is interrupted twice
    assert!(!pipeline.solve_started(1).await);
    interrupt_solve(&store, "state-a").await?;
    assert!(pipeline.solve_started(1).await);
    assert!(!pipeline.solve_completed(1).await);

    let resume = pipeline.prepare_resume(1).await?;
    assert_eq!(resume.checkpoint, "restart-1.txt");
    assert!(resume.invocation.split);
    assert_eq!(resume.invocation.cores, 3);
    assert!(resume
        .invocation
        .command_line()
        .ends_with("--mpiexecmnd mpirun --restart_dlasso_dlars restart-1.txt"));

    interrupt_solve(&store, "state-b").await?;
    let resume = pipeline.prepare_resume(1).await?;
    assert_eq!(resume.checkpoint, "restart-2.txt");
    assert_eq!(store.read_to_string("restart-1.txt").await?, "state-a");
    assert_eq!(store.read_to_string("restart-2.txt").await?, "state-b");
    assert_eq!(store.child("run-2").read_to_string("restart.txt").await?, "state-b");
    let attempt: serde_json::Value =
        serde_json::from_str(&store.child("run-2").read_to_string(ATTEMPT_FILE).await?)?;
    assert_eq!(attempt["run"], 2);

    store.write("x.txt", b"0.3\n").await?;
    store.write("Ax.txt", b"0.1\n").await?;
    assert!(pipeline.solve_completed(1).await);

    // Cycle 2: 8 combined rows re-split, previous partitions replaced
    generate_cycle(&pipeline, 2, &["G_Fx", "C1+1"]).await?;
    let plan = pipeline.prepare_solve(2).await?;
    assert_eq!(plan.accumulation.rows, 8);
    assert_eq!(plan.split.map(|s| s.partition_count()), Some(4));

    let store = pipeline.layout().store(2);
    assert_eq!(
        store.read_to_string("b_comb.txt").await?,
        "0.0\n0.1\n0.2\n1.0\n1.1\n1.2\n2.0\n2.1\n"
    );
    // Force rows use A*B, energy rows natoms^2, the gas row keeps its default
    assert_eq!(
        store.read_to_string("weights_comb.dat").await?,
        "2.0\n4.0\n2.0\n2.0\n4.0\n2.0\n5.0\n4.0\n"
    );

    let census = PartitionCensus::take(&store).await?;
    assert_eq!(census.verify(&store, 4)?, 4);

    // Earlier cycles keep their own combined sets
    let cycle0 = pipeline.layout().combined(0);
    let rows0 = row_store::RowFile::new(cycle0.path(FileKind::AMatrix))
        .line_count()
        .await?;
    assert_eq!(rows0, 3);

    Ok(())
}

#[tokio::test]
async fn test_resume_refuses_corrupted_partitions() -> Result<()> {
    let root = TempDir::new()?;
    let pipeline = FitPipeline::new(PipelineConfig::from_json(&config_json(root.path()))?)?;

    generate_cycle(&pipeline, 0, &["Fx", "Fy", "Fz", "Fx", "Fy"]).await?;
    pipeline.prepare_solve(0).await?;

    let store = pipeline.layout().store(0);
    interrupt_solve(&store, "state").await?;
    // A partial trailing manifest is lost
    tokio::fs::remove_file(store.resolve("dim.0002.txt")).await?;

    let err = pipeline.prepare_resume(0).await.unwrap_err();
    assert_eq!(err.kind(), fit_core::ErrorKind::Consistency);
    assert!(err.to_string().contains("3 A.XXXX.txt vs 2 dim.XXXX.txt"));
    Ok(())
}
