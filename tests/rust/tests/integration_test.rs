use anyhow::Result;
use async_trait::async_trait;
use fit_core::{ErrorKind, FileKind, FileSet, PipelineConfig, RegressionAlgorithm};
use pipeline::{ContributionEvaluator, FitPipeline};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// Writes a fixed fresh set, standing in for the MD driver
struct FixedEvaluator {
    out: PathBuf,
    rows: usize,
}

#[async_trait]
impl ContributionEvaluator for FixedEvaluator {
    async fn evaluate(&self, _parameter_file: &Path, _trajectory: &Path) -> fit_core::Result<FileSet> {
        tokio::fs::create_dir_all(&self.out).await?;
        let set = FileSet::fresh(&self.out);
        let mut a = String::new();
        let mut b = String::new();
        let mut labeled = String::new();
        let mut natoms = String::new();
        for i in 0..self.rows {
            a.push_str(&format!("{} 1.0 2.0\n", i));
            b.push_str(&format!("{}\n", i));
            labeled.push_str(&format!("s_xx {}\n", i));
            natoms.push_str("16\n");
        }
        tokio::fs::write(set.path(FileKind::AMatrix), a).await?;
        tokio::fs::write(set.path(FileKind::BVector), b).await?;
        tokio::fs::write(set.path(FileKind::LabeledB), labeled).await?;
        tokio::fs::write(set.path(FileKind::Natoms), natoms).await?;
        Ok(set)
    }
}

async fn load(root: &Path, extra: &str) -> Result<PipelineConfig> {
    let path = root.join("fitprep.json");
    let json = format!(
        r#"{{ "cycle": {{ "root": {:?}, "do_cluster": false }}{} }}"#,
        root.display().to_string(),
        extra
    );
    tokio::fs::write(&path, json).await?;
    Ok(PipelineConfig::load(&path).await?)
}

#[tokio::test]
async fn test_config_file_round_trip() -> Result<()> {
    let root = TempDir::new()?;
    let config = load(root.path(), r#", "solver": { "algorithm": "svd", "regularization": 0.01 }"#).await?;
    assert_eq!(config.solver.algorithm, RegressionAlgorithm::Svd);
    assert_eq!(config.job.slots(), 36);
    assert!(!config.cycle.do_cluster);

    let err = load(root.path(), r#", "solver": { "algoritm": "svd" }"#)
        .await
        .unwrap_err();
    let err = err.downcast::<fit_core::Error>()?;
    assert_eq!(err.kind(), ErrorKind::Config);

    let err = load(root.path(), r#", "weighting": { "stress": { "method": "B", "params": [1.0] } }"#)
        .await
        .unwrap_err()
        .downcast::<fit_core::Error>()?;
    assert!(err.to_string().contains("weighting.stress"));
    Ok(())
}

#[tokio::test]
async fn test_unclustered_lineage_starts_at_cycle_one() -> Result<()> {
    let root = TempDir::new()?;
    let pipeline = FitPipeline::new(load(root.path(), "").await?)?;
    let evaluator = FixedEvaluator {
        out: root.path().join("md"),
        rows: 3,
    };

    let rows = pipeline
        .ingest_contributions(1, &evaluator, Path::new("params.txt"), Path::new("traj.xyz"))
        .await?;
    assert_eq!(rows, 3);

    // No cycle 0 exists; cycle 1 adopts its fresh rows
    let plan = pipeline.prepare_solve(1).await?;
    assert!(plan.accumulation.adopted);
    assert_eq!(plan.accumulation.rows, 3);

    let store = pipeline.layout().store(1);
    assert_eq!(
        store.read_to_string("weights_comb.dat").await?,
        "250.0\n250.0\n250.0\n"
    );
    assert_eq!(
        plan.invocation.to_args(),
        vec![
            "--A", "A_comb.txt", "--b", "b_comb.txt", "--weights", "weights_comb.dat",
            "--algorithm", "lassolars", "--alpha", "0.0001", "--mpiexecmnd", "srun",
        ]
    );

    // Re-running the solve preparation after adoption is harmless
    let again = pipeline.prepare_solve(1).await?;
    assert_eq!(again.accumulation.rows, 3);

    // Cycle 2 extends cycle 1
    pipeline
        .ingest_contributions(2, &evaluator, Path::new("params.txt"), Path::new("traj.xyz"))
        .await?;
    let plan = pipeline.prepare_solve(2).await?;
    assert_eq!(plan.accumulation.rows, 6);
    Ok(())
}

#[tokio::test]
async fn test_serial_solver_cannot_resume() -> Result<()> {
    let root = TempDir::new()?;
    let pipeline = FitPipeline::new(load(root.path(), "").await?)?;
    let store = pipeline.layout().store(0);
    store.write("restart.txt", b"state").await?;

    let err = pipeline.prepare_resume(0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(!store.exists("restart-1.txt").await);
    Ok(())
}
