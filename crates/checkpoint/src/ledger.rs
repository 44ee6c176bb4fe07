//! Restart checkpoint ledger for a distributed solve
//!
//! The solver keeps its live state in `restart.txt`. Each resume archives
//! that state as `restart-<n>.txt`, snapshots the attempt's artifacts into
//! `run-<n>/` and rebuilds the solver invocation from what is on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fit_core::{Error, FileKind, JobConfig, Result, SolverConfig};
use matrix_split::{partition_name, PartitionCensus};
use row_store::LocalStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::invocation::SolverInvocation;

/// Live checkpoint the solver reads and rewrites
pub const LIVE_CHECKPOINT: &str = "restart.txt";

/// Attempt record written into each run snapshot
pub const ATTEMPT_FILE: &str = "attempt.json";

const CHAIN_PREFIX: &str = "restart";
const CHAIN_SUFFIX: &str = "txt";

/// Ordered restart chain: archived checkpoints by index plus the live one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartChain {
    archived: BTreeMap<u32, String>,
    live: bool,
}

impl RestartChain {
    /// `restart-<index>.txt`
    pub fn archive_name(index: u32) -> String {
        format!("{}-{}.{}", CHAIN_PREFIX, index, CHAIN_SUFFIX)
    }

    /// Build a chain from checkpoint file names found in `dir`
    pub fn from_names<I, S>(dir: &Path, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut chain = Self::default();
        for name in names {
            let name = name.as_ref();
            if name == LIVE_CHECKPOINT {
                chain.live = true;
                continue;
            }
            match parse_index(name) {
                Some(index) => {
                    chain.archived.insert(index, name.to_string());
                }
                None => {
                    return Err(Error::MalformedCheckpointName {
                        dir: dir.to_path_buf(),
                        name: name.to_string(),
                    })
                }
            }
        }

        if chain.is_empty() {
            return Err(Error::EmptyRestartChain {
                dir: dir.to_path_buf(),
            });
        }
        if !chain.live {
            let last = chain.names().pop().unwrap_or_default();
            return Err(Error::LiveCheckpointMissing {
                dir: dir.to_path_buf(),
                last,
            });
        }
        Ok(chain)
    }

    /// List and validate the chain in a solve directory
    pub async fn discover(store: &LocalStore) -> Result<Self> {
        let names = store.list_matching(CHAIN_PREFIX, CHAIN_SUFFIX).await?;
        debug!(?names, "Found restart checkpoints");
        Self::from_names(store.base_path(), names)
    }

    pub fn is_empty(&self) -> bool {
        self.archived.is_empty() && !self.live
    }

    pub fn len(&self) -> usize {
        self.archived.len() + usize::from(self.live)
    }

    /// Highest archived index
    pub fn latest(&self) -> Option<u32> {
        self.archived.keys().next_back().copied()
    }

    /// Index the live checkpoint is archived under next
    ///
    /// Archived indices stay below `u32::MAX`, so this never overflows.
    pub fn next_index(&self) -> u32 {
        self.latest().map_or(1, |n| n + 1)
    }

    /// Names in chain order; the live checkpoint is last
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.archived.values().cloned().collect();
        if self.live {
            names.push(LIVE_CHECKPOINT.to_string());
        }
        names
    }
}

fn parse_index(name: &str) -> Option<u32> {
    let digits = name
        .strip_prefix(CHAIN_PREFIX)?
        .strip_prefix('-')?
        .strip_suffix(CHAIN_SUFFIX)?
        .strip_suffix('.')?;
    let index = digits.parse::<u32>().ok()?;
    // Only the canonical spelling counts; `restart-01.txt` would alias `restart-1.txt`.
    // The top index is reserved so `next_index` always has a successor.
    (index > 0 && index < u32::MAX && RestartChain::archive_name(index) == name).then_some(index)
}

/// Contents of `run-<n>/attempt.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub run: u32,

    /// Name the live checkpoint was archived under
    pub archived_as: String,

    /// Files copied into the snapshot
    pub captured: Vec<String>,

    /// Artifacts that were expected but absent
    pub missing: Vec<String>,

    pub created_at: DateTime<Utc>,
}

/// Everything needed to relaunch an interrupted solve
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePlan {
    /// Archived checkpoint the solver continues from
    pub checkpoint: String,
    pub snapshot_dir: PathBuf,
    pub record: AttemptRecord,
    pub invocation: SolverInvocation,
}

/// Restart ledger of one solve directory
#[derive(Debug, Clone)]
pub struct RestartLedger {
    store: LocalStore,
    solver: SolverConfig,
    job: JobConfig,
}

impl RestartLedger {
    pub fn new(store: LocalStore, solver: &SolverConfig, job: &JobConfig) -> Self {
        Self {
            store,
            solver: solver.clone(),
            job: job.clone(),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Archive the live checkpoint and rebuild the solver invocation.
    ///
    /// Any inconsistency aborts; files already archived are left in place.
    #[instrument(skip(self), fields(dir = %self.store.base_path().display()))]
    pub async fn prepare_resume(&self) -> Result<ResumePlan> {
        if !self.solver.algorithm.is_distributed() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "resume is only supported for dlasso and dlars, not {}",
                    self.solver.algorithm.as_str()
                ),
            });
        }

        let chain = RestartChain::discover(&self.store).await?;
        info!(checkpoints = ?chain.names(), "Discovered restart chain");

        let record = self.archive(&chain).await?;
        let invocation = self.reconstruct().await?.resuming(&record.archived_as);

        info!(
            run = record.run,
            checkpoint = %record.archived_as,
            split = invocation.split,
            cores = invocation.cores,
            "Resume prepared"
        );
        Ok(ResumePlan {
            checkpoint: record.archived_as.clone(),
            snapshot_dir: self.store.resolve(&run_dir(record.run)),
            record,
            invocation,
        })
    }

    async fn archive(&self, chain: &RestartChain) -> Result<AttemptRecord> {
        let run = chain.next_index();
        let archived_as = RestartChain::archive_name(run);
        self.store.copy(LIVE_CHECKPOINT, &archived_as).await?;

        let dir = run_dir(run);
        self.store.create_dir_all(&dir).await?;

        let mut captured = Vec::new();
        let mut missing = Vec::new();
        for (name, required) in [
            (LIVE_CHECKPOINT, true),
            (self.solver.log_file.as_str(), false),
            (self.solver.trajectory_file.as_str(), false),
        ] {
            if !required && !self.store.exists(name).await {
                warn!(file = name, run, "Solver artifact missing, not captured");
                missing.push(name.to_string());
                continue;
            }
            self.store.copy(name, &format!("{}/{}", dir, name)).await?;
            captured.push(name.to_string());
        }

        let record = AttemptRecord {
            run,
            archived_as,
            captured,
            missing,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        self.store
            .write(&format!("{}/{}", dir, ATTEMPT_FILE), &json)
            .await?;

        info!(run, archived_as = %record.archived_as, "Archived live checkpoint");
        Ok(record)
    }

    /// A solve was split when the combined row count reaches the slot count
    async fn reconstruct(&self) -> Result<SolverInvocation> {
        let slots = self.job.slots();
        let rows = self
            .store
            .row_file(FileKind::BVector.combined_name())
            .line_count()
            .await?;
        let invocation = SolverInvocation::new(&self.solver, &self.job, self.store.base_path());

        if rows < slots as u64 {
            debug!(rows, slots, "Previous solve was not split");
            return Ok(invocation);
        }

        let partitions = PartitionCensus::take(&self.store)
            .await?
            .verify(&self.store, slots)?;
        if partitions == 0 {
            return Err(Error::PathNotFound {
                path: self.store.resolve(&partition_name(0)),
            });
        }
        info!(partitions, slots, "Resuming split solve");
        Ok(invocation.with_partitions(partitions))
    }
}

fn run_dir(run: u32) -> String {
    format!("run-{}", run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fit_core::RegressionAlgorithm;
    use matrix_split::manifest_name;
    use tempfile::TempDir;

    fn dlasso() -> SolverConfig {
        SolverConfig {
            algorithm: RegressionAlgorithm::Dlasso,
            ..Default::default()
        }
    }

    async fn solve_dir(rows: usize, checkpoints: &[&str]) -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        store
            .write("b_comb.txt", "0.5\n".repeat(rows).as_bytes())
            .await
            .unwrap();
        for name in checkpoints {
            store.write(name, name.as_bytes()).await.unwrap();
        }
        (dir, store)
    }

    #[test]
    fn test_chain_order() {
        let chain = RestartChain::from_names(
            Path::new("GEN_FF"),
            ["restart-10.txt", "restart.txt", "restart-2.txt", "restart-1.txt"],
        )
        .unwrap();
        assert_eq!(
            chain.names(),
            vec!["restart-1.txt", "restart-2.txt", "restart-10.txt", "restart.txt"]
        );
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.latest(), Some(10));
        assert_eq!(chain.next_index(), 11);

        let live_only = RestartChain::from_names(Path::new("."), ["restart.txt"]).unwrap();
        assert_eq!(live_only.next_index(), 1);
    }

    #[test]
    fn test_highest_index_has_successor() {
        let chain =
            RestartChain::from_names(Path::new("GEN_FF"), ["restart-4294967294.txt", "restart.txt"])
                .unwrap();
        assert_eq!(chain.next_index(), u32::MAX);
    }

    #[test]
    fn test_chain_errors() {
        let dir = Path::new("GEN_FF");
        let none: [&str; 0] = [];
        assert!(matches!(
            RestartChain::from_names(dir, none),
            Err(Error::EmptyRestartChain { .. })
        ));
        assert!(matches!(
            RestartChain::from_names(dir, ["restart-1.txt", "restart-2.txt"]),
            Err(Error::LiveCheckpointMissing { last, .. }) if last == "restart-2.txt"
        ));
        for bad in [
            "restart_old.txt",
            "restart-01.txt",
            "restart-0.txt",
            "restart-x.txt",
            "restart-4294967295.txt",
            "restart-4294967296.txt",
        ] {
            let err = RestartChain::from_names(dir, ["restart.txt", bad]).unwrap_err();
            assert!(matches!(err, Error::MalformedCheckpointName { .. }), "{}", bad);
            assert_eq!(err.kind(), fit_core::ErrorKind::State);
        }
    }

    #[tokio::test]
    async fn test_resume_extends_chain() {
        let (_dir, store) =
            solve_dir(4, &["restart.txt", "restart-1.txt", "restart-2.txt", "dlars.log", "traj.txt"])
                .await;
        let ledger = RestartLedger::new(store.clone(), &dlasso(), &JobConfig::default());

        let plan = ledger.prepare_resume().await.unwrap();
        assert_eq!(plan.checkpoint, "restart-3.txt");
        assert_eq!(plan.record.run, 3);
        assert_eq!(store.read_to_string("restart-3.txt").await.unwrap(), "restart.txt");
        assert!(store.exists("restart.txt").await);

        let run = store.child("run-3");
        for name in ["restart.txt", "dlars.log", "traj.txt", ATTEMPT_FILE] {
            assert!(run.exists(name).await, "{} not captured", name);
        }
        let record: AttemptRecord =
            serde_json::from_str(&run.read_to_string(ATTEMPT_FILE).await.unwrap()).unwrap();
        assert_eq!(record, plan.record);
        assert!(record.missing.is_empty());

        let args = plan.invocation.to_args();
        assert_eq!(args[1], "A_comb.txt");
        assert_eq!(args[args.len() - 1], "restart-3.txt");
        assert_eq!(plan.snapshot_dir, store.resolve("run-3"));
    }

    #[tokio::test]
    async fn test_first_resume_and_missing_artifacts() {
        let (_dir, store) = solve_dir(4, &["restart.txt"]).await;
        let ledger = RestartLedger::new(store.clone(), &dlasso(), &JobConfig::default());

        let plan = ledger.prepare_resume().await.unwrap();
        assert_eq!(plan.checkpoint, "restart-1.txt");
        assert_eq!(plan.record.captured, vec!["restart.txt"]);
        assert_eq!(plan.record.missing, vec!["dlars.log", "traj.txt"]);
        assert!(store.child("run-1").exists("restart.txt").await);

        // The next resume continues the chain
        let plan = ledger.prepare_resume().await.unwrap();
        assert_eq!(plan.checkpoint, "restart-2.txt");
    }

    #[tokio::test]
    async fn test_resume_split_solve() {
        let (_dir, store) = solve_dir(9, &["restart.txt"]).await;
        for i in 0..3 {
            store.write(&partition_name(i), b"1 2\n").await.unwrap();
            store.write(&manifest_name(i), b"2 0 0 9\n").await.unwrap();
        }
        let job = JobConfig { nodes: 2, ppn: 2 };
        let ledger = RestartLedger::new(store.clone(), &dlasso(), &job);

        let plan = ledger.prepare_resume().await.unwrap();
        assert!(plan.invocation.split);
        assert_eq!(plan.invocation.cores, 3);
        assert_eq!(plan.invocation.input_matrix(), "A.txt");
        assert!(plan.invocation.to_args().contains(&"--split_files".to_string()));

        store.write(&partition_name(3), b"1 2\n").await.unwrap();
        let err = ledger.prepare_resume().await.unwrap_err();
        assert!(matches!(err, Error::PartitionManifestMismatch { .. }));
        // Archiving happened before the check and is left in place
        assert!(store.exists("restart-2.txt").await);
    }

    #[tokio::test]
    async fn test_split_needs_partitions() {
        let (_dir, store) = solve_dir(9, &["restart.txt"]).await;
        let job = JobConfig { nodes: 1, ppn: 4 };
        let err = RestartLedger::new(store, &dlasso(), &job)
            .prepare_resume()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PathNotFound { .. }));
    }

    #[tokio::test]
    async fn test_too_many_partitions() {
        let (_dir, store) = solve_dir(9, &["restart.txt"]).await;
        for i in 0..5 {
            store.write(&partition_name(i), b"").await.unwrap();
            store.write(&manifest_name(i), b"").await.unwrap();
        }
        let job = JobConfig { nodes: 1, ppn: 4 };
        let err = RestartLedger::new(store, &dlasso(), &job)
            .prepare_resume()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PartitionsExceedSlots {
                partitions: 5,
                slots: 4,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resume_requires_distributed_solver() {
        let (_dir, store) = solve_dir(4, &["restart.txt"]).await;
        let solver = SolverConfig::default();
        let err = RestartLedger::new(store.clone(), &solver, &JobConfig::default())
            .prepare_resume()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(!store.exists("restart-1.txt").await);
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let (_dir, store) = solve_dir(4, &[]).await;
        let err = RestartLedger::new(store, &dlasso(), &JobConfig::default())
            .prepare_resume()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyRestartChain { .. }));
    }
}
