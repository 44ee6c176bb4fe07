//! Combine one cycle's fresh rows with the previous cycle's combined rows

use fit_core::{
    Cycle, DimManifest, Error, FileKind, FileSet, RegressionAlgorithm, Result, SetRole,
};
use row_store::{concat, LocalStore, RowFile};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Result of accumulating one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulation {
    pub combined: FileSet,

    /// Rows in every combined file
    pub rows: u64,

    /// The fresh set was adopted as the start of a lineage
    pub adopted: bool,

    /// Single-partition manifest, written for distributed solvers
    pub dim: Option<DimManifest>,
}

/// Folds fresh file sets into running combined sets
#[derive(Debug, Clone)]
pub struct CycleAccumulator {
    algorithm: RegressionAlgorithm,
}

impl CycleAccumulator {
    pub fn new(algorithm: RegressionAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Build the combined set for `cycle` in the fresh set's directory.
    ///
    /// With no `previous` set the fresh files are renamed into the combined
    /// names. Otherwise each combined file is `previous ++ fresh`; the
    /// previous cycle's files are only read.
    #[instrument(skip_all, fields(cycle = cycle, dir = %fresh.dir().display()))]
    pub async fn accumulate(
        &self,
        cycle: Cycle,
        fresh: &FileSet,
        previous: Option<&FileSet>,
    ) -> Result<Accumulation> {
        if fresh.role() != SetRole::Fresh {
            return Err(Error::Internal {
                message: format!("cycle {} input set is not a fresh set", cycle),
            });
        }
        let combined = FileSet::combined(fresh.dir());

        let adopted = match previous {
            None => {
                adopt(fresh, &combined).await?;
                true
            }
            Some(previous) => {
                extend(cycle, previous, fresh, &combined).await?;
                false
            }
        };

        let rows = verify_aligned(&combined, &FileKind::ALL).await?;

        let dim = if self.algorithm.is_distributed() {
            let store = LocalStore::new(combined.dir());
            let a = RowFile::new(combined.path(FileKind::AMatrix));
            let b = RowFile::new(combined.path(FileKind::BVector));
            Some(matrix_split::write_dim(&store, &a, &b).await?)
        } else {
            None
        };

        info!(rows, adopted, "Cycle accumulated");
        Ok(Accumulation {
            combined,
            rows,
            adopted,
            dim,
        })
    }
}

async fn adopt(fresh: &FileSet, combined: &FileSet) -> Result<()> {
    let anchor = combined.path(FileKind::AMatrix);
    if fs::metadata(&anchor).await.is_ok() {
        warn!(path = %anchor.display(), "Combined set already present, skipping adoption");
        return Ok(());
    }

    for kind in FileKind::ALL {
        let from = fresh.path(kind);
        let to = combined.path(kind);
        fs::rename(&from, &to).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::PathNotFound { path: from.clone() }
            } else {
                Error::Io(e)
            }
        })?;
        debug!(from = %from.display(), to = %to.display(), "Adopted fresh file");
    }
    Ok(())
}

async fn extend(cycle: Cycle, previous: &FileSet, fresh: &FileSet, combined: &FileSet) -> Result<()> {
    if previous.dir() == combined.dir() {
        return Err(Error::Internal {
            message: format!(
                "cycle {} would overwrite its own previous combined set",
                cycle
            ),
        });
    }

    for (kind, path) in previous.paths() {
        if fs::metadata(&path).await.is_err() {
            debug!(kind = ?kind, path = %path.display(), "Previous combined file missing");
            return Err(Error::MissingPreviousCycle {
                cycle: cycle.saturating_sub(1),
                dir: previous.dir().to_path_buf(),
            });
        }
    }

    for kind in FileKind::ALL {
        let rows = concat(
            &combined.path(kind),
            &[previous.path(kind), fresh.path(kind)],
        )
        .await?;
        debug!(kind = ?kind, rows, "Combined file written");
    }
    Ok(())
}

/// Check every file of `kinds` in `set` has the same row count and return it.
///
/// The b-vector is the reference count when present.
pub async fn verify_aligned(set: &FileSet, kinds: &[FileKind]) -> Result<u64> {
    let mut counts = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let path = set.path(kind);
        let rows = RowFile::new(&path).line_count().await?;
        counts.push((kind, path, rows));
    }

    let expected = counts
        .iter()
        .find(|(kind, _, _)| *kind == FileKind::BVector)
        .or_else(|| counts.first())
        .map(|(_, _, rows)| *rows)
        .unwrap_or(0);

    for (_, path, rows) in counts {
        if rows != expected {
            return Err(Error::RowCountMismatch {
                path,
                expected,
                actual: rows,
            });
        }
    }
    Ok(expected)
}
