//! Partition and manifest file naming, single-partition manifests and
//! partition census

use fit_core::{ChunkManifest, DimManifest, Error, Result, PARTITION_SUFFIX_WIDTH};
use row_store::{LocalStore, RowFile};
use tracing::{debug, info};

/// Single-partition manifest file name
pub const DIM_FILE: &str = "dim.txt";

/// Input name a distributed solver expands into `A.NNNN.txt`
pub const SPLIT_INPUT: &str = "A.txt";

const PARTITION_PREFIX: &str = "A.";
const MANIFEST_PREFIX: &str = "dim.";
const SUFFIX: &str = ".txt";

/// `A.NNNN.txt`
pub fn partition_name(index: usize) -> String {
    format!(
        "{}{:0width$}{}",
        PARTITION_PREFIX,
        index,
        SUFFIX,
        width = PARTITION_SUFFIX_WIDTH
    )
}

/// `dim.NNNN.txt`
pub fn manifest_name(index: usize) -> String {
    format!(
        "{}{:0width$}{}",
        MANIFEST_PREFIX,
        index,
        SUFFIX,
        width = PARTITION_SUFFIX_WIDTH
    )
}

/// Write one partition manifest
pub async fn write_manifest(store: &LocalStore, index: usize, manifest: &ChunkManifest) -> Result<()> {
    store
        .write(&manifest_name(index), format!("{}\n", manifest).as_bytes())
        .await?;
    debug!(index, manifest = %manifest, "Wrote partition manifest");
    Ok(())
}

/// Read one partition manifest
pub async fn read_manifest(store: &LocalStore, index: usize) -> Result<ChunkManifest> {
    store.read_to_string(&manifest_name(index)).await?.parse()
}

/// Column count of the first row of `a` and row count of `b`.
///
/// Only the first row of `a` is sampled.
pub async fn measure(a: &RowFile, b: &RowFile) -> Result<DimManifest> {
    let columns = a
        .first_line()
        .await?
        .map(|line| line.split_whitespace().count())
        .ok_or_else(|| Error::EmptyInput {
            path: a.path().to_path_buf(),
        })?;
    let total_rows = b.line_count().await?;
    Ok(DimManifest { columns, total_rows })
}

/// Measure a combined matrix and write `dim.txt` next to it
pub async fn write_dim(store: &LocalStore, a: &RowFile, b: &RowFile) -> Result<DimManifest> {
    let dim = measure(a, b).await?;
    store.write(DIM_FILE, format!("{}\n", dim).as_bytes()).await?;
    info!(columns = dim.columns, rows = dim.total_rows, "Wrote dimension manifest");
    Ok(dim)
}

/// Counts of partition and manifest files present in a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionCensus {
    pub partitions: usize,
    pub manifests: usize,
}

impl PartitionCensus {
    pub async fn take(store: &LocalStore) -> Result<Self> {
        let partitions = store.list_matching(PARTITION_PREFIX, SUFFIX).await?.len();
        let manifests = store.list_matching(MANIFEST_PREFIX, SUFFIX).await?.len();
        Ok(Self {
            partitions,
            manifests,
        })
    }

    /// Check the partition set is usable on `slots` processes and return the
    /// partition count.
    pub fn verify(&self, store: &LocalStore, slots: usize) -> Result<usize> {
        if self.partitions != self.manifests {
            return Err(Error::PartitionManifestMismatch {
                dir: store.base_path().to_path_buf(),
                partitions: self.partitions,
                manifests: self.manifests,
            });
        }
        if self.partitions > slots {
            return Err(Error::PartitionsExceedSlots {
                dir: store.base_path().to_path_buf(),
                partitions: self.partitions,
                slots,
            });
        }
        Ok(self.partitions)
    }
}

/// Remove stale `A.NNNN.txt` / `dim.NNNN.txt` files, returning how many
pub async fn clear_partitions(store: &LocalStore) -> Result<usize> {
    let removed = store.remove_matching(PARTITION_PREFIX, SUFFIX).await?
        + store.remove_matching(MANIFEST_PREFIX, SUFFIX).await?;
    if removed > 0 {
        info!(removed, dir = %store.base_path().display(), "Cleared previous partitions");
    }
    Ok(removed)
}
