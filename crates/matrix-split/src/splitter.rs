//! Streaming A-matrix splitter
//!
//! Partitions an A-matrix into contiguous, balanced row ranges. Each
//! partition `A.NNNN.txt` gets a manifest `dim.NNNN.txt` recording
//! `columns first_row last_row total_rows`. Partition boundaries depend only
//! on the row count and the target, so identical inputs always split
//! identically.

use fit_core::{ChunkManifest, Error, Result, MAX_PARTITIONS};
use row_store::{LocalStore, RowFile, RowWriter};
use tracing::{debug, info, instrument};

use crate::manifest::{partition_name, write_manifest};

/// Outcome of a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    /// Rows per partition (the last one may be shorter)
    pub lines_per_partition: u64,

    /// Column count sampled from the first row
    pub columns: usize,

    /// Manifests in partition order
    pub manifests: Vec<ChunkManifest>,
}

impl SplitReport {
    /// Partitions actually produced; this, not the requested target, is the
    /// number of solver processes to use.
    pub fn partition_count(&self) -> usize {
        self.manifests.len()
    }

    pub fn total_rows(&self) -> u64 {
        self.manifests.last().map(|m| m.total_rows).unwrap_or(0)
    }
}

/// Splits A-matrix files into an output directory
#[derive(Debug, Clone)]
pub struct MatrixSplitter {
    out: LocalStore,
}

impl MatrixSplitter {
    pub fn new(out: LocalStore) -> Self {
        Self { out }
    }

    pub fn output(&self) -> &LocalStore {
        &self.out
    }

    /// Split `a` into at most `target` partitions.
    ///
    /// The row count of `b` is the ground truth for the number of rows. The
    /// column count is sampled once, from the first row.
    #[instrument(skip(self, a, b), fields(a = %a.path().display()))]
    pub async fn split(&self, a: &RowFile, b: &RowFile, target: usize) -> Result<SplitReport> {
        if target == 0 || target > MAX_PARTITIONS {
            return Err(Error::InvalidConfig {
                message: format!(
                    "split target must be between 1 and {}, got {}",
                    MAX_PARTITIONS, target
                ),
            });
        }

        let total_rows = b.line_count().await?;
        if total_rows == 0 {
            return Err(Error::EmptyInput {
                path: b.path().to_path_buf(),
            });
        }
        let lines_per_partition = total_rows.div_ceil(target as u64);

        info!(
            target,
            total_rows, lines_per_partition, "Splitting A-matrix"
        );

        self.out.ensure().await?;

        let mut reader = a.reader().await?;
        let mut line = Vec::new();
        let mut manifests = Vec::new();
        let mut index = 0usize;
        let mut row = 0u64;
        let mut first_row = 0u64;
        let mut columns = 0usize;
        let mut writer = self.open_partition(index).await?;

        while reader.read_raw(&mut line).await? {
            if row == 0 {
                columns = String::from_utf8_lossy(&line).split_whitespace().count();
                debug!(columns, "Counted columns");
            }

            if row > 0 && row % lines_per_partition == 0 {
                if index + 1 >= target {
                    return Err(Error::Internal {
                        message: format!(
                            "split of {} would exceed {} partitions at row {}",
                            a.path().display(),
                            target,
                            row
                        ),
                    });
                }

                let manifest = ChunkManifest {
                    columns,
                    first_row,
                    last_row: row - 1,
                    total_rows,
                };
                self.close_partition(writer, index, &manifest).await?;
                manifests.push(manifest);

                index += 1;
                first_row = row;
                writer = self.open_partition(index).await?;
            }

            writer.write_raw(&line).await?;
            row += 1;
        }

        if row == 0 {
            writer.finish().await?;
            return Err(Error::EmptyInput {
                path: a.path().to_path_buf(),
            });
        }

        // The trailing partition is never closed by a boundary
        let manifest = ChunkManifest {
            columns,
            first_row,
            last_row: row - 1,
            total_rows,
        };
        self.close_partition(writer, index, &manifest).await?;
        manifests.push(manifest);

        if row != total_rows {
            return Err(Error::RowCountMismatch {
                path: a.path().to_path_buf(),
                expected: total_rows,
                actual: row,
            });
        }

        info!(partitions = manifests.len(), columns, "Split complete");
        Ok(SplitReport {
            lines_per_partition,
            columns,
            manifests,
        })
    }

    async fn open_partition(&self, index: usize) -> Result<RowWriter> {
        debug!(index, "Starting partition");
        self.out.row_file(&partition_name(index)).create().await
    }

    async fn close_partition(
        &self,
        writer: RowWriter,
        index: usize,
        manifest: &ChunkManifest,
    ) -> Result<()> {
        writer.finish().await?;
        write_manifest(&self.out, index, manifest).await
    }
}
