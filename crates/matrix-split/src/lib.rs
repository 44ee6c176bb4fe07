//! Matrix splitting for distributed solves
//!
//! Partitions a combined A-matrix into balanced row ranges, one per solver
//! process, each with a `dim.NNNN.txt` manifest. Also owns the
//! single-partition `dim.txt` manifest and the partition census used when a
//! split solve is resumed.

pub mod manifest;
pub mod splitter;

pub use manifest::{
    clear_partitions, manifest_name, measure, partition_name, read_manifest, write_dim,
    write_manifest, PartitionCensus, DIM_FILE, SPLIT_INPUT,
};
pub use splitter::{MatrixSplitter, SplitReport};
