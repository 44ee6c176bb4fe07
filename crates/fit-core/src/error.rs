//! Error types for the regression-data pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the pipeline Error
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of pipeline failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing configuration (weighting parameters, unknown methods)
    Config,

    /// Row-count or partition-count disagreement between aligned files
    Consistency,

    /// Empty or malformed restart chain
    State,

    /// Broken internal arithmetic; never user-correctable
    Internal,

    /// Underlying file-system failure
    Io,
}

/// Core error type for the regression-data pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unknown weighting method: {method:?}")]
    UnknownWeightMethod { method: String },

    #[error("Weighting method {method} expects {expected} parameter(s), got {actual}: {params:?}")]
    WeightParamCount {
        method: String,
        expected: usize,
        actual: usize,
        params: Vec<f64>,
    },

    #[error("Number of weighting methods ({methods}) does not match number of parameter sets ({param_sets})")]
    WeightSetMismatch { methods: usize, param_sets: usize },

    // Consistency errors
    #[error("Row count mismatch: {} has {actual} rows, expected {expected}", path.display())]
    RowCountMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Malformed row in {} at line {line}: {reason}", path.display())]
    MalformedRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("Nothing to process: {} is empty", path.display())]
    EmptyInput { path: PathBuf },

    #[error("Mismatched partition files in {}: {partitions} A.XXXX.txt vs {manifests} dim.XXXX.txt", dir.display())]
    PartitionManifestMismatch {
        dir: PathBuf,
        partitions: usize,
        manifests: usize,
    },

    #[error("Found {partitions} partition files in {} but only {slots} process slots", dir.display())]
    PartitionsExceedSlots {
        dir: PathBuf,
        partitions: usize,
        slots: usize,
    },

    // Restart chain errors
    #[error("No restart checkpoints found in {}", dir.display())]
    EmptyRestartChain { dir: PathBuf },

    #[error("Last restart checkpoint in {} is {last:?}, expected the live restart.txt", dir.display())]
    LiveCheckpointMissing { dir: PathBuf, last: String },

    #[error("Unrecognized restart checkpoint name in {}: {name:?}", dir.display())]
    MalformedCheckpointName { dir: PathBuf, name: String },

    #[error("No combined data for cycle {cycle} at {}", dir.display())]
    MissingPreviousCycle { cycle: u32, dir: PathBuf },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConfig { .. }
            | Error::UnknownWeightMethod { .. }
            | Error::WeightParamCount { .. }
            | Error::WeightSetMismatch { .. }
            | Error::Serialization(_) => ErrorKind::Config,

            Error::RowCountMismatch { .. }
            | Error::MalformedRow { .. }
            | Error::EmptyInput { .. }
            | Error::PartitionManifestMismatch { .. }
            | Error::PartitionsExceedSlots { .. } => ErrorKind::Consistency,

            Error::EmptyRestartChain { .. }
            | Error::LiveCheckpointMissing { .. }
            | Error::MalformedCheckpointName { .. }
            | Error::MissingPreviousCycle { .. } => ErrorKind::State,

            Error::Internal { .. } => ErrorKind::Internal,

            Error::Io(_) | Error::PathNotFound { .. } => ErrorKind::Io,
        }
    }

    /// Returns true if this error indicates corrupted inputs, configuration or ledger state
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Io)
    }

    /// Build a consistency error for a malformed line
    pub fn malformed(path: impl Into<PathBuf>, line: u64, reason: impl Into<String>) -> Self {
        Error::MalformedRow {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
