//! Core type definitions for the regression-data pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Error, Result};

/// Active-learning cycle index
pub type Cycle = u32;

/// Zero-based row index into an aligned file set
pub type RowIndex = u64;

/// Width of the zero-padded numeric suffix on partition files
pub const PARTITION_SUFFIX_WIDTH: usize = 4;

/// Largest partition count representable with the suffix width
pub const MAX_PARTITIONS: usize = 10_000;

/// Kind of physical observation a row encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowTag {
    Force,
    ForceGas,
    Energy,
    EnergyGas,
    Stress,
}

impl RowTag {
    /// Classify a labeled-b tag token.
    ///
    /// `+1` marks energy rows, `s_` marks stress rows and `G_` marks
    /// gas/cluster rows. Stress rows have no gas variant.
    pub fn classify(token: &str) -> Self {
        let gas = token.contains("G_");
        if token.contains("+1") {
            if gas {
                RowTag::EnergyGas
            } else {
                RowTag::Energy
            }
        } else if token.contains("s_") {
            RowTag::Stress
        } else if gas {
            RowTag::ForceGas
        } else {
            RowTag::Force
        }
    }
}

/// One parsed line of a labeled-b file
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledValue {
    pub tag: RowTag,
    pub value: f64,
}

impl LabeledValue {
    /// Parse `"<tag> <value>"`
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut tokens = line.split_whitespace();
        let tag = tokens.next().ok_or_else(|| "missing tag".to_string())?;
        let value = tokens
            .next()
            .ok_or_else(|| format!("missing value after tag {:?}", tag))?;
        let value = value
            .parse::<f64>()
            .map_err(|e| format!("bad value {:?}: {}", value, e))?;
        Ok(Self {
            tag: RowTag::classify(tag),
            value,
        })
    }
}

/// Descriptor of one contiguous partition of a split matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    /// Column count sampled from the first row of the matrix
    pub columns: usize,

    /// First row index (inclusive)
    pub first_row: RowIndex,

    /// Last row index (inclusive)
    pub last_row: RowIndex,

    /// Total rows across all partitions
    pub total_rows: u64,
}

impl ChunkManifest {
    /// Number of rows in this partition
    pub fn rows(&self) -> u64 {
        self.last_row.saturating_add(1).saturating_sub(self.first_row)
    }
}

impl fmt::Display for ChunkManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.columns, self.first_row, self.last_row, self.total_rows
        )
    }
}

impl FromStr for ChunkManifest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields = parse_fields(s, 4)?;
        let (first_row, last_row, total_rows) = (fields[1], fields[2], fields[3]);
        if last_row < first_row || last_row >= total_rows {
            return Err(Error::Serialization(format!(
                "manifest {:?} describes rows {}..={} of {}",
                s.trim(),
                first_row,
                last_row,
                total_rows
            )));
        }
        Ok(Self {
            columns: fields[0] as usize,
            first_row,
            last_row,
            total_rows,
        })
    }
}

/// Single-partition manifest (`dim.txt`) describing a whole combined matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimManifest {
    pub columns: usize,
    pub total_rows: u64,
}

impl fmt::Display for DimManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.columns, self.total_rows)
    }
}

impl FromStr for DimManifest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields = parse_fields(s, 2)?;
        Ok(Self {
            columns: fields[0] as usize,
            total_rows: fields[1],
        })
    }
}

fn parse_fields(s: &str, expected: usize) -> Result<Vec<u64>> {
    let fields = s
        .split_whitespace()
        .map(|t| t.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Serialization(format!("bad manifest {:?}: {}", s.trim(), e)))?;
    if fields.len() != expected {
        return Err(Error::Serialization(format!(
            "manifest {:?} has {} fields, expected {}",
            s.trim(),
            fields.len(),
            expected
        )));
    }
    Ok(fields)
}

/// The five row-aligned files a cycle produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    AMatrix,
    BVector,
    LabeledB,
    Natoms,
    Weights,
}

impl FileKind {
    /// All kinds, in the order they are combined
    pub const ALL: [FileKind; 5] = [
        FileKind::AMatrix,
        FileKind::BVector,
        FileKind::LabeledB,
        FileKind::Natoms,
        FileKind::Weights,
    ];

    /// File name for this cycle's new rows
    pub fn fresh_name(self) -> &'static str {
        match self {
            FileKind::AMatrix => "A.txt",
            FileKind::BVector => "b.txt",
            FileKind::LabeledB => "b-labeled.txt",
            FileKind::Natoms => "natoms.txt",
            FileKind::Weights => "weights.dat",
        }
    }

    /// File name for the cumulative rows of all cycles so far
    pub fn combined_name(self) -> &'static str {
        match self {
            FileKind::AMatrix => "A_comb.txt",
            FileKind::BVector => "b_comb.txt",
            FileKind::LabeledB => "b-labeled_comb.txt",
            FileKind::Natoms => "natoms_comb.txt",
            FileKind::Weights => "weights_comb.dat",
        }
    }
}

/// Whether a file set holds one cycle's new rows or the running union
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetRole {
    Fresh,
    Combined,
}

/// A directory holding one complete set of aligned files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    dir: PathBuf,
    role: SetRole,
}

impl FileSet {
    pub fn fresh(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            role: SetRole::Fresh,
        }
    }

    pub fn combined(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            role: SetRole::Combined,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn role(&self) -> SetRole {
        self.role
    }

    /// Path of one kind within this set
    pub fn path(&self, kind: FileKind) -> PathBuf {
        let name = match self.role {
            SetRole::Fresh => kind.fresh_name(),
            SetRole::Combined => kind.combined_name(),
        };
        self.dir.join(name)
    }

    /// Paths of every kind, in combine order
    pub fn paths(&self) -> Vec<(FileKind, PathBuf)> {
        FileKind::ALL.iter().map(|&k| (k, self.path(k))).collect()
    }
}
