//! Cycle directory layout
//!
//! Cycle `k` keeps its regression inputs in `<root>/ALC-<k>/GEN_FF/`, with
//! the fresh and combined sets side by side.

use std::path::{Path, PathBuf};

use fit_core::{Cycle, FileSet};
use row_store::LocalStore;

/// Working directory of the regression step within a cycle
pub const GEN_FF_DIR: &str = "GEN_FF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleLayout {
    root: PathBuf,
}

impl CycleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/ALC-<k>`
    pub fn cycle_dir(&self, cycle: Cycle) -> PathBuf {
        self.root.join(format!("ALC-{}", cycle))
    }

    /// `<root>/ALC-<k>/GEN_FF`
    pub fn gen_ff_dir(&self, cycle: Cycle) -> PathBuf {
        self.cycle_dir(cycle).join(GEN_FF_DIR)
    }

    pub fn store(&self, cycle: Cycle) -> LocalStore {
        LocalStore::new(self.gen_ff_dir(cycle))
    }

    pub fn fresh(&self, cycle: Cycle) -> FileSet {
        FileSet::fresh(self.gen_ff_dir(cycle))
    }

    pub fn combined(&self, cycle: Cycle) -> FileSet {
        FileSet::combined(self.gen_ff_dir(cycle))
    }
}
