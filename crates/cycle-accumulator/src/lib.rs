//! Cycle accumulation for active-learning runs
//!
//! Each cycle's fresh rows are appended to the previous cycle's combined
//! rows, kind by kind, so row `i` of every combined file still refers to the
//! same sample.

pub mod accumulator;
pub mod layout;

pub use accumulator::{verify_aligned, Accumulation, CycleAccumulator};
pub use layout::{CycleLayout, GEN_FF_DIR};
