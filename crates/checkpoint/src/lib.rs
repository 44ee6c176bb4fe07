//! Restart checkpoints for distributed solves
//!
//! Provides the ordered restart chain, run snapshots and reconstruction of
//! the solver invocation when an interrupted solve is resumed.

pub mod invocation;
pub mod ledger;

pub use invocation::SolverInvocation;
pub use ledger::{
    AttemptRecord, RestartChain, RestartLedger, ResumePlan, ATTEMPT_FILE, LIVE_CHECKPOINT,
};
