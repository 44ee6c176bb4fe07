//! Row Store - Streaming access to large line-oriented regression files
//!
//! Provides:
//! - [`RowFile`]: forward-only readers, append-only writers, exact line counts
//! - [`concat`]: ordered byte concatenation of aligned files
//! - [`LocalStore`]: an explicit working directory with atomic writes
//!
//! # Example
//!
//! ```no_run
//! use row_store::{LocalStore, RowFile};
//!
//! # async fn example() -> fit_core::Result<()> {
//! let store = LocalStore::new("/scratch/ALC-0/GEN_FF");
//! let rows = store.row_file("b.txt").line_count().await?;
//!
//! let mut reader = store.row_file("A.txt").reader().await?;
//! while let Some(line) = reader.next_line().await? {
//!     let _columns = line.split_whitespace().count();
//! }
//! # Ok(())
//! # }
//! ```

mod local;
mod row_file;

pub use local::LocalStore;
pub use row_file::{concat, RowFile, RowReader, RowWriter};
