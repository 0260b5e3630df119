//! Storage Module
//!
//! Persistent storage layer using SSTables.
//!
//! ## Responsibilities
//! - Persist data to disk in sorted format
//! - Efficient point lookups and lazy, merged ordered scans
//! - Compaction of accumulated tables into one base table
//!
//! ## Layout
//! ```text
//! {data_dir}/sstables/
//!   ├── sstable_000001.sst
//!   ├── sstable_000002.sst      (newer tables shadow older ones)
//!   └── sstable_000003.sst.tmp  (being written; discarded on open)
//! ```
//!
//! See [`sstable`] for the file format.

pub mod sstable;
mod manager;
mod merge;

use std::path::Path;

use crate::error::Result;

pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader, FLAG_BASE};
pub use manager::StorageManager;
pub use merge::MergeIterator;

/// Make entries created or renamed in `dir` durable
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    std::fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
