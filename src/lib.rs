//! # rdb
//!
//! Embedded, persistent byte-string key-value store for a single process.
//!
//! A database is a directory holding a write-ahead log and a set of sorted
//! tables. Callers address open databases through [`Handle`]s issued by a
//! [`Registry`]; foreign hosts use the same registry through the C ABI in
//! [`ffi`].
//!
//! ## Write and read paths
//!
//! ```text
//! set/remove ──► WAL append (+fsync) ──► MemTable ──(size limit)──► SSTable
//!                                                                     │
//!                                         compaction (table threshold)◄┘
//!
//! get ──► MemTable ──miss──► SSTables newest → oldest
//! for_each ──► snapshot of SSTables ⊕ MemTable, ascending key order
//! ```
//!
//! Tombstones shadow older values at every layer. Opening a directory
//! replays whatever the WAL holds beyond the last flush.
//!
//! ## Example
//!
//! ```no_run
//! use rdb::Registry;
//!
//! let registry = Registry::new();
//! let db = registry.open("/tmp/rdb_example")?;
//! registry.set(db, b"a", b"1")?;
//! assert_eq!(registry.get(db, b"a")?, Some(b"1".to_vec()));
//! registry.close(db)?;
//! # Ok::<(), rdb::RdbError>(())
//! ```

pub mod config;
pub mod error;
pub mod logging;

pub mod engine;
pub mod ffi;
pub mod memtable;
pub mod registry;
pub mod storage;
pub mod wal;

pub use config::{Config, WalSyncStrategy};
pub use engine::{Engine, Snapshot};
pub use error::{ErrorKind, RdbError, Result};
pub use registry::{Handle, Registry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
