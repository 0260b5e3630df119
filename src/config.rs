//! Configuration for rdb
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

use crate::error::{RdbError, Result};

/// Main configuration for an rdb database
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (WAL, SSTables, etc.)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (SSTable files)
    pub data_dir: PathBuf,

    /// Open without write access: set/remove fail with `ReadOnly` and the
    /// on-disk state is never modified (no WAL replay flush, no compaction)
    pub read_only: bool,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Number of SSTables that triggers a full merge into one
    pub compaction_threshold: usize,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    ///
    /// A write acknowledged before the Nth entry may be lost on power failure.
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./rdb_data"),
            read_only: false,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            compaction_threshold: 8,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Default config rooted at `path`
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            data_dir: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Reject settings the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(RdbError::Config("data_dir must not be empty".to_string()));
        }
        if self.memtable_size_limit == 0 {
            return Err(RdbError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        if self.compaction_threshold < 2 {
            return Err(RdbError::Config(format!(
                "compaction_threshold must be at least 2, got {}",
                self.compaction_threshold
            )));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(RdbError::Config(
                "EveryNEntries count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Open the database read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the SSTable count that triggers compaction
    pub fn compaction_threshold(mut self, count: usize) -> Self {
        self.config.compaction_threshold = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
