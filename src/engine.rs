//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Handle concurrent read/write access
//! - Trigger flushes when MemTable is full and compactions when tables pile up
//! - Manage crash recovery on startup
//! - Provide ordered, snapshot-at-start enumeration

use std::fs;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{RdbError, Result};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::{self, MergeIterator, StorageManager};
use crate::wal::{Operation, WalEntry, WalRecovery, WalWriter};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/flush/compact): Serialized by `write_lock`
///   - Only ONE write operation at a time
///   - Must acquire: write_lock → WAL → memtable → storage (write)
///
/// - **Reads** (get): no write_lock needed
///   - MemTable uses internal RwLock (many concurrent readers)
///   - StorageManager takes its read lock; each table serializes its own seeks
///
/// - **Scans** (iter/for_each): take `write_lock` only while the memtable is
///   copied and the current tables are pinned, so a concurrent flush cannot
///   move entries between the two mid-scan. The tables are then read lazily
///   with no engine lock held.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Directory for all data files (SSTables)
    storage_dir: PathBuf,

    /// Write-ahead log for durability; `None` when read-only
    wal: Option<Mutex<WalWriter>>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes write operations (put/delete/flush/compact)
    write_lock: Mutex<()>,

    /// Set once by `close`
    closed: AtomicBool,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    pub const WAL_FILENAME: &'static str = "wal.log";
    pub const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, open/create data directory
    /// 2. Load existing SSTables
    /// 3. Recover from WAL if it exists, flush recovered data to an SSTable
    ///    (a damaged entry followed by intact ones fails with corruption)
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        if config.data_dir.exists() && !config.data_dir.is_dir() {
            return Err(RdbError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", config.data_dir.display()),
            )));
        }

        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        if config.read_only {
            return Self::open_read_only(config, storage_dir, &wal_path);
        }

        let fresh = !wal_path.exists() || !storage_dir.is_dir();
        fs::create_dir_all(&config.data_dir)?;
        fs::create_dir_all(&storage_dir)?;

        let storage = StorageManager::open(&storage_dir)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    recovered = recovery.entries_recovered,
                    corrupted = recovery.entries_corrupted,
                    last_lsn = recovery.last_lsn,
                    truncated = recovery.was_truncated,
                    "WAL recovery"
                );
            }

            replay(&memtable, entries);
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;

        // New directory entries (wal.log, sstables/, the data dir itself)
        if fresh {
            storage::sync_dir(&config.data_dir)?;
            if let Some(parent) = config.data_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
                storage::sync_dir(parent)?;
            }
        }

        // Make recovered data durable in an SSTable, then the WAL can go
        if !memtable.is_empty() {
            tracing::info!(entries = memtable.entry_count(), "Flushing recovered entries to SSTable");
            storage.flush(&memtable)?;
            memtable.clear();
            wal.truncate()?;
        }

        tracing::debug!(
            data_dir = %config.data_dir.display(),
            sstables = storage.sstable_count(),
            "Engine opened"
        );

        Ok(Self {
            config,
            storage_dir,
            wal: Some(Mutex::new(wal)),
            memtable,
            storage,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::for_path(path))
    }

    /// Read-only open: nothing on disk is created, repaired, or removed
    fn open_read_only(config: Config, storage_dir: PathBuf, wal_path: &Path) -> Result<Self> {
        if !config.data_dir.is_dir() {
            return Err(RdbError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", config.data_dir.display()),
            )));
        }

        let storage = StorageManager::open_read_only(&storage_dir)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::read(wal_path)?;
            if recovery.was_truncated {
                tracing::warn!(
                    recovered = recovery.entries_recovered,
                    "Ignoring damaged WAL tail in read-only open"
                );
            }
            replay(&memtable, entries);
        }

        Ok(Self {
            config,
            storage_dir,
            wal: None,
            memtable,
            storage,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;

        if let Some(entry) = self.memtable.get(key) {
            return Ok(entry.into_value());
        }

        self.storage.get(key)
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Write to WAL (durability)
    /// 3. Write to MemTable
    /// 4. Check if flush needed
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Delete a key
    ///
    /// Deleting an absent key still logs a tombstone and succeeds.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(Operation::Delete { key: key.to_vec() })
    }

    /// Snapshot of all live entries in ascending key order
    ///
    /// Writes made after this call are not visible through the snapshot.
    /// Entries are read from the tables as the snapshot is advanced.
    pub fn iter(&self) -> Result<Snapshot> {
        self.check_open()?;

        let (memtable, tables) = {
            let _write_guard = self.write_lock.lock();
            (self.memtable.iter(), self.storage.tables())
        };

        Ok(Snapshot {
            merged: MergeIterator::new(memtable, tables)?,
        })
    }

    /// Visit every live entry in ascending key order until `visit` breaks
    ///
    /// Runs on a snapshot taken at the start of the call; `visit` may use
    /// this engine freely. A visitor that never returns stalls the caller.
    pub fn for_each<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    {
        for item in self.iter()? {
            let (key, value) = item?;
            if visit(&key, &value).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        self.check_open()?;
        self.check_writable()?;
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Flush, then merge every SSTable into one
    pub fn compact(&self) -> Result<()> {
        self.check_open()?;
        self.check_writable()?;
        let _write_guard = self.write_lock.lock();
        self.flush_internal()?;
        self.storage.compact()?;
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk. Every later call on this
    /// engine, including a second `close`, fails with `InvalidHandle`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(closed_error());
        }

        let _write_guard = self.write_lock.lock();
        if let Some(wal) = &self.wal {
            self.flush_internal()?;
            wal.lock().sync()?;
        }

        tracing::debug!(data_dir = %self.config.data_dir.display(), "Engine closed");
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Shared write path for put/delete
    ///
    /// The memtable is only touched after the WAL append succeeded, so a
    /// failed write leaves no trace.
    fn write(&self, operation: Operation) -> Result<()> {
        self.check_open()?;
        let wal = self.wal.as_ref().ok_or(RdbError::ReadOnly)?;

        let _write_guard = self.write_lock.lock();

        // Re-check under the lock: close may have won the race
        self.check_open()?;

        wal.lock().append(operation.clone())?;

        apply(&self.memtable, operation);

        if self.memtable.should_flush(self.config.memtable_size_limit) {
            // The write is already durable in the WAL; a failed flush is
            // retried on the next write or on close
            if let Err(e) = self.flush_internal() {
                tracing::warn!(error = %e, "Automatic memtable flush failed");
            }
        }

        Ok(())
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.storage.flush(&self.memtable)?;
        self.memtable.clear();

        // Entries are now durable in the SSTable
        if let Some(wal) = &self.wal {
            wal.lock().truncate()?;
        }

        if self.storage.sstable_count() >= self.config.compaction_threshold {
            if let Err(e) = self.storage.compact() {
                tracing::warn!(error = %e, "Compaction failed; tables left as they were");
            }
        }

        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error());
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.wal.is_none() {
            return Err(RdbError::ReadOnly);
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_read_only(&self) -> bool {
        self.wal.is_none()
    }
}

/// Apply recovered WAL operations in LSN order
fn replay(memtable: &MemTable, entries: Vec<WalEntry>) {
    for entry in entries {
        apply(memtable, entry.operation);
    }
}

fn apply(memtable: &MemTable, operation: Operation) {
    match operation {
        Operation::Put { key, value } => {
            memtable.put(key, value);
        }
        Operation::Delete { key } => {
            memtable.delete(key);
        }
    }
}

fn closed_error() -> RdbError {
    RdbError::InvalidHandle("database is closed".to_string())
}

/// Point-in-time view of the live entries, in ascending key order
///
/// Single pass. Table reads happen as the snapshot advances, so an item can
/// be an I/O or corruption error; iteration ends after the first one.
pub struct Snapshot {
    merged: MergeIterator,
}

impl Iterator for Snapshot {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.merged.next()? {
                Ok((key, MemTableEntry::Value(value))) => return Some(Ok((key, value))),
                Ok((_, MemTableEntry::Tombstone)) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
