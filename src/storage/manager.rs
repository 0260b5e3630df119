//! Storage Manager
//!
//! Manages multiple SSTables and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Merge all SSTables into one base table (compaction)

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{RdbError, Result};
use crate::memtable::{MemTable, MemTableEntry};

use super::{sync_dir, MergeIterator, SSTable, SSTableBuilder, SSTableReader, FLAG_BASE};

const TMP_SUFFIX: &str = "tmp";

/// An open SSTable together with its file id
struct Table {
    id: u64,
    reader: Arc<SSTableReader>,
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - All methods use `&self` (no exclusive access needed)
///
/// ## Crash safety:
/// Tables are written under a `.tmp` name, fsynced, then renamed into place.
/// A base table (full compaction output) makes every older table obsolete;
/// leftovers from an interrupted compaction are removed on open, but only
/// after the base table itself has passed validation.
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<Table>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,

    /// Never modify files on disk
    read_only: bool,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Remove unfinished `.tmp` tables
    /// 3. Discover existing SSTable files, newest first
    /// 4. Open readers newest first (validates and loads indexes into RAM)
    ///    until a base table is reached
    /// 5. Delete the tables that base table shadows
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_mode(path, false)
    }

    /// Open existing storage without touching the directory contents
    pub fn open_read_only(path: &Path) -> Result<Self> {
        Self::open_with_mode(path, true)
    }

    fn open_with_mode(path: &Path, read_only: bool) -> Result<Self> {
        if !read_only {
            fs::create_dir_all(path)?;
        }

        let mut sstable_ids: Vec<u64> = Vec::new();

        if path.is_dir() {
            for entry in fs::read_dir(path)? {
                let file_path = entry?.path();
                if !file_path.is_file() {
                    continue;
                }

                if Self::is_tmp_file(&file_path) {
                    if !read_only {
                        tracing::debug!(path = %file_path.display(), "Removing unfinished SSTable");
                        fs::remove_file(&file_path)?;
                    }
                } else if let Some(id) = Self::parse_sstable_id(&file_path) {
                    sstable_ids.push(id);
                }
            }
        }

        // Newest first (highest ID first)
        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables: Vec<Table> = Vec::new();
        let mut obsolete = Vec::new();
        for id in &sstable_ids {
            let sstable_path = Self::sstable_path_with_dir(path, *id);
            if sstables.iter().any(|t| t.reader.is_base()) {
                obsolete.push(sstable_path);
                continue;
            }
            let reader = SSTableReader::open(&sstable_path)?;
            sstables.push(Table {
                id: *id,
                reader: Arc::new(reader),
            });
        }

        if !read_only {
            for stale in &obsolete {
                tracing::info!(path = %stale.display(), "Removing SSTable superseded by compaction");
                fs::remove_file(stale)?;
            }
        }

        // Next ID = max + 1, or 1 if no SSTables exist
        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
            read_only,
        })
    }

    /// Get a value by key (searches all SSTables newest → oldest)
    ///
    /// Returns:
    /// - `Ok(Some(value))` — key found with value
    /// - `Ok(None)` — key not found, or found tombstone (deleted)
    ///
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let sstables = self.sstables.read();

        for table in sstables.iter() {
            // Skip SSTable if key is outside its range (O(1) check)
            if !table.reader.might_contain(key) {
                continue;
            }

            if let Some(entry) = table.reader.get(key)? {
                return Ok(entry.into_value());
            }
        }

        Ok(None)
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Creates a new SSTable file from the MemTable's sorted entries,
    /// opens a reader for it, and adds it to the front of the list.
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTable> {
        self.check_writable()?;
        if memtable.is_empty() {
            return Err(RdbError::Storage(
                "Cannot flush empty MemTable".to_string(),
            ));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let entries = memtable.iter().into_iter().map(Ok);
        let (metadata, reader) = self.write_table(id, 0, entries)?;

        self.sstables.write().insert(
            0,
            Table {
                id,
                reader: Arc::new(reader),
            },
        );

        tracing::debug!(id, entries = metadata.entry_count, "Flushed memtable to SSTable");
        Ok(metadata)
    }

    /// Merged view of every SSTable, newest version of each key wins
    ///
    /// Tombstones are kept so a caller can overlay this view on top of even
    /// older state or under a newer memtable. The tables are pinned for the
    /// lifetime of the iterator.
    pub fn scan(&self) -> Result<MergeIterator> {
        MergeIterator::new(Vec::new(), self.tables())
    }

    /// The current tables, newest first
    ///
    /// Holding the returned readers keeps their files on disk even if a
    /// compaction replaces them in the meantime.
    pub fn tables(&self) -> Vec<Arc<SSTableReader>> {
        self.sstables
            .read()
            .iter()
            .map(|t| Arc::clone(&t.reader))
            .collect()
    }

    /// Merge all SSTables into a single base table
    ///
    /// The inputs are streamed through a merge, so memory use does not grow
    /// with the table sizes, and lookups keep running meanwhile. Tombstones are
    /// dropped: a base table replaces every older table, so there is nothing
    /// left for them to shadow. Returns `None` when there is nothing to merge.
    ///
    /// Callers serialize flushes and compactions.
    pub fn compact(&self) -> Result<Option<SSTable>> {
        self.check_writable()?;

        let (inputs, tables): (Vec<u64>, Vec<Arc<SSTableReader>>) = self
            .sstables
            .read()
            .iter()
            .map(|t| (t.id, Arc::clone(&t.reader)))
            .unzip();
        if inputs.len() < 2 {
            return Ok(None);
        }

        let live = MergeIterator::new(Vec::new(), tables)?.filter(|item| {
            !matches!(item, Ok((_, MemTableEntry::Tombstone)))
        });

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let (metadata, reader) = self.write_table(id, FLAG_BASE, live)?;

        let replaced: Vec<Table> = {
            let mut sstables = self.sstables.write();
            let (replaced, kept): (Vec<Table>, Vec<Table>) = std::mem::take(&mut *sstables)
                .into_iter()
                .partition(|t| inputs.contains(&t.id));
            *sstables = kept;
            sstables.push(Table {
                id,
                reader: Arc::new(reader),
            });
            replaced
        };

        // Files go once no running scan holds them; leftovers are swept on open
        for table in &replaced {
            table.reader.mark_obsolete();
        }
        drop(replaced);

        tracing::info!(id, inputs = inputs.len(), entries = metadata.entry_count, "Compacted SSTables");
        Ok(Some(metadata))
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// IDs of the live SSTables, newest first
    pub fn sstable_ids(&self) -> Vec<u64> {
        self.sstables.read().iter().map(|t| t.id).collect()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(RdbError::ReadOnly);
        }
        Ok(())
    }

    /// Write sorted entries to `sstable_{id}.sst` via a temporary file
    fn write_table(
        &self,
        id: u64,
        flags: u16,
        entries: impl IntoIterator<Item = Result<(Vec<u8>, MemTableEntry)>>,
    ) -> Result<(SSTable, SSTableReader)> {
        let path = self.sstable_path(id);
        let tmp_path = path.with_extension(format!("sst.{}", TMP_SUFFIX));

        let built = (|| -> Result<SSTable> {
            let mut builder = SSTableBuilder::with_flags(&tmp_path, flags)?;
            for item in entries {
                let (key, entry) = item?;
                match entry {
                    MemTableEntry::Value(v) => builder.add(&key, &v)?,
                    MemTableEntry::Tombstone => builder.add_tombstone(&key)?,
                }
            }
            builder.finish()
        })();

        let mut metadata = match built {
            Ok(metadata) => metadata,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        fs::rename(&tmp_path, &path)?;
        sync_dir(&self.data_dir)?;
        metadata.path = path.clone();

        let reader = SSTableReader::open(&path)?;
        Ok((metadata, reader))
    }

    /// Generate the file path for an SSTable with given ID
    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    /// Generate SSTable path given a directory and ID
    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// Parse SSTable ID from filename
    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }

    fn is_tmp_file(path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == TMP_SUFFIX)
            && path
                .file_name()
                .map_or(false, |name| name.to_string_lossy().starts_with("sstable_"))
    }
}
