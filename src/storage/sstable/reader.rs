//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.
//!
//! A reader is shared behind an `Arc` by the storage manager and by running
//! scans. Once compaction has replaced a table, the reader is marked
//! obsolete and its file is removed when the last reference goes away.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{RdbError, Result};
use crate::memtable::MemTableEntry;

use super::iterator::SSTableIterator;
use super::{FLAG_BASE, FOOTER_SIZE, HEADER_SIZE, KNOWN_FLAGS, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
pub struct SSTableReader {
    path: PathBuf,
    /// Handle for point lookups; scans open their own
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    flags: u16,
    /// Index block starting offset (end of data block)
    index_offset: u64,
    /// Delete the file on drop
    obsolete: AtomicBool,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header, footer, both checksums and the index layout, then
    /// loads the entire index into memory. Any inconsistency is reported as
    /// `Corruption`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let corrupt = |what: String| {
            RdbError::Corruption(format!("SSTable {}: {}", path.display(), what))
        };

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(format!("file too small ({} bytes)", file_size)));
        }

        // Header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(corrupt(format!(
                "invalid magic: expected RDBT, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(corrupt(format!("unsupported version {}", version)));
        }

        // Footer
        file.seek(SeekFrom::Start(file_size - FOOTER_SIZE))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = u64::from_le_bytes(le_array(&footer[0..8]));
        let data_crc = u32::from_le_bytes(le_array(&footer[8..12]));
        let meta_crc = u32::from_le_bytes(le_array(&footer[12..16]));

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(corrupt(format!("index offset {} out of bounds", index_offset)));
        }

        // Index block, checked together with the header before either is trusted
        file.seek(SeekFrom::Start(index_offset))?;
        let mut index_data = vec![0u8; (file_size - FOOTER_SIZE - index_offset) as usize];
        file.read_exact(&mut index_data)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header);
        hasher.update(&index_data);
        if hasher.finalize() != meta_crc {
            return Err(corrupt("header/index checksum mismatch".to_string()));
        }

        let flags = u16::from_le_bytes([header[6], header[7]]);
        if flags & !KNOWN_FLAGS != 0 {
            return Err(corrupt(format!("unknown flags {:#06x}", flags)));
        }
        let entry_count = u64::from_le_bytes(le_array(&header[8..16]));

        // Data block checksum
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = index_offset - HEADER_SIZE;
        let mut chunk = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            file.read_exact(&mut chunk[..n])?;
            hasher.update(&chunk[..n]);
            remaining -= n as u64;
        }
        if hasher.finalize() != data_crc {
            return Err(corrupt("data block checksum mismatch".to_string()));
        }

        // Index entries: [key_len(4)][offset(8)][key], strictly ascending
        let mut index = BTreeMap::new();
        let mut previous: Option<&[u8]> = None;
        let mut pos = 0;
        while pos < index_data.len() {
            if pos + 12 > index_data.len() {
                return Err(corrupt("truncated index entry".to_string()));
            }
            let key_len = u32::from_le_bytes(le_array(&index_data[pos..pos + 4])) as usize;
            let offset = u64::from_le_bytes(le_array(&index_data[pos + 4..pos + 12]));
            pos += 12;

            if pos + key_len > index_data.len() {
                return Err(corrupt("truncated index key".to_string()));
            }
            if offset < HEADER_SIZE || offset >= index_offset {
                return Err(corrupt(format!("entry offset {} out of bounds", offset)));
            }
            let key = &index_data[pos..pos + key_len];
            if previous.map_or(false, |prev| key <= prev) {
                return Err(corrupt("index keys out of order".to_string()));
            }
            index.insert(key.to_vec(), offset);
            previous = Some(key);
            pos += key_len;
        }

        if index.len() as u64 != entry_count {
            return Err(corrupt(format!(
                "header counts {} entries, index holds {}",
                entry_count,
                index.len()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            flags,
            index_offset,
            obsolete: AtomicBool::new(false),
        })
    }

    /// Look up a key — O(log n) via the in-memory index
    ///
    /// Returns:
    /// - `Ok(Some(Value(v)))` — key found with value
    /// - `Ok(Some(Tombstone))` — key deleted in this table
    /// - `Ok(None)` — key not in this table
    pub fn get(&self, key: &[u8]) -> Result<Option<MemTableEntry>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;

        let key_len = u32::from_le_bytes(le_array(&header[0..4])) as u64;
        let val_len = u32::from_le_bytes(le_array(&header[4..8]));

        if val_len == TOMBSTONE_MARKER {
            return Ok(Some(MemTableEntry::Tombstone));
        }

        if offset + 8 + key_len + val_len as u64 > self.index_offset {
            return Err(RdbError::Corruption(format!(
                "SSTable {}: entry at offset {} overruns data block",
                self.path.display(),
                offset
            )));
        }

        // Skip the key (the index already matched it)
        file.seek(SeekFrom::Current(key_len as i64))?;

        let mut value = vec![0u8; val_len as usize];
        file.read_exact(&mut value)?;

        Ok(Some(MemTableEntry::Value(value)))
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Header flags
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Whether this table is a full-compaction base
    pub fn is_base(&self) -> bool {
        self.flags & FLAG_BASE != 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty SSTable
        }
    }

    /// Iterate over all entries in key order through a separate file handle
    pub fn iter(&self) -> Result<SSTableIterator> {
        SSTableIterator::open(&self.path, self.index_offset)
    }

    /// Remove the file once the last reference to this reader is dropped
    pub(crate) fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }
}

impl Drop for SSTableReader {
    fn drop(&mut self) {
        if !self.obsolete.load(Ordering::Acquire) {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed obsolete SSTable"),
            // Already swept by a later open
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove obsolete SSTable")
            }
        }
    }
}

/// Copy a fixed-width little-endian field out of a slice of the right length
fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
