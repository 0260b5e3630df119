//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::MemTableEntry;

/// In-memory table for recent writes
///
/// Size is the sum of key and value lengths of live entries; a tombstone
/// counts only its key.
pub struct MemTable {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    data: BTreeMap<Vec<u8>, MemTableEntry>,
    size: usize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Get an entry by key (read lock)
    ///
    /// `Some(Tombstone)` means the key was deleted here and older layers must
    /// not be consulted.
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.inner.read().data.get(key).cloned()
    }

    /// Put a key-value pair, returning the new approximate size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Value(value))
    }

    /// Delete a key by inserting a tombstone, returning the new approximate size
    pub fn delete(&self, key: Vec<u8>) -> usize {
        self.insert(key, MemTableEntry::Tombstone)
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().data.is_empty()
    }

    /// Check if size has reached the limit
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Snapshot of all entries in sorted key order
    pub fn iter(&self) -> Vec<(Vec<u8>, MemTableEntry)> {
        self.inner
            .read()
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.data.clear();
        inner.size = 0;
    }

    fn insert(&self, key: Vec<u8>, entry: MemTableEntry) -> usize {
        let key_len = key.len();
        let added = key_len + entry_len(&entry);
        let mut inner = self.inner.write();

        let removed = match inner.data.insert(key, entry) {
            Some(old) => key_len + entry_len(&old),
            None => 0,
        };
        inner.size = inner.size + added - removed;
        inner.size
    }
}

fn entry_len(entry: &MemTableEntry) -> usize {
    match entry {
        MemTableEntry::Value(v) => v.len(),
        MemTableEntry::Tombstone => 0,
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
