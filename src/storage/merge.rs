//! Merged scans
//!
//! A k-way merge over the memtable snapshot and every SSTable, newest source
//! first. Each key is yielded once with its newest version; tombstones are
//! passed through so callers decide whether they shadow anything.
//!
//! Tables are held through `Arc`, so a compaction that replaces them while a
//! scan is running only removes their files once the scan is dropped.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::error::{RdbError, Result};
use crate::memtable::MemTableEntry;

use super::{SSTableIterator, SSTableReader};

type Entry = (Vec<u8>, MemTableEntry);
type Source = Box<dyn Iterator<Item = Result<Entry>> + Send>;

/// Head of one source waiting in the heap
struct Head {
    key: Vec<u8>,
    /// Lower is newer
    source: usize,
    entry: MemTableEntry,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Entries of one pinned table
struct TableSource {
    // Declared first so the file handle closes before the table can be unlinked
    entries: SSTableIterator,
    _table: Arc<SSTableReader>,
}

impl Iterator for TableSource {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|item| {
            item.map(|(key, value)| {
                let entry = match value {
                    Some(v) => MemTableEntry::Value(v),
                    None => MemTableEntry::Tombstone,
                };
                (key, entry)
            })
        })
    }
}

/// Ascending, deduplicated view over several sorted sources
pub struct MergeIterator {
    sources: Vec<Source>,
    heap: BinaryHeap<Reverse<Head>>,
    failed: bool,
}

impl MergeIterator {
    /// Merge `memtable` (newest) over `tables`, which are ordered newest first
    pub fn new(memtable: Vec<Entry>, tables: Vec<Arc<SSTableReader>>) -> Result<Self> {
        let mut sources: Vec<Source> = Vec::with_capacity(tables.len() + 1);
        sources.push(Box::new(memtable.into_iter().map(Ok::<Entry, RdbError>)));
        for table in tables {
            sources.push(Box::new(TableSource {
                entries: table.iter()?,
                _table: table,
            }));
        }

        let mut merge = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            failed: false,
        };
        for source in 0..merge.sources.len() {
            merge.pull(source)?;
        }
        Ok(merge)
    }

    /// Move the next entry of `source` into the heap
    fn pull(&mut self, source: usize) -> Result<()> {
        if let Some(item) = self.sources[source].next() {
            let (key, entry) = item?;
            self.heap.push(Reverse(Head { key, source, entry }));
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<Entry>> {
        let Some(Reverse(newest)) = self.heap.pop() else {
            return Ok(None);
        };
        self.pull(newest.source)?;

        // Older versions of the same key
        while matches!(self.heap.peek(), Some(Reverse(head)) if head.key == newest.key) {
            if let Some(Reverse(shadowed)) = self.heap.pop() {
                self.pull(shadowed.source)?;
            }
        }

        Ok(Some((newest.key, newest.entry)))
    }
}

impl Iterator for MergeIterator {
    /// Newest version of each key, tombstones included
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
