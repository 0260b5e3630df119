//! MemTable
//!
//! Sorted in-memory buffer of writes not yet in an SSTable. Deletes are kept
//! as tombstones so they still shadow older tables after a flush.

mod table;

pub use table::MemTable;

/// What the memtable (or a table record) holds for a key
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    Value(Vec<u8>),
    Tombstone,
}

impl MemTableEntry {
    /// Value bytes, or `None` for a tombstone
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            MemTableEntry::Value(v) => Some(v),
            MemTableEntry::Tombstone => None,
        }
    }
}
