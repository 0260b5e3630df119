//! SSTables
//!
//! Immutable sorted tables written by flushes and compactions. A table is
//! self-describing: readers reject anything whose magic, version, flags,
//! structure or checksums do not line up.
//!
//! ```text
//! header  16 B  "RDBT" | version u16 | flags u16 | count u64
//! data          { key_len u32 | val_len u32 | key | value }*
//!               val_len == u32::MAX marks a tombstone (no value bytes)
//! index         { key_len u32 | data offset u64 | key }*
//! footer  16 B  index offset u64 | crc32(data) u32 | crc32(header ++ index) u32
//! ```
//!
//! All integers are little-endian. The second footer checksum is taken over
//! the final header (count patched in) followed by the index block, so a
//! damaged flag, count or index key fails the open instead of silently
//! changing what the table means.

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

pub(crate) const MAGIC: &[u8; 4] = b"RDBT";
pub(crate) const VERSION: u16 = 1;
pub(crate) const HEADER_SIZE: u64 = 16;
pub(crate) const COUNT_OFFSET: u64 = 8;
pub(crate) const FOOTER_SIZE: u64 = 16;

/// `val_len` of a tombstone record
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// The table holds the complete live state as of its creation (full
/// compaction output); every older table is obsolete.
pub const FLAG_BASE: u16 = 0x0001;

/// Every flag bit this version understands
pub(crate) const KNOWN_FLAGS: u16 = FLAG_BASE;

/// Summary of a freshly written table
#[derive(Debug, Clone)]
pub struct SSTable {
    pub path: PathBuf,
    /// Records, tombstones included
    pub entry_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
    pub flags: u16,
}

impl SSTable {
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Whether this is a full-compaction base table
    pub fn is_base(&self) -> bool {
        self.flags & FLAG_BASE != 0
    }
}

/// Header bytes for a table with `flags` and `count` records
pub(crate) fn encode_header(flags: u16, count: u64) -> [u8; HEADER_SIZE as usize] {
    let mut header = [0u8; HEADER_SIZE as usize];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_le_bytes());
    header[6..8].copy_from_slice(&flags.to_le_bytes());
    header[8..16].copy_from_slice(&count.to_le_bytes());
    header
}
