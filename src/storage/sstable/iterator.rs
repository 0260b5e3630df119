//! SSTable Iterator
//!
//! Sequential iteration over all entries in an SSTable. Each iterator owns
//! its file handle, so scans never contend with point lookups.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{RdbError, Result};

use super::{HEADER_SIZE, TOMBSTONE_MARKER};

/// Iterator over SSTable entries in sorted key order
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Stop reading when we reach this offset (start of index block)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
    /// Set after an error so iteration ends
    failed: bool,
}

impl SSTableIterator {
    /// Open `path` and position at the start of the data block
    pub(super) fn open(path: &Path, end_offset: u64) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
            failed: false,
        })
    }

    fn read_entry(&mut self) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let mut header = [0u8; 8];
        self.file.read_exact(&mut header)?;

        let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let value_bytes = if val_len == TOMBSTONE_MARKER { 0 } else { val_len as u64 };
        let entry_size = 8 + key_len + value_bytes;
        if self.current_offset + entry_size > self.end_offset {
            return Err(RdbError::Corruption(format!(
                "SSTable entry at offset {} overruns data block",
                self.current_offset
            )));
        }

        let mut key = vec![0u8; key_len as usize];
        self.file.read_exact(&mut key)?;

        let value = if val_len == TOMBSTONE_MARKER {
            None
        } else {
            let mut v = vec![0u8; val_len as usize];
            self.file.read_exact(&mut v)?;
            Some(v)
        };

        self.current_offset += entry_size;
        Ok((key, value))
    }
}

impl Iterator for SSTableIterator {
    /// (key, Option<value>) — None value means tombstone
    type Item = Result<(Vec<u8>, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.current_offset >= self.end_offset {
            return None;
        }

        let item = self.read_entry();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}
