//! SSTable Builder
//!
//! Streams strictly ascending entries into a new table file. The entry count
//! in the header is only known at the end and is patched in by `finish`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{RdbError, Result};

use super::{
    encode_header, SSTable, COUNT_OFFSET, FOOTER_SIZE, HEADER_SIZE, KNOWN_FLAGS,
    TOMBSTONE_MARKER,
};

/// Writes one SSTable
pub struct SSTableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    flags: u16,
    entry_count: u64,
    /// Offset the next data record starts at
    offset: u64,
    /// (key, record offset) for the index block
    index: Vec<(Vec<u8>, u64)>,
    first_key: Option<Vec<u8>>,
    last_key: Option<Vec<u8>>,
    /// CRC over the data block only
    crc: crc32fast::Hasher,
    /// Reused encode buffer for one record
    scratch: Vec<u8>,
}

impl SSTableBuilder {
    /// Start a plain table at `path`, replacing any existing file
    pub fn new(path: &Path) -> Result<Self> {
        Self::with_flags(path, 0)
    }

    /// Start a table whose header carries `flags`
    pub fn with_flags(path: &Path, flags: u16) -> Result<Self> {
        if flags & !KNOWN_FLAGS != 0 {
            return Err(RdbError::Storage(format!("unknown SSTable flags {:#06x}", flags)));
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        // count stays zero until finish()
        writer.write_all(&encode_header(flags, 0))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            flags,
            entry_count: 0,
            offset: HEADER_SIZE,
            index: Vec::new(),
            first_key: None,
            last_key: None,
            crc: crc32fast::Hasher::new(),
            scratch: Vec::new(),
        })
    }

    /// Append a live entry
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(key, Some(value))
    }

    /// Append a deletion marker
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.append(key, None)
    }

    fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if matches!(&self.last_key, Some(last) if key <= last.as_slice()) {
            return Err(RdbError::Storage(
                "SSTable keys must be added in strictly ascending order".to_string(),
            ));
        }

        let key_len = u32::try_from(key.len())
            .map_err(|_| RdbError::Storage(format!("key too large: {} bytes", key.len())))?;
        let val_len = match value {
            None => TOMBSTONE_MARKER,
            Some(v) => u32::try_from(v.len())
                .ok()
                .filter(|len| *len != TOMBSTONE_MARKER)
                .ok_or_else(|| {
                    RdbError::Storage(format!("value too large: {} bytes", v.len()))
                })?,
        };

        self.scratch.clear();
        self.scratch.extend_from_slice(&key_len.to_le_bytes());
        self.scratch.extend_from_slice(&val_len.to_le_bytes());
        self.scratch.extend_from_slice(key);
        if let Some(v) = value {
            self.scratch.extend_from_slice(v);
        }

        self.writer.write_all(&self.scratch)?;
        self.crc.update(&self.scratch);

        self.index.push((key.to_vec(), self.offset));
        self.offset += self.scratch.len() as u64;
        self.entry_count += 1;

        if self.first_key.is_none() {
            self.first_key = Some(key.to_vec());
        }
        self.last_key = Some(key.to_vec());

        Ok(())
    }

    /// Write index and footer, patch the header count and fsync
    pub fn finish(mut self) -> Result<SSTable> {
        let index_offset = self.offset;

        let mut meta_crc = crc32fast::Hasher::new();
        meta_crc.update(&encode_header(self.flags, self.entry_count));

        for (key, offset) in &self.index {
            self.scratch.clear();
            self.scratch.extend_from_slice(&(key.len() as u32).to_le_bytes());
            self.scratch.extend_from_slice(&offset.to_le_bytes());
            self.scratch.extend_from_slice(key);
            self.writer.write_all(&self.scratch)?;
            meta_crc.update(&self.scratch);
        }

        let mut footer = [0u8; FOOTER_SIZE as usize];
        footer[0..8].copy_from_slice(&index_offset.to_le_bytes());
        footer[8..12].copy_from_slice(&self.crc.finalize().to_le_bytes());
        footer[12..16].copy_from_slice(&meta_crc.finalize().to_le_bytes());
        self.writer.write_all(&footer)?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| RdbError::Storage(format!("Failed to flush SSTable: {}", e)))?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        Ok(SSTable {
            file_size: file.metadata()?.len(),
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.first_key.unwrap_or_default(),
            max_key: self.last_key.unwrap_or_default(),
            flags: self.flags,
        })
    }
}
