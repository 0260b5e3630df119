//! WAL Reader
//!
//! Handles reading entries from the WAL file.
//!
//! A torn tail (incomplete header or data at the end of the file) is what a
//! crash mid-append leaves behind; the reader treats it as end of log. A
//! complete entry whose checksum does not match is reported as corruption.
//! When that damaged entry is followed by another complete entry it cannot
//! be a crash artifact, and reading fails outright so nothing after it is
//! ever discarded.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{RdbError, Result};

use super::entry::EntryHeader;
use super::{WalEntry, HEADER_SIZE};

/// Outcome of reading one framed entry
pub(crate) enum RawRead {
    Entry(WalEntry),
    /// Clean end of file
    Eof,
    /// Incomplete entry at the tail
    Torn,
    /// Complete final entry that failed validation
    Corrupt(RdbError),
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    file_len: u64,
    /// Offset just past the last valid entry
    position: u64,
    /// Set once a torn tail or corrupt entry has been hit
    finished: bool,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            file_len,
            position: 0,
            finished: false,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at end of log, including a torn tail.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_raw()? {
            RawRead::Entry(entry) => Ok(Some(entry)),
            RawRead::Eof | RawRead::Torn => Ok(None),
            RawRead::Corrupt(e) => Err(e),
        }
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Offset just past the last entry returned
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total file length at open
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub(crate) fn read_raw(&mut self) -> Result<RawRead> {
        if self.finished {
            return Ok(RawRead::Eof);
        }

        let remaining = self.file_len - self.position;
        if remaining == 0 {
            return Ok(RawRead::Eof);
        }
        if remaining < HEADER_SIZE as u64 {
            self.finished = true;
            return Ok(RawRead::Torn);
        }

        let mut buf = vec![0u8; HEADER_SIZE];
        if !self.fill(&mut buf)? {
            self.finished = true;
            return Ok(RawRead::Torn);
        }

        let header = EntryHeader::decode(&buf);
        let entry_len = HEADER_SIZE as u64 + header.len as u64;
        if entry_len > remaining {
            self.finished = true;
            return Ok(RawRead::Torn);
        }

        buf.resize(entry_len as usize, 0);
        if !self.fill(&mut buf[HEADER_SIZE..])? {
            self.finished = true;
            return Ok(RawRead::Torn);
        }

        match WalEntry::deserialize(&buf) {
            Ok(entry) => {
                self.position += entry_len;
                Ok(RawRead::Entry(entry))
            }
            Err(e) => {
                self.finished = true;
                if self.record_follows(remaining - entry_len)? {
                    return Err(RdbError::WalCorruption(format!(
                        "damaged entry at offset {} is followed by intact entries: {}",
                        self.position, e
                    )));
                }
                Ok(RawRead::Corrupt(e))
            }
        }
    }

    /// Whether the `after` bytes past the current entry hold a complete entry
    fn record_follows(&mut self, after: u64) -> Result<bool> {
        if after < HEADER_SIZE as u64 {
            return Ok(false);
        }
        let mut buf = [0u8; HEADER_SIZE];
        if !self.fill(&mut buf)? {
            return Ok(false);
        }
        let header = EntryHeader::decode(&buf);
        Ok(HEADER_SIZE as u64 + header.len as u64 <= after)
    }

    /// Read exactly `buf.len()` bytes; `false` on premature EOF
    fn fill(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
