//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::reader::{RawRead, WalReader};
use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    file: File,
    /// LSN the next appended entry receives
    current_lsn: u64,
    /// Length of the file covered by complete entries
    len: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    uncommitted: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// Any torn tail left by a crash is cut off so new entries directly follow
    /// the last valid one.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let (last_lsn, valid_len) = Self::scan_existing(path)?;

        if valid_len < file.metadata()?.len() {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "Discarding incomplete WAL tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let mut writer = Self {
            file,
            current_lsn: last_lsn + 1,
            len: valid_len,
            sync_strategy,
            uncommitted: 0,
        };
        writer.file.seek(SeekFrom::Start(valid_len))?;

        Ok(writer)
    }

    /// Append an entry to the WAL, returning its LSN
    ///
    /// On failure the file is cut back to its previous length, so a failed
    /// append never leaves a partial entry behind.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.current_lsn;
        let bytes = WalEntry::new(lsn, operation).serialize()?;

        if let Err(e) = self.write_and_maybe_sync(&bytes) {
            self.rollback();
            return Err(e);
        }

        self.len += bytes.len() as u64;
        self.current_lsn += 1;
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Discard every entry and restart LSNs at 1
    ///
    /// Called once the logged operations are durable elsewhere.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;

        self.len = 0;
        self.current_lsn = 1;
        self.uncommitted = 0;
        Ok(())
    }

    /// Get the current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Entries written but not yet fsynced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    fn write_and_maybe_sync(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.uncommitted += 1;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count,
        };
        if should_sync {
            self.sync()?;
        }
        Ok(())
    }

    fn rollback(&mut self) {
        let restored = self
            .file
            .set_len(self.len)
            .and_then(|_| self.file.seek(SeekFrom::Start(self.len)).map(|_| ()));
        if let Err(e) = restored {
            tracing::error!(error = %e, "Failed to roll back WAL after append error");
        }
    }

    /// Last valid LSN and the byte length covered by valid entries
    fn scan_existing(path: &Path) -> Result<(u64, u64)> {
        let mut reader = WalReader::open(path)?;
        let mut last_lsn = 0;
        while let RawRead::Entry(entry) = reader.read_raw()? {
            last_lsn = entry.lsn;
        }
        Ok((last_lsn, reader.position()))
    }
}
