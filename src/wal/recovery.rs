//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;

use super::reader::{RawRead, WalReader};
use super::WalEntry;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at a partial or damaged final entry
    /// 3. Truncate the file after the last valid entry
    /// 4. Return all valid entries in order
    ///
    /// A damaged entry with intact entries after it fails with
    /// `WalCorruption` and leaves the file untouched.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result, valid_len) = Self::scan(path, true)?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;

            tracing::warn!(
                path = %path.display(),
                valid_len,
                corrupted = result.entries_corrupted,
                "Truncated WAL after last valid entry"
            );
        }

        Ok((entries, result))
    }

    /// Read the entries `recover` would keep, without modifying the file
    pub fn read(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result, _) = Self::scan(path, true)?;
        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, result, _) = Self::scan(path, false)?;
        Ok(result)
    }

    /// Shared walk used by `recover` and `verify`
    fn scan(path: &Path, collect: bool) -> Result<(Vec<WalEntry>, RecoveryResult, u64)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult {
            entries_recovered: 0,
            entries_corrupted: 0,
            last_lsn: 0,
            was_truncated: false,
        };

        loop {
            match reader.read_raw()? {
                RawRead::Entry(entry) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    if collect {
                        entries.push(entry);
                    }
                }
                RawRead::Eof => break,
                RawRead::Torn => {
                    result.was_truncated = true;
                    break;
                }
                RawRead::Corrupt(e) => {
                    tracing::warn!(error = %e, offset = reader.position(), "Damaged final WAL entry");
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    break;
                }
            }
        }

        Ok((entries, result, reader.position()))
    }
}
