//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from clean and empty logs
//! - Torn tails and a damaged final entry end recovery at the last good entry
//! - A damaged entry with intact entries after it fails recovery untouched
//! - `recover` cuts the file back; `verify` leaves it alone

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rdb::config::WalSyncStrategy;
use rdb::wal::{Operation, RecoveryResult, WalEntry, WalRecovery, WalWriter, HEADER_SIZE};
use rdb::{ErrorKind, RdbError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

/// Well-formed WAL written through the writer
fn write_entries_via_writer(path: &Path, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(Operation::Put {
                key: format!("key{}", i).into_bytes(),
                value: format!("value{}", i).into_bytes(),
            })
            .unwrap();
    }
}

fn small_entry(lsn: u64) -> WalEntry {
    WalEntry::new(
        lsn,
        Operation::Put {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
        },
    )
}

/// One good entry followed by `tail`; returns the good entry's length
fn write_good_then(path: &Path, tail: &[u8]) -> u64 {
    let good = small_entry(1).serialize().unwrap();
    let mut file = File::create(path).unwrap();
    file.write_all(&good).unwrap();
    file.write_all(tail).unwrap();
    file.sync_all().unwrap();
    good.len() as u64
}

fn corrupted_entry(lsn: u64) -> Vec<u8> {
    let mut bytes = small_entry(lsn).serialize().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    bytes
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

// =============================================================================
// Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(
        result,
        RecoveryResult {
            entries_recovered: 0,
            entries_corrupted: 0,
            last_lsn: 0,
            was_truncated: false,
        }
    );
}

#[test]
fn test_recover_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);
    let len_before = file_len(&wal_path);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.last_lsn, 10);
    assert!(!result.was_truncated);
    assert_eq!(file_len(&wal_path), len_before);

    let lsns: Vec<u64> = entries.iter().map(|e| e.lsn).collect();
    assert_eq!(lsns, (1..=10).collect::<Vec<u64>>());
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_recover_partial_header_truncates_file() {
    let (_temp, wal_path) = setup_temp_wal();
    let good_len = write_good_then(&wal_path, &[0u8; 8]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_corrupted, 0);
    assert!(result.was_truncated);
    assert_eq!(file_len(&wal_path), good_len);
}

#[test]
fn test_recover_partial_data_truncates_file() {
    let (_temp, wal_path) = setup_temp_wal();
    let torn = small_entry(2).serialize().unwrap();
    let good_len = write_good_then(&wal_path, &torn[..20]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert!(result.was_truncated);
    assert_eq!(file_len(&wal_path), good_len);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_recover_fails_on_damaged_middle_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    let len_before = file_len(&wal_path);

    // First payload byte of the second entry
    let mut bytes = fs::read(&wal_path).unwrap();
    let first_len = HEADER_SIZE + u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
    bytes[first_len + HEADER_SIZE] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let err = WalRecovery::recover(&wal_path).unwrap_err();
    assert!(matches!(err, RdbError::WalCorruption(_)));
    assert_eq!(err.kind(), ErrorKind::Corruption);

    // The intact third entry is still on disk
    assert_eq!(file_len(&wal_path), len_before);
    assert!(WalRecovery::verify(&wal_path).is_err());
}

#[test]
fn test_recover_drops_damaged_final_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    let len_before = file_len(&wal_path);

    let mut bytes = fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 2);
    assert!(result.was_truncated);
    assert!(file_len(&wal_path) < len_before);
    assert_eq!(WalRecovery::verify(&wal_path).unwrap().entries_recovered, 2);
}

#[test]
fn test_damaged_entry_followed_by_torn_tail_is_dropped() {
    let (_temp, wal_path) = setup_temp_wal();

    // No complete entry after the bad one, only half of one
    let mut tail = corrupted_entry(2);
    let torn = small_entry(3).serialize().unwrap();
    tail.extend_from_slice(&torn[..HEADER_SIZE - 4]);
    let good_len = write_good_then(&wal_path, &tail);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(file_len(&wal_path), good_len);
}

#[test]
fn test_recover_corruption_at_first_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    fs::write(&wal_path, corrupted_entry(1)).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 0);
    assert_eq!(file_len(&wal_path), 0);
}

#[test]
fn test_recovered_wal_accepts_new_writes() {
    let (_temp, wal_path) = setup_temp_wal();
    write_good_then(&wal_path, &corrupted_entry(2));

    WalRecovery::recover(&wal_path).unwrap();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(
        writer.append(Operation::Delete { key: b"k".to_vec() }).unwrap(),
        2
    );

    let result = WalRecovery::verify(&wal_path).unwrap();
    assert_eq!(result.entries_recovered, 2);
    assert!(!result.was_truncated);
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 5);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 5);
    assert!(!result.was_truncated);
}

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_good_then(&wal_path, &corrupted_entry(2));
    let len_before = file_len(&wal_path);

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.entries_corrupted, 1);
    assert!(result.was_truncated);
    assert_eq!(file_len(&wal_path), len_before);
}

#[test]
fn test_recover_and_verify_agree() {
    let (_temp, wal_path) = setup_temp_wal();
    write_good_then(&wal_path, &[0u8; 5]);

    let verify_result = WalRecovery::verify(&wal_path).unwrap();
    let (entries, recover_result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len() as u64, recover_result.entries_recovered);
    assert_eq!(verify_result, recover_result);
}
