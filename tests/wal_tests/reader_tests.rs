//! Tests for WAL Reader
//!
//! These tests verify:
//! - Sequential reads and the iterator
//! - A torn tail reads as end of log
//! - A checksum failure is an error, and iteration stops after it, whether
//!   or not intact entries follow
//! - Position tracking

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use rdb::wal::{Operation, WalEntry, WalReader, HEADER_SIZE};
use rdb::RdbError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn entry(lsn: u64) -> WalEntry {
    WalEntry::new(
        lsn,
        Operation::Put {
            key: format!("k{}", lsn).into_bytes(),
            value: format!("v{}", lsn).into_bytes(),
        },
    )
}

/// Write raw bytes: complete entries followed by an optional tail
fn write_wal(path: &PathBuf, entries: &[WalEntry], tail: &[u8]) {
    let mut file = File::create(path).unwrap();
    for e in entries {
        file.write_all(&e.serialize().unwrap()).unwrap();
    }
    file.write_all(tail).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Basic Reading Tests
// =============================================================================

#[test]
fn test_empty_file_is_end_of_log() {
    let (_temp, wal_path) = setup_temp_wal();
    write_wal(&wal_path, &[], &[]);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.entries().count(), 0);
}

#[test]
fn test_next_entry_reads_in_order() {
    let (_temp, wal_path) = setup_temp_wal();
    let written = vec![entry(1), entry(2), entry(3)];
    write_wal(&wal_path, &written, &[]);

    let mut reader = WalReader::open(&wal_path).unwrap();
    for expected in &written {
        assert_eq!(&reader.next_entry().unwrap().unwrap(), expected);
    }
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), reader.file_len());
}

#[test]
fn test_iterator_collects_all_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let written: Vec<_> = (1..=50).map(entry).collect();
    write_wal(&wal_path, &written, &[]);

    let read: Vec<_> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(read, written);
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_partial_header_is_end_of_log() {
    let (_temp, wal_path) = setup_temp_wal();
    write_wal(&wal_path, &[entry(1)], &[0u8; 8]);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_none());
    assert!(reader.position() < reader.file_len());
}

#[test]
fn test_partial_data_is_end_of_log() {
    let (_temp, wal_path) = setup_temp_wal();
    let torn = entry(2).serialize().unwrap();
    write_wal(&wal_path, &[entry(1)], &torn[..HEADER_SIZE + 4]);

    let first_len = entry(1).serialize().unwrap().len() as u64;
    let mut reader = WalReader::open(&wal_path).unwrap();

    assert_eq!(reader.next_entry().unwrap().unwrap().lsn, 1);
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), first_len);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_crc_mismatch_is_an_error() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut bad = entry(2).serialize().unwrap();
    let last = bad.len() - 1;
    bad[last] ^= 0xFF;
    write_wal(&wal_path, &[entry(1)], &bad);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert_eq!(reader.next_entry().unwrap().unwrap().lsn, 1);
    assert!(matches!(
        reader.next_entry(),
        Err(RdbError::WalCorruption(_))
    ));
    // Nothing is read past a bad entry
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_iterator_stops_after_corruption() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut bad = entry(2).serialize().unwrap();
    bad[HEADER_SIZE] ^= 0xFF;
    let trailing = entry(3).serialize().unwrap();

    let mut tail = bad;
    tail.extend_from_slice(&trailing);
    write_wal(&wal_path, &[entry(1)], &tail);

    let results: Vec<_> = WalReader::open(&wal_path).unwrap().entries().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    // The intact entry behind the damage is never skipped to or dropped silently
    assert!(matches!(results[1], Err(RdbError::WalCorruption(_))));
}
