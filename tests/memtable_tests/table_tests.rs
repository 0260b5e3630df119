//! Tests for MemTable
//!
//! These tests verify:
//! - Put/get/delete with tombstones
//! - Size accounting that drives flushes
//! - Sorted snapshot iteration
//! - Concurrent readers alongside a writer

use std::sync::Arc;
use std::thread;

use rdb::memtable::{MemTable, MemTableEntry};

fn value(v: &[u8]) -> Option<MemTableEntry> {
    Some(MemTableEntry::Value(v.to_vec()))
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new();
    assert!(memtable.is_empty());
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.size(), 0);
    assert_eq!(memtable.get(b"anything"), None);
}

#[test]
fn test_put_get_overwrite() {
    let memtable = MemTable::new();

    memtable.put(b"key1".to_vec(), b"value1".to_vec());
    memtable.put(b"key2".to_vec(), b"value2".to_vec());
    memtable.put(b"key1".to_vec(), b"replaced".to_vec());

    assert_eq!(memtable.entry_count(), 2);
    assert_eq!(memtable.get(b"key1"), value(b"replaced"));
    assert_eq!(memtable.get(b"key2"), value(b"value2"));
}

#[test]
fn test_delete_leaves_tombstone() {
    let memtable = MemTable::new();

    memtable.put(b"key".to_vec(), b"value".to_vec());
    memtable.delete(b"key".to_vec());
    memtable.delete(b"never_written".to_vec());

    assert_eq!(memtable.get(b"key"), Some(MemTableEntry::Tombstone));
    assert_eq!(memtable.get(b"never_written"), Some(MemTableEntry::Tombstone));
    assert_eq!(memtable.entry_count(), 2);
    assert!(!memtable.is_empty());

    memtable.put(b"key".to_vec(), b"back".to_vec());
    assert_eq!(memtable.get(b"key"), value(b"back"));
}

#[test]
fn test_into_value() {
    assert_eq!(MemTableEntry::Value(b"v".to_vec()).into_value(), Some(b"v".to_vec()));
    assert_eq!(MemTableEntry::Tombstone.into_value(), None);
}

#[test]
fn test_empty_key_and_value() {
    let memtable = MemTable::new();

    memtable.put(vec![], b"for empty key".to_vec());
    memtable.put(b"empty value".to_vec(), vec![]);

    assert_eq!(memtable.get(&[]), value(b"for empty key"));
    assert_eq!(memtable.get(b"empty value"), value(b""));
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_counts_keys_and_values() {
    let memtable = MemTable::new();

    let returned = memtable.put(b"key".to_vec(), b"value".to_vec());
    assert_eq!(returned, 8);
    assert_eq!(memtable.size(), 8);

    memtable.put(b"key2".to_vec(), b"v2".to_vec());
    assert_eq!(memtable.size(), 14);
}

#[test]
fn test_size_after_overwrite_and_delete() {
    let memtable = MemTable::new();

    memtable.put(b"key".to_vec(), b"short".to_vec());
    memtable.put(b"key".to_vec(), b"much_longer_value".to_vec());
    assert_eq!(memtable.size(), 3 + 17);

    // Tombstone keeps only the key
    let returned = memtable.delete(b"key".to_vec());
    assert_eq!(returned, 3);
    assert_eq!(memtable.size(), 3);

    memtable.delete(b"key".to_vec());
    assert_eq!(memtable.size(), 3);
}

#[test]
fn test_should_flush_at_limit() {
    let memtable = MemTable::new();
    memtable.put(b"key".to_vec(), b"value".to_vec());
    let size = memtable.size();

    assert!(!memtable.should_flush(size + 1));
    assert!(memtable.should_flush(size));
    assert!(memtable.should_flush(size - 1));
}

#[test]
fn test_clear_resets_everything() {
    let memtable = MemTable::new();
    memtable.put(b"key1".to_vec(), b"value1".to_vec());
    memtable.delete(b"key2".to_vec());

    memtable.clear();

    assert!(memtable.is_empty());
    assert_eq!(memtable.size(), 0);
    assert_eq!(memtable.get(b"key1"), None);
    assert_eq!(memtable.get(b"key2"), None);
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iter_sorted_with_tombstones() {
    let memtable = MemTable::new();

    memtable.put(b"cherry".to_vec(), b"3".to_vec());
    memtable.delete(b"banana".to_vec());
    memtable.put(b"apple".to_vec(), b"1".to_vec());

    assert_eq!(
        memtable.iter(),
        vec![
            (b"apple".to_vec(), MemTableEntry::Value(b"1".to_vec())),
            (b"banana".to_vec(), MemTableEntry::Tombstone),
            (b"cherry".to_vec(), MemTableEntry::Value(b"3".to_vec())),
        ]
    );
}

#[test]
fn test_iter_is_a_copy() {
    let memtable = MemTable::new();
    memtable.put(b"key".to_vec(), b"before".to_vec());

    let snapshot = memtable.iter();
    memtable.put(b"key".to_vec(), b"after".to_vec());
    memtable.put(b"other".to_vec(), b"x".to_vec());

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].1, MemTableEntry::Value(b"before".to_vec()));
}

#[test]
fn test_iter_orders_bytes_unsigned() {
    let memtable = MemTable::new();
    memtable.put(vec![0xFF], b"high".to_vec());
    memtable.put(vec![0x00], b"low".to_vec());
    memtable.put(vec![0x7F, 0x00], b"mid".to_vec());

    let keys: Vec<_> = memtable.iter().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![vec![0x00], vec![0x7F, 0x00], vec![0xFF]]);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_readers_and_writer() {
    let memtable = Arc::new(MemTable::new());
    for i in 0..100 {
        memtable.put(format!("key{:03}", i).into_bytes(), b"v".to_vec());
    }

    let writer = {
        let memtable = Arc::clone(&memtable);
        thread::spawn(move || {
            for i in 100..200 {
                memtable.put(format!("key{:03}", i).into_bytes(), b"v".to_vec());
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let memtable = Arc::clone(&memtable);
            thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("key{:03}", i);
                    assert_eq!(memtable.get(key.as_bytes()), value(b"v"));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(memtable.entry_count(), 200);
}
