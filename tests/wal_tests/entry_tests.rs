//! Tests for WAL entry framing
//!
//! These tests verify:
//! - Both operation kinds survive serialization
//! - The on-disk header layout (LSN, CRC, length)
//! - CRC checks over header LSN and payload
//! - Truncated and malformed buffers are rejected

use rdb::wal::{Operation, WalEntry, HEADER_SIZE};
use rdb::RdbError;

// =============================================================================
// Helper Functions
// =============================================================================

fn put(key: &[u8], value: &[u8]) -> Operation {
    Operation::Put {
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

fn sample_entry() -> WalEntry {
    WalEntry::new(7, put(b"key", b"value"))
}

// =============================================================================
// Serialization Tests
// =============================================================================

#[test]
fn test_put_and_delete_survive_serialization() {
    let entries = [
        WalEntry::new(1, put(b"hello", b"world")),
        WalEntry::new(2, Operation::Delete { key: b"hello".to_vec() }),
        WalEntry::new(3, put(b"", b"empty key")),
        WalEntry::new(4, put(b"empty value", b"")),
    ];

    for entry in entries {
        let bytes = entry.serialize().unwrap();
        assert_eq!(WalEntry::deserialize(&bytes).unwrap(), entry);
    }
}

#[test]
fn test_header_layout() {
    let entry = sample_entry();
    let bytes = entry.serialize().unwrap();

    let lsn = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let crc = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let len = u32::from_le_bytes(bytes[12..16].try_into().unwrap());

    assert_eq!(HEADER_SIZE, 16);
    assert_eq!(lsn, 7);
    assert_eq!(crc, entry.compute_crc().unwrap());
    assert_eq!(len as usize, bytes.len() - HEADER_SIZE);
    assert_eq!(bytes.len(), entry.serialized_size().unwrap());
}

#[test]
fn test_large_value() {
    let value = vec![0xAB; 1024 * 1024];
    let entry = WalEntry::new(999, put(b"big_key", &value));

    let recovered = WalEntry::deserialize(&entry.serialize().unwrap()).unwrap();

    match recovered.operation {
        Operation::Put { key, value: v } => {
            assert_eq!(key, b"big_key");
            assert_eq!(v, value);
        }
        other => panic!("Expected Put, got {:?}", other),
    }
}

#[test]
fn test_lsn_extremes() {
    for lsn in [0, 1, u64::MAX] {
        let entry = WalEntry::new(lsn, Operation::Delete { key: b"k".to_vec() });
        let recovered = WalEntry::deserialize(&entry.serialize().unwrap()).unwrap();
        assert_eq!(recovered.lsn, lsn);
    }
}

// =============================================================================
// Corruption Detection Tests
// =============================================================================

#[test]
fn test_flipped_payload_byte_detected() {
    let mut bytes = sample_entry().serialize().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(RdbError::WalCorruption(_))
    ));
}

#[test]
fn test_flipped_lsn_byte_detected() {
    // The checksum covers the LSN, so a damaged LSN cannot pass as valid
    let mut bytes = sample_entry().serialize().unwrap();
    bytes[0] ^= 0x01;

    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(RdbError::WalCorruption(_))
    ));
}

#[test]
fn test_flipped_crc_byte_detected() {
    let mut bytes = sample_entry().serialize().unwrap();
    bytes[8] ^= 0xFF;

    assert!(WalEntry::deserialize(&bytes).is_err());
}

#[test]
fn test_truncated_buffers_rejected() {
    let bytes = sample_entry().serialize().unwrap();

    assert!(WalEntry::deserialize(&[]).is_err());
    assert!(WalEntry::deserialize(&bytes[..10]).is_err());
    assert!(WalEntry::deserialize(&bytes[..HEADER_SIZE + 2]).is_err());
}

#[test]
fn test_crc_is_deterministic() {
    let entry = sample_entry();
    assert_eq!(entry.compute_crc().unwrap(), entry.compute_crc().unwrap());

    let other = WalEntry::new(8, put(b"key", b"value"));
    assert_ne!(entry.compute_crc().unwrap(), other.compute_crc().unwrap());
}
