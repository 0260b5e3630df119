//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their on-disk
//! framing.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{RdbError, Result};

/// Entry header size: LSN (8) + CRC (4) + Len (4) = 16 bytes
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

/// Bincode payload stored in the data section
#[derive(Serialize, Deserialize)]
struct Payload {
    operation: Operation,
    timestamp: u64,
}

/// Decoded fixed-size entry header
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl EntryHeader {
    pub(crate) fn decode(mut buf: &[u8]) -> Self {
        let lsn = buf.get_u64_le();
        let crc = buf.get_u32_le();
        let len = buf.get_u32_le();
        Self { lsn, crc, len }
    }
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode as `[LSN][CRC][Len][Data]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = self.payload_bytes()?;
        let len = u32::try_from(data.len()).map_err(|_| {
            RdbError::Serialization(format!("WAL entry too large: {} bytes", data.len()))
        })?;
        let crc = checksum(self.lsn, &data);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + data.len());
        buf.put_u64_le(self.lsn);
        buf.put_u32_le(crc);
        buf.put_u32_le(len);
        buf.put_slice(&data);

        Ok(buf.to_vec())
    }

    /// Decode a single framed entry, verifying its checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RdbError::WalCorruption(format!(
                "entry header truncated: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let header = EntryHeader::decode(&bytes[..HEADER_SIZE]);
        let end = HEADER_SIZE + header.len as usize;
        if bytes.len() < end {
            return Err(RdbError::WalCorruption(format!(
                "entry data truncated: {} of {} bytes",
                bytes.len() - HEADER_SIZE,
                header.len
            )));
        }

        let data = &bytes[HEADER_SIZE..end];
        let actual = checksum(header.lsn, data);
        if actual != header.crc {
            return Err(RdbError::WalCorruption(format!(
                "CRC mismatch at LSN {}: stored {:#010x}, computed {:#010x}",
                header.lsn, header.crc, actual
            )));
        }

        let payload: Payload = bincode::deserialize(data)
            .map_err(|e| RdbError::WalCorruption(format!("undecodable payload: {}", e)))?;

        Ok(Self {
            lsn: header.lsn,
            operation: payload.operation,
            timestamp: payload.timestamp,
        })
    }

    /// Number of bytes `serialize` will produce
    pub fn serialized_size(&self) -> Result<usize> {
        let payload = PayloadRef {
            operation: &self.operation,
            timestamp: self.timestamp,
        };
        Ok(HEADER_SIZE + bincode::serialized_size(&payload)? as usize)
    }

    /// CRC32 over the LSN and the encoded payload
    pub fn compute_crc(&self) -> Result<u32> {
        Ok(checksum(self.lsn, &self.payload_bytes()?))
    }

    fn payload_bytes(&self) -> Result<Vec<u8>> {
        let payload = PayloadRef {
            operation: &self.operation,
            timestamp: self.timestamp,
        };
        Ok(bincode::serialize(&payload)?)
    }
}

/// Borrowing twin of [`Payload`]; encodes identically
#[derive(Serialize)]
struct PayloadRef<'a> {
    operation: &'a Operation,
    timestamp: u64,
}

fn checksum(lsn: u64, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}
