//! Write-Ahead Log
//!
//! Every `set` and `remove` is appended here, and synced according to
//! [`WalSyncStrategy`](crate::config::WalSyncStrategy), before it reaches the
//! memtable. After a crash the log is replayed; once the memtable has been
//! flushed to an SSTable the log is truncated.
//!
//! ```text
//! { lsn u64 | crc32 u32 | len u32 | payload[len] }*
//! ```
//!
//! Little-endian. The CRC covers the LSN bytes followed by the payload; the
//! payload is the bincode encoding of an [`Operation`] plus its timestamp.
//! A record cut short at the end of the file is a torn write and counts as
//! end of log. A complete record with a bad CRC is corruption.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
