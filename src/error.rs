//! Error types for rdb
//!
//! Provides a unified error type for all operations, plus a coarse
//! [`ErrorKind`] used at the C boundary and by callers deciding whether a
//! failure is retryable.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using RdbError
pub type Result<T> = std::result::Result<T, RdbError>;

/// Unified error type for rdb operations
#[derive(Debug, Error)]
pub enum RdbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Database already in use: {}", .0.display())]
    AlreadyInUse(PathBuf),

    #[error("Database is read-only")]
    ReadOnly,

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of an [`RdbError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Filesystem failure; the caller may retry
    Io,
    /// On-disk state is inconsistent
    Corruption,
    /// Another live handle owns the path
    AlreadyInUse,
    /// Write attempted on a read-only database
    ReadOnly,
    /// Closed or unknown handle
    InvalidHandle,
    /// Rejected configuration or malformed argument
    Config,
    /// Misuse of an internal storage component
    Internal,
}

impl RdbError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RdbError::Io(_) => ErrorKind::Io,
            RdbError::Corruption(_)
            | RdbError::WalCorruption(_)
            | RdbError::Serialization(_) => ErrorKind::Corruption,
            RdbError::AlreadyInUse(_) => ErrorKind::AlreadyInUse,
            RdbError::ReadOnly => ErrorKind::ReadOnly,
            RdbError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            RdbError::Config(_) | RdbError::InvalidArgument(_) => ErrorKind::Config,
            RdbError::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<bincode::Error> for RdbError {
    fn from(e: bincode::Error) -> Self {
        RdbError::Serialization(e.to_string())
    }
}
