//! Error types for the stores.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] dfesync_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Identifier or payload failed protocol validation.
    #[error("protocol error: {0}")]
    Protocol(#[from] dfesync_protocol::ProtocolError),

    /// A record could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A log frame passed its checksum but could not be decoded.
    #[error("log corruption in {log}: {message}")]
    Corruption {
        /// Log file name.
        log: &'static str,
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the data directory.
    #[error("data directory locked: another process has exclusive access")]
    Locked,

    /// The data directory is missing or not a directory.
    #[error("invalid data directory: {message}")]
    InvalidDirectory {
        /// Description of the problem.
        message: String,
    },

    /// A credential with this identity is already registered.
    #[error("credential already registered: {0}")]
    CredentialExists(String),

    /// No credential with this identity is registered.
    #[error("credential not found: {0}")]
    CredentialNotFound(String),
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corruption(log: &'static str, message: impl Into<String>) -> Self {
        Self::Corruption {
            log,
            message: message.into(),
        }
    }

    /// Creates an invalid directory error.
    pub fn invalid_directory(message: impl Into<String>) -> Self {
        Self::InvalidDirectory {
            message: message.into(),
        }
    }
}
