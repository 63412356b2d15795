//! Error types for the sync engine.

use dfesync_protocol::{ProtocolError, TaxId};
use dfesync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The credential's certificate is unusable. Its worker parks and only
    /// re-opens the certificate once per cycle interval.
    #[error("credential {identity} unusable: {reason}")]
    Credential {
        /// Affected identity.
        identity: String,
        /// What went wrong.
        reason: String,
    },

    /// The service answered with an application-level rejection.
    #[error("distribution rejected ({code}): {message}")]
    DistributionRejected {
        /// Machine-readable reason code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// The service asked us to slow down.
    #[error("throttled ({code}): {message}")]
    Throttled {
        /// Status code reported by the service.
        code: String,
        /// Message reported by the service.
        message: String,
    },

    /// Network or TLS error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The exchange exceeded the request timeout.
    #[error("operation timed out")]
    Timeout,

    /// A response or entry could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Request building failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No credential is registered for the identity.
    #[error("no credential registered for {0}")]
    UnknownCredential(String),

    /// The credential's service does not offer the operation.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl SyncError {
    /// Creates a credential error for `identity`.
    pub fn credential(identity: &TaxId, reason: impl Into<String>) -> Self {
        Self::Credential {
            identity: identity.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::Throttled { .. } => true,
            _ => false,
        }
    }

    /// Returns true for network-level failures, timeouts included.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport { .. } | SyncError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("no route").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::DistributionRejected {
            code: "593".into(),
            message: "CNPJ diverge".into()
        }
        .is_retryable());
    }

    #[test]
    fn credential_errors_are_not_transport() {
        let identity = TaxId::parse("12345678000190").unwrap();
        let err = SyncError::credential(&identity, "bad passphrase");
        assert!(!err.is_transport());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("12345678000190"));
        assert!(SyncError::Timeout.is_transport());
    }

    #[test]
    fn error_display() {
        let err = SyncError::DistributionRejected {
            code: "589".into(),
            message: "NSU informado superior ao maior NSU".into(),
        };
        assert!(err.to_string().contains("589"));
        assert!(err.to_string().contains("maior NSU"));
    }
}
