//! Ledger of acknowledgments already registered with the service.

use crate::error::StoreResult;
use crate::log::KeyedLog;
use chrono::{DateTime, Utc};
use dfesync_protocol::{AckType, DocumentKey, TaxId};
use dfesync_storage::StorageBackend;
use serde::{Deserialize, Serialize};

/// One acknowledgment the service accepted or already had.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckEntry {
    /// Acknowledged invoice.
    pub key: DocumentKey,
    /// Acknowledgment type.
    pub ack: AckType,
    /// Credential that submitted it.
    pub identity: TaxId,
    /// True when the service reported it as already registered.
    pub duplicate: bool,
    /// When the outcome was recorded.
    pub recorded_at: DateTime<Utc>,
}

fn ledger_key(key: &DocumentKey, ack: AckType) -> String {
    format!("{key}:{}", ack.code())
}

/// Persisted record of acknowledgment attempts that need no resubmission.
pub struct AckLedger {
    log: KeyedLog<AckEntry>,
}

impl AckLedger {
    pub(crate) const LOG_NAME: &'static str = "acks.log";

    pub(crate) fn open(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> StoreResult<Self> {
        Ok(Self {
            log: KeyedLog::open(Self::LOG_NAME, backend, sync_on_write)?,
        })
    }

    /// True when `ack` was already recorded for `key`.
    #[must_use]
    pub fn contains(&self, key: &DocumentKey, ack: AckType) -> bool {
        self.log.contains(&ledger_key(key, ack))
    }

    /// Records an accepted or duplicate acknowledgment.
    pub fn record(&self, entry: AckEntry) -> StoreResult<()> {
        self.log.put(&ledger_key(&entry.key, entry.ack), entry)
    }

    /// Entries recorded for `identity`.
    #[must_use]
    pub fn list_by_credential(&self, identity: &TaxId) -> Vec<AckEntry> {
        self.log
            .entries()
            .into_iter()
            .map(|(_, e)| e)
            .filter(|e| &e.identity == identity)
            .collect()
    }

    pub(crate) fn compact(&self) -> StoreResult<()> {
        self.log.compact()
    }
}
