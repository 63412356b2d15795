//! Document records and the anti-downgrade upsert.

use crate::error::StoreResult;
use crate::log::RecordLog;
use chrono::{DateTime, Utc};
use dfesync_protocol::{Completeness, DocumentKey, DocumentKind, DocumentMeta, Nsu, TaxId};
use dfesync_storage::StorageBackend;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// A persisted fiscal document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique document key.
    pub key: DocumentKey,
    /// Credential the document was first distributed to.
    pub owner: TaxId,
    /// Invoice or event.
    pub kind: DocumentKind,
    /// SUMMARY or COMPLETE.
    pub completeness: Completeness,
    /// Sequence number of the entry that last wrote this record.
    pub nsu: Option<Nsu>,
    /// Schema tag of that entry.
    pub schema: Option<String>,
    /// Issuer CNPJ/CPF digits.
    pub issuer_tax_id: Option<String>,
    /// Issuer name.
    pub issuer_name: Option<String>,
    /// Document number.
    pub number: Option<String>,
    /// Issue timestamp as sent by the service.
    pub issued_at: Option<String>,
    /// Total amount as sent by the service.
    pub total: Option<String>,
    /// Event type code, for events.
    pub event_type: Option<String>,
    /// Raw XML. Present only for COMPLETE records.
    pub payload: Option<String>,
    /// Last write time.
    pub touched_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Builds a record from parsed metadata.
    #[must_use]
    pub fn from_meta(meta: DocumentMeta, owner: TaxId, touched_at: DateTime<Utc>) -> Self {
        Self {
            key: meta.key,
            owner,
            kind: meta.kind,
            completeness: meta.completeness,
            nsu: None,
            schema: None,
            issuer_tax_id: meta.issuer_tax_id,
            issuer_name: meta.issuer_name,
            number: meta.number,
            issued_at: meta.issued_at,
            total: meta.total,
            event_type: meta.event_type,
            payload: None,
            touched_at,
        }
    }

    /// Sets the distribution entry this record came from.
    #[must_use]
    pub fn with_source(mut self, nsu: Option<Nsu>, schema: Option<String>) -> Self {
        self.nsu = nsu;
        self.schema = schema;
        self
    }

    /// Attaches the raw document.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Checks that the record is worth persisting.
    ///
    /// # Errors
    ///
    /// Returns the reason when the record has neither a document number nor
    /// an issuer name, or claims COMPLETE without a payload.
    pub fn validate(&self) -> Result<(), String> {
        let usable = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !usable(&self.number) && !usable(&self.issuer_name) {
            return Err("neither document number nor issuer name".into());
        }
        if self.completeness == Completeness::Complete && !usable(&self.payload) {
            return Err("complete record without payload".into());
        }
        Ok(())
    }

    /// Copy without the payload.
    #[must_use]
    pub fn header(&self) -> Self {
        Self {
            payload: None,
            ..self.clone()
        }
    }

    fn fill_missing_from(&mut self, older: &DocumentRecord) {
        fn keep(field: &mut Option<String>, older: &Option<String>) {
            if field.is_none() {
                field.clone_from(older);
            }
        }
        self.owner = older.owner.clone();
        keep(&mut self.issuer_tax_id, &older.issuer_tax_id);
        keep(&mut self.issuer_name, &older.issuer_name);
        keep(&mut self.number, &older.number);
        keep(&mut self.issued_at, &older.issued_at);
        keep(&mut self.total, &older.total);
        keep(&mut self.event_type, &older.event_type);
    }

    /// Equal in everything but bookkeeping (entry NSU, schema, timestamp).
    fn same_content(&self, other: &DocumentRecord) -> bool {
        self.key == other.key
            && self.owner == other.owner
            && self.kind == other.kind
            && self.completeness == other.completeness
            && self.issuer_tax_id == other.issuer_tax_id
            && self.issuer_name == other.issuer_name
            && self.number == other.number
            && self.issued_at == other.issued_at
            && self.total == other.total
            && self.event_type == other.event_type
            && self.payload == other.payload
    }
}

/// What an upsert did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New key.
    Inserted,
    /// SUMMARY replaced by COMPLETE.
    Upgraded,
    /// Same completeness, new information.
    Refreshed,
    /// Same completeness, nothing new. No write.
    Unchanged,
    /// SUMMARY offered for a COMPLETE record. No write.
    DowngradeRejected,
    /// Record failed validation. No write.
    Invalid(String),
}

impl UpsertOutcome {
    /// True when the upsert wrote to the store.
    #[must_use]
    pub fn wrote(&self) -> bool {
        matches!(self, Self::Inserted | Self::Upgraded | Self::Refreshed)
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inserted => f.write_str("inserted"),
            Self::Upgraded => f.write_str("upgraded"),
            Self::Refreshed => f.write_str("refreshed"),
            Self::Unchanged => f.write_str("unchanged"),
            Self::DowngradeRejected => f.write_str("downgrade rejected"),
            Self::Invalid(reason) => write!(f, "invalid: {reason}"),
        }
    }
}

struct Indexed {
    offset: u64,
    header: DocumentRecord,
}

/// Documents keyed by document key.
///
/// Only headers live in memory; payloads are read back from the log.
pub struct DocumentStore {
    log: RecordLog,
    index: RwLock<HashMap<DocumentKey, Indexed>>,
}

impl DocumentStore {
    pub(crate) const LOG_NAME: &'static str = "documents.log";

    pub(crate) fn open(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> StoreResult<Self> {
        let (log, records) = RecordLog::open::<DocumentRecord>(Self::LOG_NAME, backend, sync_on_write)?;
        let mut index = HashMap::with_capacity(records.len());
        for (offset, record) in records {
            index.insert(
                record.key.clone(),
                Indexed {
                    offset,
                    header: record.header(),
                },
            );
        }
        Ok(Self {
            log,
            index: RwLock::new(index),
        })
    }

    /// Inserts or updates a record.
    ///
    /// A COMPLETE record is never replaced by a SUMMARY one, and writing a
    /// record that adds nothing is a no-op. Missing metadata in the incoming
    /// record is kept from the stored one.
    pub fn upsert(&self, record: DocumentRecord) -> StoreResult<UpsertOutcome> {
        let mut record = record;
        if record.completeness == Completeness::Summary {
            record.payload = None;
        }
        if let Err(reason) = record.validate() {
            debug!(key = %record.key, %reason, "rejecting invalid record");
            return Ok(UpsertOutcome::Invalid(reason));
        }

        let mut index = self.index.write();
        let outcome = match index.get(&record.key) {
            None => UpsertOutcome::Inserted,
            Some(existing) => {
                let stored = &existing.header;
                match (stored.completeness, record.completeness) {
                    (Completeness::Complete, Completeness::Summary) => {
                        UpsertOutcome::DowngradeRejected
                    }
                    (Completeness::Summary, Completeness::Complete) => {
                        record.fill_missing_from(stored);
                        UpsertOutcome::Upgraded
                    }
                    _ => {
                        record.fill_missing_from(stored);
                        let mut current = stored.clone();
                        if current.completeness == Completeness::Complete {
                            current = self.log.read(existing.offset)?;
                        }
                        if record.same_content(&current) {
                            UpsertOutcome::Unchanged
                        } else {
                            UpsertOutcome::Refreshed
                        }
                    }
                }
            }
        };

        if outcome.wrote() {
            let offset = self.log.append(&record)?;
            let header = record.header();
            index.insert(record.key, Indexed { offset, header });
        }
        debug!(outcome = %outcome, "document upsert");
        Ok(outcome)
    }

    /// Reads a full record, payload included.
    pub fn get(&self, key: &DocumentKey) -> StoreResult<Option<DocumentRecord>> {
        let index = self.index.read();
        match index.get(key) {
            Some(entry) => Ok(Some(self.log.read(entry.offset)?)),
            None => Ok(None),
        }
    }

    /// Returns a record without its payload.
    #[must_use]
    pub fn header(&self, key: &DocumentKey) -> Option<DocumentRecord> {
        self.index.read().get(key).map(|e| e.header.clone())
    }

    /// Headers of every record owned by `identity`, in distribution order.
    #[must_use]
    pub fn list_by_credential(&self, identity: &TaxId) -> Vec<DocumentRecord> {
        let mut records: Vec<DocumentRecord> = self
            .index
            .read()
            .values()
            .filter(|e| &e.header.owner == identity)
            .map(|e| e.header.clone())
            .collect();
        records.sort_by(|a, b| a.nsu.cmp(&b.nsu).then_with(|| a.key.cmp(&b.key)));
        records
    }

    /// Keys of SUMMARY invoices owned by `identity`, oldest first.
    #[must_use]
    pub fn pending_complete(&self, identity: &TaxId, limit: usize) -> Vec<DocumentKey> {
        self.list_by_credential(identity)
            .into_iter()
            .filter(|r| r.kind == DocumentKind::Invoice && r.completeness == Completeness::Summary)
            .take(limit)
            .map(|r| r.key)
            .collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// True when the store holds no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrites the log keeping only the latest version of every record.
    pub(crate) fn compact(&self) -> StoreResult<()> {
        let mut index = self.index.write();
        let mut keys: Vec<DocumentKey> = index.keys().cloned().collect();
        keys.sort();
        let mut records = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(entry) = index.get(key) {
                records.push(self.log.read::<DocumentRecord>(entry.offset)?);
            }
        }
        let offsets = self.log.rewrite(&records)?;
        for (record, offset) in records.iter().zip(offsets) {
            if let Some(entry) = index.get_mut(&record.key) {
                entry.offset = offset;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfesync_storage::InMemoryBackend;
    use proptest::prelude::*;

    const KEY: &str = "35240112345678000190550010000012341000012345";

    fn store() -> DocumentStore {
        DocumentStore::open(Box::new(InMemoryBackend::new()), false).unwrap()
    }

    fn owner() -> TaxId {
        TaxId::parse("98765432000110").unwrap()
    }

    fn record(completeness: Completeness) -> DocumentRecord {
        let record = DocumentRecord {
            key: DocumentKey::parse(KEY).unwrap(),
            owner: owner(),
            kind: DocumentKind::Invoice,
            completeness,
            nsu: Some(Nsu::new(1).unwrap()),
            schema: None,
            issuer_tax_id: Some("12345678000190".into()),
            issuer_name: Some("ACME LTDA".into()),
            number: Some("1234".into()),
            issued_at: None,
            total: Some("150.00".into()),
            event_type: None,
            payload: None,
            touched_at: Utc::now(),
        };
        match completeness {
            Completeness::Complete => record.with_payload("<nfeProc/>"),
            Completeness::Summary => record,
        }
    }

    #[test]
    fn summary_then_complete_upgrades() {
        let store = store();
        assert_eq!(store.upsert(record(Completeness::Summary)).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(record(Completeness::Complete)).unwrap(), UpsertOutcome::Upgraded);
        let stored = store.get(&DocumentKey::parse(KEY).unwrap()).unwrap().unwrap();
        assert_eq!(stored.completeness, Completeness::Complete);
        assert_eq!(stored.payload.as_deref(), Some("<nfeProc/>"));
    }

    #[test]
    fn summary_never_downgrades_complete() {
        let store = store();
        store.upsert(record(Completeness::Complete)).unwrap();
        let mut late = record(Completeness::Summary);
        late.issuer_name = Some("OTHER".into());
        let outcome = store.upsert(late).unwrap();
        assert_eq!(outcome, UpsertOutcome::DowngradeRejected);
        assert!(!outcome.wrote());

        let stored = store.get(&DocumentKey::parse(KEY).unwrap()).unwrap().unwrap();
        assert_eq!(stored.completeness, Completeness::Complete);
        assert_eq!(stored.issuer_name.as_deref(), Some("ACME LTDA"));
        assert_eq!(stored.payload.as_deref(), Some("<nfeProc/>"));
    }

    #[test]
    fn reprocessing_is_a_no_op() {
        let store = store();
        store.upsert(record(Completeness::Complete)).unwrap();
        let size = store.log.size().unwrap();
        let mut again = record(Completeness::Complete);
        again.nsu = Some(Nsu::new(9).unwrap());
        assert_eq!(store.upsert(again).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.log.size().unwrap(), size);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn summary_refresh_writes_new_metadata() {
        let store = store();
        store.upsert(record(Completeness::Summary)).unwrap();
        let mut newer = record(Completeness::Summary);
        newer.total = Some("175.00".into());
        assert_eq!(store.upsert(newer).unwrap(), UpsertOutcome::Refreshed);
    }

    #[test]
    fn record_without_number_or_name_is_invalid() {
        let store = store();
        let mut noise = record(Completeness::Summary);
        noise.number = None;
        noise.issuer_name = Some("  ".into());
        assert!(matches!(store.upsert(noise).unwrap(), UpsertOutcome::Invalid(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn upgrade_keeps_summary_metadata() {
        let store = store();
        store.upsert(record(Completeness::Summary)).unwrap();
        let mut complete = record(Completeness::Complete);
        complete.total = None;
        store.upsert(complete).unwrap();
        let header = store.header(&DocumentKey::parse(KEY).unwrap()).unwrap();
        assert_eq!(header.total.as_deref(), Some("150.00"));
        assert_eq!(header.payload, None);
    }

    #[test]
    fn pending_complete_lists_summary_invoices() {
        let store = store();
        store.upsert(record(Completeness::Summary)).unwrap();
        assert_eq!(store.pending_complete(&owner(), 10).len(), 1);
        store.upsert(record(Completeness::Complete)).unwrap();
        assert!(store.pending_complete(&owner(), 10).is_empty());
    }

    #[test]
    fn compact_preserves_records() {
        let store = store();
        store.upsert(record(Completeness::Summary)).unwrap();
        store.upsert(record(Completeness::Complete)).unwrap();
        let before = store.log.size().unwrap();
        store.compact().unwrap();
        assert!(store.log.size().unwrap() < before);
        let stored = store.get(&DocumentKey::parse(KEY).unwrap()).unwrap().unwrap();
        assert_eq!(stored.completeness, Completeness::Complete);
    }

    proptest! {
        #[test]
        fn complete_is_sticky(sequence in prop::collection::vec(any::<bool>(), 1..30)) {
            let store = store();
            let mut seen_complete = false;
            for complete in &sequence {
                let completeness = if *complete { Completeness::Complete } else { Completeness::Summary };
                seen_complete |= *complete;
                store.upsert(record(completeness)).unwrap();
                let header = store.header(&DocumentKey::parse(KEY).unwrap()).unwrap();
                let expected = if seen_complete { Completeness::Complete } else { Completeness::Summary };
                prop_assert_eq!(header.completeness, expected);
            }
        }
    }
}
