//! Acknowledgment submission through an external signer.

use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::Utc;
use dfesync_protocol::{AckType, DocumentKey};
use dfesync_store::{AckEntry, Credential, Store};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the signer reported for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The service registered the acknowledgment.
    Accepted,
    /// The service already had it.
    Duplicate,
    /// Submission failed; may be retried later.
    Failed(String),
}

/// Signs and submits acknowledgment events. Supplied by the embedder.
#[async_trait]
pub trait AcknowledgmentSigner: Send + Sync {
    /// Submits `ack` for `key` on behalf of `credential`.
    async fn submit(&self, credential: &Credential, key: &DocumentKey, ack: AckType) -> AckOutcome;
}

/// Submits acknowledgments once per `(key, type)`.
pub struct Acknowledger {
    store: Arc<Store>,
    signer: Arc<dyn AcknowledgmentSigner>,
}

impl Acknowledger {
    /// Creates an acknowledger recording into `store`.
    pub fn new(store: Arc<Store>, signer: Arc<dyn AcknowledgmentSigner>) -> Self {
        Self { store, signer }
    }

    /// Submits `ack` for `key` unless the ledger already holds it.
    ///
    /// Returns `None` when nothing was submitted. Accepted and duplicate
    /// outcomes are recorded; failures are not.
    pub async fn acknowledge(
        &self,
        credential: &Credential,
        key: &DocumentKey,
        ack: AckType,
    ) -> SyncResult<Option<AckOutcome>> {
        if self.store.acks().contains(key, ack) {
            debug!(key = %key, ack = %ack, "acknowledgment already recorded");
            return Ok(None);
        }

        let outcome = self.signer.submit(credential, key, ack).await;
        match &outcome {
            AckOutcome::Accepted | AckOutcome::Duplicate => {
                self.store.acks().record(AckEntry {
                    key: key.clone(),
                    ack,
                    identity: credential.identity.clone(),
                    duplicate: outcome == AckOutcome::Duplicate,
                    recorded_at: Utc::now(),
                })?;
                info!(key = %key, ack = %ack, ?outcome, "acknowledgment registered");
            }
            AckOutcome::Failed(reason) => {
                warn!(key = %key, ack = %ack, %reason, "acknowledgment failed");
            }
        }
        Ok(Some(outcome))
    }
}

/// A signer that records submissions and answers with a fixed outcome.
pub struct RecordingSigner {
    reply: AckOutcome,
    submissions: Mutex<Vec<(DocumentKey, AckType)>>,
}

impl RecordingSigner {
    /// Creates a signer answering every submission with `reply`.
    pub fn new(reply: AckOutcome) -> Self {
        Self {
            reply,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Submissions seen so far.
    pub fn submissions(&self) -> Vec<(DocumentKey, AckType)> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl AcknowledgmentSigner for RecordingSigner {
    async fn submit(&self, _credential: &Credential, key: &DocumentKey, ack: AckType) -> AckOutcome {
        self.submissions.lock().push((key.clone(), ack));
        self.reply.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfesync_testkit::{credential, nfe_key, RECIPIENT_CNPJ};

    fn key() -> DocumentKey {
        DocumentKey::parse(&nfe_key(77)).unwrap()
    }

    #[tokio::test]
    async fn accepted_ack_is_not_resubmitted() {
        let store = Arc::new(Store::in_memory().unwrap());
        let signer = Arc::new(RecordingSigner::new(AckOutcome::Accepted));
        let acknowledger = Acknowledger::new(Arc::clone(&store), signer.clone());
        let credential = credential(RECIPIENT_CNPJ);

        let first = acknowledger
            .acknowledge(&credential, &key(), AckType::Awareness)
            .await
            .unwrap();
        assert_eq!(first, Some(AckOutcome::Accepted));

        let second = acknowledger
            .acknowledge(&credential, &key(), AckType::Awareness)
            .await
            .unwrap();
        assert_eq!(second, None);
        assert_eq!(signer.submissions().len(), 1);
        assert!(store.acks().contains(&key(), AckType::Awareness));
    }

    #[tokio::test]
    async fn duplicate_is_recorded_as_such() {
        let store = Arc::new(Store::in_memory().unwrap());
        let signer = Arc::new(RecordingSigner::new(AckOutcome::Duplicate));
        let acknowledger = Acknowledger::new(Arc::clone(&store), signer);
        let credential = credential(RECIPIENT_CNPJ);

        acknowledger
            .acknowledge(&credential, &key(), AckType::Confirmation)
            .await
            .unwrap();
        let entries = store.acks().list_by_credential(&credential.identity);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].duplicate);
    }

    #[tokio::test]
    async fn failure_is_retried_next_time() {
        let store = Arc::new(Store::in_memory().unwrap());
        let signer = Arc::new(RecordingSigner::new(AckOutcome::Failed("503".into())));
        let acknowledger = Acknowledger::new(Arc::clone(&store), signer.clone());
        let credential = credential(RECIPIENT_CNPJ);

        for _ in 0..2 {
            let outcome = acknowledger
                .acknowledge(&credential, &key(), AckType::Awareness)
                .await
                .unwrap();
            assert!(matches!(outcome, Some(AckOutcome::Failed(_))));
        }
        assert_eq!(signer.submissions().len(), 2);
        assert!(!store.acks().contains(&key(), AckType::Awareness));
    }
}
