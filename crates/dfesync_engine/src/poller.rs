//! Distribution poller: one polling cycle for one credential.
//!
//! A cycle moves IDLE → REQUESTING → one of SUCCESS, EMPTY, THROTTLED,
//! REJECTED or TRANSPORT_ERROR, and back to IDLE. Only SUCCESS writes
//! documents and moves the cursor; only EMPTY declares a cooldown.
//!
//! Within a batch every document is persisted before the cursor advances,
//! and nothing between the first upsert and the cursor write awaits.

use crate::ack::Acknowledger;
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{DistributionTransport, SessionFactory};
use chrono::{DateTime, Utc};
use dfesync_protocol::{
    extract, parse_document, Completeness, DistributionRequest, DocumentKey, DocumentKind,
    ExtractedDocument, Nsu, PollResult, ResponseStatus, ServiceKind,
};
use dfesync_store::{Credential, DocumentRecord, Store, UpsertOutcome};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Terminal state of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// At least one batch was persisted.
    Success {
        /// Batches persisted in this cycle.
        batches: u32,
        /// Upserts that wrote something.
        stored: usize,
        /// Entries skipped as undecodable or invalid.
        skipped: usize,
        /// Cursor after the cycle.
        cursor: Nsu,
    },
    /// The service had nothing new; a cooldown was declared.
    Empty {
        /// Cursor the cooldown was declared at.
        cursor: Nsu,
    },
    /// The service asked us to slow down.
    Throttled {
        /// Status code reported by the service.
        code: String,
        /// Message reported by the service.
        message: String,
    },
    /// The service rejected the request, or the response was unreadable.
    Rejected {
        /// Reason code.
        code: String,
        /// Reason message.
        message: String,
    },
    /// Network/TLS failure or timeout, after the immediate retry.
    TransportError {
        /// Error message.
        message: String,
    },
    /// Skipped without a request: a cooldown still blocks the credential.
    CoolingDown {
        /// Time left in the window.
        remaining: Duration,
    },
}

impl Outcome {
    /// Short upper-case name, as logged.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "SUCCESS",
            Outcome::Empty { .. } => "EMPTY",
            Outcome::Throttled { .. } => "THROTTLED",
            Outcome::Rejected { .. } => "REJECTED",
            Outcome::TransportError { .. } => "TRANSPORT_ERROR",
            Outcome::CoolingDown { .. } => "COOLING_DOWN",
        }
    }

    /// The error condition this outcome stands for, if it is one.
    #[must_use]
    pub fn error(&self) -> Option<SyncError> {
        match self {
            Outcome::Rejected { code, message } => Some(SyncError::DistributionRejected {
                code: code.clone(),
                message: message.clone(),
            }),
            Outcome::TransportError { message } => {
                Some(SyncError::transport_retryable(message.clone()))
            }
            _ => None,
        }
    }

    /// True when the orchestrator should back off instead of waiting a full interval.
    #[must_use]
    pub fn needs_backoff(&self) -> bool {
        matches!(self, Outcome::Throttled { .. } | Outcome::TransportError { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success {
                batches,
                stored,
                skipped,
                cursor,
            } => write!(
                f,
                "SUCCESS: {batches} batch(es), {stored} stored, {skipped} skipped, cursor {cursor}"
            ),
            Outcome::Empty { cursor } => write!(f, "EMPTY at cursor {cursor}"),
            Outcome::Throttled { code, message } => write!(f, "THROTTLED ({code}): {message}"),
            Outcome::Rejected { code, message } => write!(f, "REJECTED ({code}): {message}"),
            Outcome::TransportError { message } => write!(f, "TRANSPORT_ERROR: {message}"),
            Outcome::CoolingDown { remaining } => {
                write!(f, "COOLING_DOWN for {}s", remaining.as_secs())
            }
        }
    }
}

/// Wall clock driven by the tokio clock, so paused-time tests move both.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall: DateTime<Utc>,
    origin: Instant,
}

impl Clock {
    /// Starts at the current time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Starts at `wall`.
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            origin: Instant::now(),
        }
    }

    /// Current wall time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of fetching summarized documents by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Keys requested.
    pub requested: usize,
    /// Records upgraded to COMPLETE.
    pub upgraded: usize,
    /// Keys the service did not release yet.
    pub unavailable: usize,
    /// Keys whose request failed.
    pub failed: usize,
}

#[derive(Default)]
struct BatchTally {
    stored: usize,
    skipped: usize,
    new_summaries: Vec<DocumentKey>,
}

/// Runs polling cycles. Cheap to clone.
#[derive(Clone)]
pub struct Poller {
    store: Arc<Store>,
    sessions: Arc<dyn SessionFactory>,
    config: EngineConfig,
    acknowledger: Option<Arc<Acknowledger>>,
    shutdown: Option<watch::Receiver<bool>>,
    clock: Clock,
}

impl Poller {
    /// Creates a poller over `store`, opening sessions with `sessions`.
    pub fn new(store: Arc<Store>, sessions: Arc<dyn SessionFactory>, config: EngineConfig) -> Self {
        Self {
            store,
            sessions,
            config,
            acknowledger: None,
            shutdown: None,
            clock: Clock::new(),
        }
    }

    /// Submits `config.auto_acknowledge` through `acknowledger`.
    #[must_use]
    pub fn with_acknowledger(mut self, acknowledger: Arc<Acknowledger>) -> Self {
        self.acknowledger = Some(acknowledger);
        self
    }

    /// Stops draining once `shutdown` turns true.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Uses `clock` for cooldowns and timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The clock in use.
    pub fn clock(&self) -> Clock {
        self.clock
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Runs one cycle: consults the cooldown, opens a session and polls.
    ///
    /// # Errors
    ///
    /// Only unusable credentials and store failures are errors; service and
    /// network conditions are reported as an [`Outcome`].
    pub async fn cycle(&self, credential: &Credential) -> SyncResult<Outcome> {
        let identity = &credential.identity;
        let cursor = self.store.cursors().current(identity);
        if let Some(remaining) = self.store.cooldowns().blocked_for(
            identity,
            self.clock.now(),
            self.config.cooldown_window,
            cursor,
        ) {
            debug!(cursor = %cursor, remaining_secs = remaining.as_secs(), "cooldown active, skipping");
            return Ok(Outcome::CoolingDown { remaining });
        }

        let session = self.sessions.open(credential).await?;
        self.poll(credential, session.as_ref()).await
    }

    /// Polls over an open session, draining while the service reports more.
    pub async fn poll(
        &self,
        credential: &Credential,
        session: &dyn DistributionTransport,
    ) -> SyncResult<Outcome> {
        let identity = &credential.identity;
        let mut batches = 0u32;
        let mut stored = 0usize;
        let mut skipped = 0usize;

        loop {
            let cursor = self.store.cursors().current(identity);
            let request = DistributionRequest::since(
                self.config.environment,
                credential.region,
                identity.clone(),
                cursor,
            );
            debug!(cursor = %cursor, "requesting distribution batch");

            let outcome = match self.exchange(credential.service, session, &request).await {
                Err(error) => Outcome::TransportError {
                    message: error.to_string(),
                },
                Ok(result) => match result.status {
                    ResponseStatus::Batch if result.entry_count > 0 => {
                        let tally = self.persist_batch(credential, &result)?;
                        stored += tally.stored;
                        skipped += tally.skipped;
                        batches += 1;
                        self.auto_acknowledge(credential, &tally.new_summaries).await;

                        // a batch that leaves the cursor in place would be served again
                        let advanced = self.store.cursors().current(identity) > cursor;
                        let more = result.has_more() && advanced;
                        if more && batches < self.config.drain_limit && !self.shutting_down() {
                            continue;
                        }
                        if more {
                            debug!(batches, "drain stopped with more documents available");
                        } else if !advanced {
                            debug!(cursor = %cursor, "batch did not move the cursor, drain stopped");
                        }
                        break;
                    }
                    ResponseStatus::Batch | ResponseStatus::Empty => {
                        if batches == 0 {
                            self.store
                                .cooldowns()
                                .declare(identity, self.clock.now(), cursor)?;
                        }
                        Outcome::Empty { cursor }
                    }
                    ResponseStatus::Throttled => Outcome::Throttled {
                        code: result.code,
                        message: result.message,
                    },
                    ResponseStatus::Rejected => Outcome::Rejected {
                        code: result.code,
                        message: result.message,
                    },
                    ResponseStatus::Unparseable => Outcome::Rejected {
                        code: format!("HTTP {}", result.http_status),
                        message: "unparseable response".into(),
                    },
                },
            };

            if batches == 0 {
                info!(outcome = outcome.name(), cursor = %cursor, "{outcome}");
                return Ok(outcome);
            }
            if !matches!(outcome, Outcome::Empty { .. }) {
                warn!(outcome = outcome.name(), "drain interrupted: {outcome}");
            }
            break;
        }

        let outcome = Outcome::Success {
            batches,
            stored,
            skipped,
            cursor: self.store.cursors().current(identity),
        };
        info!(outcome = outcome.name(), "{outcome}");
        Ok(outcome)
    }

    /// Persists every document of a batch, then advances the cursor and
    /// clears the cooldown.
    fn persist_batch(&self, credential: &Credential, result: &PollResult) -> SyncResult<BatchTally> {
        let identity = &credential.identity;
        let mut tally = BatchTally {
            skipped: result.failures.len(),
            ..BatchTally::default()
        };

        for document in &result.documents {
            match self.store_document(credential, document) {
                Ok((key, outcome)) => {
                    if let UpsertOutcome::Invalid(reason) = &outcome {
                        warn!(nsu = %document.nsu, key = %key, %reason, "skipping invalid document");
                        tally.skipped += 1;
                        continue;
                    }
                    if outcome.wrote() {
                        tally.stored += 1;
                    }
                    if outcome == UpsertOutcome::Inserted {
                        tally.new_summaries.push(key);
                    }
                }
                Err(SyncError::Decode(reason)) => {
                    warn!(nsu = %document.nsu, %reason, "skipping undecodable document");
                    tally.skipped += 1;
                }
                Err(other) => return Err(other),
            }
        }

        // The service's ultNSU covers entries it chose not to return;
        // without it only decoded entries count.
        if let Some(target) = result.last_nsu.or_else(|| result.highest_consumed()) {
            let cursor = self.store.cursors().advance(identity, target)?;
            debug!(cursor = %cursor, "batch committed");
        }
        self.store.cooldowns().clear(identity)?;

        tally.new_summaries.retain(|key| {
            self.store.documents().header(key).is_some_and(|r| {
                r.kind == DocumentKind::Invoice && r.completeness == Completeness::Summary
            })
        });
        Ok(tally)
    }

    fn store_document(
        &self,
        credential: &Credential,
        document: &ExtractedDocument,
    ) -> SyncResult<(DocumentKey, UpsertOutcome)> {
        let meta = parse_document(&document.payload, document.key_hint.as_deref())
            .map_err(|e| SyncError::Decode(format!("NSU {}: {e}", document.nsu)))?;
        let completeness = meta.completeness;
        let key = meta.key.clone();

        let mut record = DocumentRecord::from_meta(meta, credential.identity.clone(), self.clock.now())
            .with_source(Some(document.nsu), document.schema.clone());
        if completeness == Completeness::Complete {
            let text = std::str::from_utf8(&document.payload)
                .map_err(|e| SyncError::Decode(format!("NSU {}: {e}", document.nsu)))?;
            record = record.with_payload(text);
        }

        let outcome = self.store.documents().upsert(record)?;
        debug!(nsu = %document.nsu, key = %key, %completeness, outcome = %outcome, "document processed");
        Ok((key, outcome))
    }

    async fn auto_acknowledge(&self, credential: &Credential, keys: &[DocumentKey]) {
        let (Some(ack), Some(acknowledger)) = (self.config.auto_acknowledge, &self.acknowledger)
        else {
            return;
        };
        for key in keys {
            if let Err(error) = acknowledger.acknowledge(credential, key, ack).await {
                warn!(key = %key, %error, "could not record acknowledgment");
            }
        }
    }

    /// Sends a request with a bounded timeout, retrying once on a retryable
    /// failure, and extracts the response.
    async fn exchange(
        &self,
        service: ServiceKind,
        session: &dyn DistributionTransport,
        request: &DistributionRequest,
    ) -> SyncResult<PollResult> {
        match self.attempt(service, session, request).await {
            Err(error) if error.is_retryable() => {
                warn!(%error, "transport failure, retrying once");
                if !self.config.transport_retry_delay.is_zero() {
                    tokio::time::sleep(self.config.transport_retry_delay).await;
                }
                self.attempt(service, session, request).await
            }
            other => other,
        }
    }

    async fn attempt(
        &self,
        service: ServiceKind,
        session: &dyn DistributionTransport,
        request: &DistributionRequest,
    ) -> SyncResult<PollResult> {
        let response =
            match tokio::time::timeout(self.config.request_timeout, session.distribute(request))
                .await
            {
                Ok(response) => response?,
                Err(_) => return Err(SyncError::Timeout),
            };

        let result = extract(service, response.status, &response.body);
        if result.status == ResponseStatus::Unparseable && response.status >= 500 {
            return Err(SyncError::transport_retryable(format!(
                "HTTP {} with unreadable body",
                response.status
            )));
        }
        Ok(result)
    }

    /// Fetches one document by key and upserts it. Never moves the cursor.
    ///
    /// Returns `None` when the service has nothing for the key.
    ///
    /// # Errors
    ///
    /// Fails for NFS-e credentials, on service rejections and throttling,
    /// and on transport failures after the immediate retry.
    pub async fn fetch_by_key(
        &self,
        credential: &Credential,
        key: &DocumentKey,
    ) -> SyncResult<Option<UpsertOutcome>> {
        self.ensure_key_fetch(credential)?;
        let session = self.sessions.open(credential).await?;
        self.fetch_with(credential, session.as_ref(), key).await
    }

    /// Fetches up to `limit` SUMMARY invoices of `credential` by key.
    pub async fn fetch_pending_complete(
        &self,
        credential: &Credential,
        limit: usize,
    ) -> SyncResult<FetchReport> {
        self.ensure_key_fetch(credential)?;
        let keys = self
            .store
            .documents()
            .pending_complete(&credential.identity, limit);
        let mut report = FetchReport {
            requested: keys.len(),
            ..FetchReport::default()
        };
        if keys.is_empty() {
            return Ok(report);
        }

        let session = self.sessions.open(credential).await?;
        for key in &keys {
            if self.shutting_down() {
                break;
            }
            match self.fetch_with(credential, session.as_ref(), key).await {
                Ok(Some(UpsertOutcome::Upgraded)) => report.upgraded += 1,
                Ok(_) => report.unavailable += 1,
                Err(error @ SyncError::Throttled { .. }) => {
                    warn!(key = %key, %error, "fetch throttled, stopping");
                    report.failed += 1;
                    break;
                }
                Err(SyncError::Store(error)) => return Err(SyncError::Store(error)),
                Err(error) => {
                    warn!(key = %key, %error, "fetch by key failed");
                    report.failed += 1;
                }
            }
        }
        info!(
            requested = report.requested,
            upgraded = report.upgraded,
            unavailable = report.unavailable,
            failed = report.failed,
            "fetch by key finished"
        );
        Ok(report)
    }

    fn ensure_key_fetch(&self, credential: &Credential) -> SyncResult<()> {
        match credential.service {
            ServiceKind::Nfe => Ok(()),
            ServiceKind::NfseNational => Err(SyncError::Unsupported(
                "the national NFS-e service has no fetch by key".into(),
            )),
        }
    }

    async fn fetch_with(
        &self,
        credential: &Credential,
        session: &dyn DistributionTransport,
        key: &DocumentKey,
    ) -> SyncResult<Option<UpsertOutcome>> {
        let request = DistributionRequest::by_key(
            self.config.environment,
            credential.region,
            credential.identity.clone(),
            key.clone(),
        );
        let result = self.exchange(credential.service, session, &request).await?;

        match result.status {
            ResponseStatus::Batch => {
                let mut found = None;
                for document in &result.documents {
                    match self.store_document(credential, document) {
                        Ok((stored_key, outcome)) if &stored_key == key => found = Some(outcome),
                        Ok(_) => {}
                        Err(SyncError::Decode(reason)) => {
                            warn!(key = %key, %reason, "skipping undecodable document");
                        }
                        Err(other) => return Err(other),
                    }
                }
                Ok(found)
            }
            ResponseStatus::Empty => Ok(None),
            ResponseStatus::Throttled => Err(SyncError::Throttled {
                code: result.code,
                message: result.message,
            }),
            ResponseStatus::Rejected => Err(SyncError::DistributionRejected {
                code: result.code,
                message: result.message,
            }),
            ResponseStatus::Unparseable => Err(SyncError::Decode(format!(
                "unparseable response (HTTP {})",
                result.http_status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockReply, MockSessionFactory, MockTransport, RawResponse};
    use dfesync_testkit::prelude::*;

    fn setup(config: EngineConfig) -> (Arc<Store>, MockSessionFactory, Poller, Credential) {
        let store = Arc::new(Store::in_memory().unwrap());
        let credential = register(&store, RECIPIENT_CNPJ);
        let factory = MockSessionFactory::new(MockTransport::new());
        let poller = Poller::new(Arc::clone(&store), Arc::new(factory.clone()), config);
        (store, factory, poller, credential)
    }

    #[tokio::test]
    async fn success_persists_and_advances() {
        let (store, factory, poller, credential) = setup(EngineConfig::default());
        let body = NfeResponse::batch(2, 2)
            .entry(1, "resNFe_v1.01", &res_nfe(&nfe_key(1), "ACME"))
            .entry(2, "procNFe_v4.00", &nfe_proc(&nfe_key(2), "ACME"))
            .build();
        factory.transport().push_body(&credential.identity, body);

        let outcome = poller.cycle(&credential).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Success {
                batches: 1,
                stored: 2,
                skipped: 0,
                cursor: nsu(2)
            }
        );
        assert_eq!(store.cursors().current(&credential.identity), nsu(2));
        assert_eq!(store.documents().len(), 2);
    }

    #[tokio::test]
    async fn empty_declares_cooldown_and_blocks_next_cycle() {
        let (store, factory, poller, credential) = setup(EngineConfig::default());
        factory
            .transport()
            .push_body(&credential.identity, NfeResponse::empty(0).build());

        assert_eq!(
            poller.cycle(&credential).await.unwrap(),
            Outcome::Empty { cursor: Nsu::ZERO }
        );
        assert!(store.cooldowns().get(&credential.identity).is_some());

        let second = poller.cycle(&credential).await.unwrap();
        assert!(matches!(second, Outcome::CoolingDown { .. }));
        assert_eq!(factory.open_count(), 1);
    }

    #[tokio::test]
    async fn throttled_leaves_state_untouched() {
        let (store, factory, poller, credential) = setup(EngineConfig::default());
        store.cursors().reset(&credential.identity, nsu(5)).unwrap();
        factory.transport().push_body(
            &credential.identity,
            NfeResponse::status("656", "Consumo indevido").build(),
        );

        let outcome = poller.cycle(&credential).await.unwrap();
        assert!(matches!(outcome, Outcome::Throttled { ref code, .. } if code == "656"));
        assert!(outcome.needs_backoff());
        assert_eq!(store.cursors().current(&credential.identity), nsu(5));
        assert!(store.cooldowns().get(&credential.identity).is_none());
    }

    #[tokio::test]
    async fn rejected_surfaces_reason() {
        let (_store, factory, poller, credential) = setup(EngineConfig::default());
        factory.transport().push_body(
            &credential.identity,
            NfeResponse::status("593", "CNPJ-Base consultado difere").build(),
        );

        let outcome = poller.cycle(&credential).await.unwrap();
        match outcome.error() {
            Some(SyncError::DistributionRejected { code, message }) => {
                assert_eq!(code, "593");
                assert!(message.contains("difere"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_is_retried_once() {
        let (store, factory, poller, credential) = setup(EngineConfig::default());
        let transport = factory.transport();
        transport.push(&credential.identity, MockReply::TransportFailure("reset".into()));
        transport.push_body(
            &credential.identity,
            NfeResponse::batch(1, 1)
                .entry(1, "resNFe_v1.01", &res_nfe(&nfe_key(1), "ACME"))
                .build(),
        );

        let outcome = poller.cycle(&credential).await.unwrap();
        assert!(matches!(outcome, Outcome::Success { .. }));
        assert_eq!(transport.request_count(&credential.identity), 2);
        assert_eq!(store.cursors().current(&credential.identity), nsu(1));
    }

    #[tokio::test]
    async fn second_transport_failure_is_reported() {
        let (store, factory, poller, credential) = setup(EngineConfig::default());
        let transport = factory.transport();
        transport.set_fallback(&credential.identity, MockReply::TransportFailure("down".into()));

        let outcome = poller.cycle(&credential).await.unwrap();
        assert!(matches!(outcome, Outcome::TransportError { .. }));
        assert_eq!(transport.request_count(&credential.identity), 2);
        assert!(store.cooldowns().get(&credential.identity).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_request_times_out() {
        let config = EngineConfig::default().with_request_timeout(Duration::from_secs(5));
        let (_store, factory, poller, credential) = setup(config);
        factory
            .transport()
            .set_fallback(&credential.identity, MockReply::Hang);

        let outcome = poller.cycle(&credential).await.unwrap();
        match outcome {
            Outcome::TransportError { message } => assert!(message.contains("timed out")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_with_garbage_is_transport_error() {
        let (_store, factory, poller, credential) = setup(EngineConfig::default());
        factory.transport().set_fallback(
            &credential.identity,
            MockReply::Respond(RawResponse::with_status(503, "Service Unavailable")),
        );

        let outcome = poller.cycle(&credential).await.unwrap();
        assert!(matches!(outcome, Outcome::TransportError { .. }));
    }

    #[tokio::test]
    async fn drains_while_more_is_available() {
        let config = EngineConfig::default().with_drain_limit(2);
        let (store, factory, poller, credential) = setup(config);
        let transport = factory.transport();
        for n in 1..=3u64 {
            transport.push_body(
                &credential.identity,
                NfeResponse::batch(n, 3)
                    .entry(n, "resNFe_v1.01", &res_nfe(&nfe_key(n as u32), "ACME"))
                    .build(),
            );
        }

        let outcome = poller.cycle(&credential).await.unwrap();
        assert!(matches!(outcome, Outcome::Success { batches: 2, .. }));
        assert_eq!(store.cursors().current(&credential.identity), nsu(2));
        assert_eq!(transport.pending(&credential.identity), 1);
    }

    #[tokio::test]
    async fn nfse_batch_replaying_cursor_stops_draining() {
        let (store, factory, poller, credential) = setup(EngineConfig::default());
        let credential = credential.with_service(ServiceKind::NfseNational);
        store.cursors().reset(&credential.identity, nsu(5)).unwrap();

        let key = nfse_key(5);
        let transport = factory.transport();
        transport.set_fallback(
            &credential.identity,
            MockReply::Respond(RawResponse::ok(
                NfseResponse::batch()
                    .entry(5, &key, "NFSE", &nfse(&key, "ACME LTDA"))
                    .build(),
            )),
        );

        let outcome = poller.cycle(&credential).await.unwrap();
        assert!(matches!(outcome, Outcome::Success { batches: 1, .. }));
        assert_eq!(transport.request_count(&credential.identity), 1);
        assert_eq!(store.cursors().current(&credential.identity), nsu(5));
    }

    #[tokio::test]
    async fn auto_acknowledges_new_summaries() {
        use crate::ack::{AckOutcome, RecordingSigner};
        use dfesync_protocol::AckType;

        let config = EngineConfig::default().with_auto_acknowledge(Some(AckType::Awareness));
        let (store, factory, poller, credential) = setup(config);
        let signer = Arc::new(RecordingSigner::new(AckOutcome::Accepted));
        let poller = poller.with_acknowledger(Arc::new(Acknowledger::new(
            Arc::clone(&store),
            signer.clone(),
        )));
        factory.transport().push_body(
            &credential.identity,
            NfeResponse::batch(2, 2)
                .entry(1, "resNFe_v1.01", &res_nfe(&nfe_key(1), "ACME"))
                .entry(2, "procNFe_v4.00", &nfe_proc(&nfe_key(2), "ACME"))
                .build(),
        );

        poller.cycle(&credential).await.unwrap();
        let submissions = signer.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0.as_str(), nfe_key(1));
        assert_eq!(submissions[0].1, AckType::Awareness);
    }

    #[tokio::test]
    async fn fetch_by_key_upgrades_without_moving_cursor() {
        let (store, factory, poller, credential) = setup(EngineConfig::default());
        let key = nfe_key(9);
        let transport = factory.transport();
        transport.push_body(
            &credential.identity,
            NfeResponse::batch(4, 4)
                .entry(4, "resNFe_v1.01", &res_nfe(&key, "ACME"))
                .build(),
        );
        poller.cycle(&credential).await.unwrap();

        transport.push_body(
            &credential.identity,
            NfeResponse::batch(0, 4)
                .without_max()
                .entry(900, "procNFe_v4.00", &nfe_proc(&key, "ACME"))
                .build(),
        );
        let key = DocumentKey::parse(&key).unwrap();
        let outcome = poller.fetch_by_key(&credential, &key).await.unwrap();
        assert_eq!(outcome, Some(UpsertOutcome::Upgraded));
        assert_eq!(store.cursors().current(&credential.identity), nsu(4));
        let record = store.documents().get(&key).unwrap().unwrap();
        assert_eq!(record.completeness, Completeness::Complete);
    }

    #[tokio::test]
    async fn nfse_has_no_fetch_by_key() {
        let (_store, _factory, poller, credential) = setup(EngineConfig::default());
        let credential = credential.with_service(ServiceKind::NfseNational);
        let key = DocumentKey::parse(&nfse_key(1)).unwrap();
        assert!(matches!(
            poller.fetch_by_key(&credential, &key).await,
            Err(SyncError::Unsupported(_))
        ));
    }
}
