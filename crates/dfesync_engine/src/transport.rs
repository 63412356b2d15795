//! Transport layer abstraction for distribution requests.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use dfesync_protocol::{DistributionRequest, TaxId};
use dfesync_store::Credential;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Raw HTTP answer of the distribution service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// A `200 OK` response with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// A response with an arbitrary status.
    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// An authenticated channel to the distribution service, bound to one
/// credential.
///
/// Reusable for sequential requests. The poller never issues two requests
/// on one session concurrently.
#[async_trait]
pub trait DistributionTransport: Send + Sync {
    /// Sends one distribution request.
    ///
    /// Returns the raw response for every HTTP status; errors are reserved
    /// for failures below the application layer.
    async fn distribute(&self, request: &DistributionRequest) -> SyncResult<RawResponse>;
}

/// Builds sessions for credentials.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a session presenting the credential's certificate.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Credential`] when the certificate file is
    /// missing, unreadable, or its passphrase is rejected.
    async fn open(&self, credential: &Credential) -> SyncResult<Box<dyn DistributionTransport>>;
}

/// A scripted reply of [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this response.
    Respond(RawResponse),
    /// Fail with a retryable transport error.
    TransportFailure(String),
    /// Never answer; the poller's timeout fires.
    Hang,
}

#[derive(Default)]
struct MockState {
    queues: HashMap<String, VecDeque<MockReply>>,
    fallbacks: HashMap<String, MockReply>,
    requests: Vec<DistributionRequest>,
}

/// A scripted transport for testing.
///
/// Replies are queued per identity; when a queue runs dry the identity's
/// fallback is used, and without one the request fails with a
/// non-retryable transport error. Clones share state.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    latency: Option<Duration>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every reply by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a reply for `identity`.
    pub fn push(&self, identity: &TaxId, reply: MockReply) {
        self.state
            .lock()
            .queues
            .entry(identity.digits().to_string())
            .or_default()
            .push_back(reply);
    }

    /// Queues a `200 OK` response with `body`.
    pub fn push_body(&self, identity: &TaxId, body: impl Into<Vec<u8>>) {
        self.push(identity, MockReply::Respond(RawResponse::ok(body)));
    }

    /// Sets the reply used once the queue of `identity` is empty.
    pub fn set_fallback(&self, identity: &TaxId, reply: MockReply) {
        self.state
            .lock()
            .fallbacks
            .insert(identity.digits().to_string(), reply);
    }

    /// All requests seen so far, in order.
    pub fn requests(&self) -> Vec<DistributionRequest> {
        self.state.lock().requests.clone()
    }

    /// Number of requests sent for `identity`.
    pub fn request_count(&self, identity: &TaxId) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| &r.tax_id == identity)
            .count()
    }

    /// Number of replies still queued for `identity`.
    pub fn pending(&self, identity: &TaxId) -> usize {
        self.state
            .lock()
            .queues
            .get(identity.digits())
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl DistributionTransport for MockTransport {
    async fn distribute(&self, request: &DistributionRequest) -> SyncResult<RawResponse> {
        let reply = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            let key = request.tax_id.digits();
            let queued = state.queues.get_mut(key).and_then(VecDeque::pop_front);
            queued.or_else(|| state.fallbacks.get(key).cloned())
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::TransportFailure(message)) => Err(SyncError::transport_retryable(message)),
            Some(MockReply::Hang) => {
                std::future::pending::<()>().await;
                Err(SyncError::Timeout)
            }
            None => Err(SyncError::transport_fatal(format!(
                "no scripted reply for {}",
                request.tax_id
            ))),
        }
    }
}

/// A session factory handing out a shared [`MockTransport`].
#[derive(Clone, Default)]
pub struct MockSessionFactory {
    transport: MockTransport,
    opens: Arc<AtomicUsize>,
    broken: Arc<Mutex<HashSet<String>>>,
}

impl MockSessionFactory {
    /// Creates a factory whose sessions all use `transport`.
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            opens: Arc::new(AtomicUsize::new(0)),
            broken: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Makes every open for `identity` fail with a credential error.
    pub fn break_credential(&self, identity: &TaxId) {
        self.broken.lock().insert(identity.digits().to_string());
    }

    /// Undoes [`break_credential`](Self::break_credential).
    pub fn restore_credential(&self, identity: &TaxId) {
        self.broken.lock().remove(identity.digits());
    }

    /// Number of sessions opened so far, failed attempts included.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// The shared transport.
    pub fn transport(&self) -> &MockTransport {
        &self.transport
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(&self, credential: &Credential) -> SyncResult<Box<dyn DistributionTransport>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.broken.lock().contains(credential.identity.digits()) {
            return Err(SyncError::credential(
                &credential.identity,
                "passphrase rejected",
            ));
        }
        Ok(Box::new(self.transport.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfesync_protocol::{Environment, Nsu, RegionCode};

    fn request(identity: &TaxId) -> DistributionRequest {
        DistributionRequest::since(
            Environment::Homologation,
            RegionCode::new(35).unwrap(),
            identity.clone(),
            Nsu::ZERO,
        )
    }

    #[tokio::test]
    async fn mock_replies_in_order_then_fallback() {
        let identity = TaxId::parse("12345678000190").unwrap();
        let transport = MockTransport::new();
        transport.push_body(&identity, "first");
        transport.set_fallback(&identity, MockReply::Respond(RawResponse::with_status(429, "")));

        let first = transport.distribute(&request(&identity)).await.unwrap();
        assert_eq!(first.body, b"first");
        let second = transport.distribute(&request(&identity)).await.unwrap();
        assert_eq!(second.status, 429);
        assert_eq!(transport.request_count(&identity), 2);
    }

    #[tokio::test]
    async fn mock_without_script_fails() {
        let identity = TaxId::parse("12345678000190").unwrap();
        let transport = MockTransport::new();
        let err = transport.distribute(&request(&identity)).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn factory_counts_opens_and_breaks_credentials() {
        let factory = MockSessionFactory::new(MockTransport::new());
        let identity = TaxId::parse("12345678000190").unwrap();
        let credential = Credential::new(
            identity.clone(),
            "/nonexistent.pfx",
            dfesync_store::Passphrase::new("x"),
            RegionCode::new(35).unwrap(),
        );

        assert!(factory.open(&credential).await.is_ok());
        factory.break_credential(&identity);
        assert!(matches!(
            factory.open(&credential).await,
            Err(SyncError::Credential { .. })
        ));
        factory.restore_credential(&identity);
        assert!(factory.open(&credential).await.is_ok());
        assert_eq!(factory.open_count(), 3);
    }
}
