//! Sync orchestrator: one independent worker per credential.

use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::poller::{FetchReport, Outcome, Poller};
use crate::status::{CredentialStatus, StatusBoard};
use crate::transport::SessionFactory;
use dfesync_protocol::TaxId;
use dfesync_store::Store;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

/// Serializes cycles per identity.
#[derive(Default)]
struct CycleLocks {
    locks: Mutex<HashMap<TaxId, Arc<tokio::sync::Mutex<()>>>>,
}

impl CycleLocks {
    fn for_identity(&self, identity: &TaxId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.lock().entry(identity.clone()).or_default())
    }
}

struct Shared {
    store: Arc<Store>,
    poller: Poller,
    status: StatusBoard,
    locks: CycleLocks,
}

impl Shared {
    async fn cycle(&self, identity: &TaxId) -> SyncResult<Outcome> {
        let lock = self.locks.for_identity(identity);
        let _guard = lock.lock().await;

        // re-read under the lock: the credential may have been removed
        let credential = self
            .store
            .credentials()
            .get(identity)
            .ok_or_else(|| SyncError::UnknownCredential(identity.to_string()))?;

        let result = self.poller.cycle(&credential).await;
        let now = self.poller.clock().now();
        match &result {
            Ok(outcome) => {
                let cursor = self.store.cursors().current(identity);
                self.status.record(identity, outcome, cursor, now);
            }
            Err(error) => self.status.record_failure(identity, error, now),
        }
        result
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

struct Worker {
    identity: TaxId,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
    running: Arc<Mutex<HashSet<TaxId>>>,
}

impl Worker {
    async fn run(mut self) {
        info!("worker started");
        let config = self.shared.poller.config().clone();
        let mut failures = 0u32;
        let mut parked = false;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let result = self.shared.cycle(&self.identity).await;
            if parked && result.is_ok() {
                info!("credential usable again, worker resumed");
                parked = false;
            }

            let delay = match result {
                Ok(outcome) if outcome.needs_backoff() => {
                    failures = failures.saturating_add(1);
                    config.backoff.delay_for_attempt(failures)
                }
                Ok(Outcome::CoolingDown { remaining }) => {
                    failures = 0;
                    remaining
                }
                Ok(_) => {
                    failures = 0;
                    config.cycle_interval
                }
                Err(SyncError::UnknownCredential(_)) => {
                    info!("credential removed, worker exiting");
                    self.shared.status.forget(&self.identity);
                    break;
                }
                Err(error @ SyncError::Credential { .. }) => {
                    if parked {
                        debug!(%error, "credential still unusable");
                    } else {
                        error!(%error, "credential unusable, worker parked until corrected");
                        parked = true;
                    }
                    failures = 0;
                    config.cycle_interval
                }
                Err(error) => {
                    error!(%error, "cycle failed");
                    config.cycle_interval
                }
            };

            debug!(delay_secs = delay.as_secs(), "waiting for next cycle");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = wait_for_shutdown(&mut self.shutdown) => break,
            }
        }

        self.running.lock().remove(&self.identity);
        info!("worker stopped");
    }
}

/// Runs one polling loop per registered credential.
///
/// Loops are independent: a rejection, outage or broken certificate on one
/// credential never delays another. Cycles for one credential are strictly
/// sequential, whether started by its worker or by [`SyncEngine::poll_once`].
///
/// A worker whose certificate cannot be used is parked: it only re-reads the
/// credential once per cycle interval and resumes polling when the
/// certificate opens again. Removing the credential ends the worker.
///
/// # Example
///
/// ```rust,ignore
/// let engine = SyncEngine::new(store, Arc::new(HttpSessionFactory::new(endpoints, timeout)), config);
/// engine.start();
/// tokio::signal::ctrl_c().await?;
/// engine.shutdown().await;
/// ```
pub struct SyncEngine {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<JoinSet<()>>,
    running: Arc<Mutex<HashSet<TaxId>>>,
}

impl SyncEngine {
    /// Creates an engine over `store`.
    pub fn new(store: Arc<Store>, sessions: Arc<dyn SessionFactory>, config: EngineConfig) -> Self {
        let poller = Poller::new(Arc::clone(&store), sessions, config);
        Self::from_poller(store, poller)
    }

    /// Creates an engine around a configured poller, for example one with an
    /// [`Acknowledger`](crate::Acknowledger) or a custom [`Clock`](crate::Clock).
    pub fn from_poller(store: Arc<Store>, poller: Poller) -> Self {
        let (shutdown, receiver) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                store,
                poller: poller.with_shutdown(receiver),
                status: StatusBoard::new(),
                locks: CycleLocks::default(),
            }),
            shutdown,
            workers: Mutex::new(JoinSet::new()),
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.shared.store
    }

    /// The configuration in use.
    pub fn config(&self) -> &EngineConfig {
        self.shared.poller.config()
    }

    /// Spawns a worker for every registered credential without one.
    ///
    /// Must be called inside a tokio runtime. Returns the number of workers
    /// spawned; call again to pick up credentials registered since.
    pub fn start(&self) -> usize {
        if self.is_shutting_down() {
            return 0;
        }
        let mut workers = self.workers.lock();
        let mut spawned = 0;
        for credential in self.shared.store.credentials().list() {
            if !self.running.lock().insert(credential.identity.clone()) {
                continue;
            }
            let span = info_span!("credential", identity = %credential.identity);
            let worker = Worker {
                identity: credential.identity,
                shared: Arc::clone(&self.shared),
                shutdown: self.shutdown.subscribe(),
                running: Arc::clone(&self.running),
            };
            workers.spawn(worker.run().instrument(span));
            spawned += 1;
        }
        info!(workers = spawned, "engine started");
        spawned
    }

    /// Number of workers currently running.
    pub fn worker_count(&self) -> usize {
        self.running.lock().len()
    }

    /// True once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Signals shutdown and waits for every worker to finish its current
    /// cycle and exit.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let mut workers = std::mem::take(&mut *self.workers.lock());
        while let Some(result) = workers.join_next().await {
            if let Err(error) = result {
                error!(%error, "worker terminated abnormally");
            }
        }
        info!("engine stopped");
    }

    /// Runs a single cycle for `identity`, waiting for any cycle in flight.
    pub async fn poll_once(&self, identity: &TaxId) -> SyncResult<Outcome> {
        if self.is_shutting_down() {
            return Err(SyncError::Cancelled);
        }
        self.shared
            .cycle(identity)
            .instrument(info_span!("credential", identity = %identity))
            .await
    }

    /// Requests up to `limit` SUMMARY invoices of `identity` by key.
    pub async fn fetch_pending_complete(
        &self,
        identity: &TaxId,
        limit: usize,
    ) -> SyncResult<FetchReport> {
        let lock = self.shared.locks.for_identity(identity);
        let _guard = lock.lock().await;
        let credential = self
            .shared
            .store
            .credentials()
            .get(identity)
            .ok_or_else(|| SyncError::UnknownCredential(identity.to_string()))?;
        self.shared
            .poller
            .fetch_pending_complete(&credential, limit)
            .instrument(info_span!("credential", identity = %identity))
            .await
    }

    /// Status of every credential that ran at least one cycle.
    pub fn status(&self) -> Vec<CredentialStatus> {
        self.shared.status.snapshot()
    }

    /// Status of one credential.
    pub fn status_of(&self, identity: &TaxId) -> Option<CredentialStatus> {
        self.shared.status.get(identity)
    }

    /// Time left in the cooldown of `identity`, if one blocks it.
    pub fn cooldown_remaining(&self, identity: &TaxId) -> Option<Duration> {
        let store = &self.shared.store;
        store.cooldowns().blocked_for(
            identity,
            self.shared.poller.clock().now(),
            self.config().cooldown_window,
            store.cursors().current(identity),
        )
    }
}
