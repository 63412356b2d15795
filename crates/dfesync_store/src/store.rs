//! The set of stores behind one data directory.

use crate::ack::AckLedger;
use crate::config::StoreConfig;
use crate::cooldown::CooldownStore;
use crate::credential::{Credential, CredentialStore};
use crate::cursor::CursorStore;
use crate::dir::DataDir;
use crate::document::DocumentStore;
use crate::error::StoreResult;
use dfesync_protocol::{Nsu, TaxId};
use dfesync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::path::Path;
use tracing::info;

/// Every persisted store of the engine.
///
/// Each store is partitioned by credential identity or by document key and
/// serializes its own writes, so a `Store` is shared behind an `Arc`.
pub struct Store {
    dir: Option<DataDir>,
    credentials: CredentialStore,
    cursors: CursorStore,
    cooldowns: CooldownStore,
    documents: DocumentStore,
    acks: AckLedger,
}

impl Store {
    /// Opens the stores in `path` with the default configuration.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens the stores in `path`, taking the directory lock.
    pub fn open_with_config(path: &Path, config: StoreConfig) -> StoreResult<Self> {
        let dir = DataDir::open(path, config.create_if_missing)?;
        let file = |name: &str| -> StoreResult<Box<dyn StorageBackend>> {
            Ok(Box::new(FileBackend::open(&dir.log_path(name))?))
        };
        let sync = config.sync_on_write;

        let store = Self {
            credentials: CredentialStore::open(file(CredentialStore::LOG_NAME)?, sync)?,
            cursors: CursorStore::open(file(CursorStore::LOG_NAME)?, sync)?,
            cooldowns: CooldownStore::open(file(CooldownStore::LOG_NAME)?, sync)?,
            documents: DocumentStore::open(file(DocumentStore::LOG_NAME)?, sync)?,
            acks: AckLedger::open(file(AckLedger::LOG_NAME)?, sync)?,
            dir: Some(dir),
        };
        if config.compact_on_open {
            store.compact()?;
        }

        info!(
            path = %path.display(),
            credentials = store.credentials.len(),
            documents = store.documents.len(),
            "store opened"
        );
        Ok(store)
    }

    /// Creates volatile stores, for tests and dry runs.
    pub fn in_memory() -> StoreResult<Self> {
        let memory = || -> Box<dyn StorageBackend> { Box::new(InMemoryBackend::new()) };
        Ok(Self {
            dir: None,
            credentials: CredentialStore::open(memory(), false)?,
            cursors: CursorStore::open(memory(), false)?,
            cooldowns: CooldownStore::open(memory(), false)?,
            documents: DocumentStore::open(memory(), false)?,
            acks: AckLedger::open(memory(), false)?,
        })
    }

    /// Data directory, when on disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DataDir::path)
    }

    /// Credential table.
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Cursor Store.
    #[must_use]
    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    /// Cooldown Guard state.
    #[must_use]
    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    /// Document Store.
    #[must_use]
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Acknowledgment ledger.
    #[must_use]
    pub fn acks(&self) -> &AckLedger {
        &self.acks
    }

    /// Removes a credential together with its cursor and cooldown.
    ///
    /// Documents it owned are kept.
    pub fn remove_credential(&self, identity: &TaxId) -> StoreResult<Option<Credential>> {
        let removed = self.credentials.remove(identity)?;
        self.cursors.remove(identity)?;
        self.cooldowns.clear(identity)?;
        if removed.is_some() {
            info!(identity = %identity, "credential removed");
        }
        Ok(removed)
    }

    /// Sets a credential's cursor to `to` and clears its cooldown, so the
    /// next cycle resynchronizes from there.
    pub fn reset_cursor(&self, identity: &TaxId, to: Nsu) -> StoreResult<()> {
        self.cursors.reset(identity, to)?;
        self.cooldowns.clear(identity)?;
        info!(identity = %identity, cursor = %to, "cursor reset");
        Ok(())
    }

    /// Compacts every log.
    pub fn compact(&self) -> StoreResult<()> {
        self.credentials.compact()?;
        self.cursors.compact()?;
        self.cooldowns.compact()?;
        self.documents.compact()?;
        self.acks.compact()?;
        Ok(())
    }
}
