//! Registered credentials.

use crate::error::{StoreError, StoreResult};
use crate::log::KeyedLog;
use dfesync_protocol::{RegionCode, ServiceKind, TaxId};
use dfesync_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Certificate passphrase.
///
/// Zeroized on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Passphrase(String);

impl Passphrase {
    /// Wraps a passphrase.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the secret.
    ///
    /// Don't log or persist the result anywhere else.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// A taxpayer identity plus the certificate it authenticates with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Taxpayer identity; also the key of every per-credential store.
    pub identity: TaxId,
    /// PKCS#12 certificate file.
    pub certificate_path: PathBuf,
    /// Passphrase of the certificate file.
    pub passphrase: Passphrase,
    /// State code used for request routing (`cUFAutor`).
    pub region: RegionCode,
    /// Distribution service this credential polls.
    #[serde(default)]
    pub service: ServiceKind,
    /// Free-form label shown by collaborators.
    #[serde(default)]
    pub label: Option<String>,
}

impl Credential {
    /// Creates a credential for the NF-e service.
    pub fn new(
        identity: TaxId,
        certificate_path: impl Into<PathBuf>,
        passphrase: Passphrase,
        region: RegionCode,
    ) -> Self {
        Self {
            identity,
            certificate_path: certificate_path.into(),
            passphrase,
            region,
            service: ServiceKind::Nfe,
            label: None,
        }
    }

    /// Sets the service kind.
    #[must_use]
    pub fn with_service(mut self, service: ServiceKind) -> Self {
        self.service = service;
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Store key for this credential.
    #[must_use]
    pub fn key(&self) -> &str {
        self.identity.digits()
    }
}

/// Credential table.
pub struct CredentialStore {
    log: KeyedLog<Credential>,
}

impl CredentialStore {
    pub(crate) const LOG_NAME: &'static str = "credentials.log";

    pub(crate) fn open(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> StoreResult<Self> {
        Ok(Self {
            log: KeyedLog::open(Self::LOG_NAME, backend, sync_on_write)?,
        })
    }

    /// Registers a new credential.
    ///
    /// # Errors
    ///
    /// Returns `CredentialExists` if the identity is already registered.
    pub fn register(&self, credential: Credential) -> StoreResult<()> {
        let key = credential.key().to_string();
        let mut inserted = false;
        self.log.update(&key, |existing| {
            if existing.is_some() {
                return None;
            }
            inserted = true;
            Some(credential)
        })?;
        if inserted {
            Ok(())
        } else {
            Err(StoreError::CredentialExists(key))
        }
    }

    /// Removes a credential, returning it if it was registered.
    pub(crate) fn remove(&self, identity: &TaxId) -> StoreResult<Option<Credential>> {
        self.log.remove(identity.digits())
    }

    /// Looks up a credential.
    #[must_use]
    pub fn get(&self, identity: &TaxId) -> Option<Credential> {
        self.log.get(identity.digits())
    }

    /// Returns every registered credential, ordered by identity.
    #[must_use]
    pub fn list(&self) -> Vec<Credential> {
        self.log.entries().into_iter().map(|(_, c)| c).collect()
    }

    /// Number of registered credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// True when no credential is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn compact(&self) -> StoreResult<()> {
        self.log.compact()
    }
}
