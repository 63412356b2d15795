//! Store fixtures and sample identities.

use dfesync_protocol::{Nsu, RegionCode, TaxId};
use dfesync_store::{Credential, Passphrase, Store};
use std::path::Path;
use tempfile::TempDir;

/// CNPJ of the default test recipient.
pub const RECIPIENT_CNPJ: &str = "98765432000110";

/// CNPJ of the default test issuer.
pub const ISSUER_CNPJ: &str = "12345678000190";

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: Store::in_memory().expect("Failed to open in-memory store"),
            temp_dir: None,
        }
    }

    /// Creates a new file-based test store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Store::open(temp_dir.path()).expect("Failed to open file store");
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the data directory if file-based.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Consumes the fixture, returning the store and the directory guard.
    pub fn into_parts(self) -> (Store, Option<TempDir>) {
        (self.store, self.temp_dir)
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Parses a tax id, panicking on bad input.
pub fn tax_id(digits: &str) -> TaxId {
    TaxId::parse(digits).expect("Invalid test tax id")
}

/// Builds an NSU, panicking when out of range.
pub fn nsu(value: u64) -> Nsu {
    Nsu::new(value).expect("Invalid test NSU")
}

/// A credential for `identity` in São Paulo pointing at a non-existent certificate.
pub fn credential(identity: &str) -> Credential {
    Credential::new(
        tax_id(identity),
        format!("/nonexistent/{identity}.pfx"),
        Passphrase::new("test-passphrase"),
        RegionCode::new(35).expect("Invalid region"),
    )
}

/// Registers `credential(identity)` in `store` and returns it.
pub fn register(store: &Store, identity: &str) -> Credential {
    let credential = credential(identity);
    store
        .credentials()
        .register(credential.clone())
        .expect("Failed to register credential");
    credential
}
