//! CLI command implementations.

pub mod compact;
pub mod credential;
pub mod cursor;
pub mod documents;
pub mod poll;
pub mod run;

use dfesync_protocol::TaxId;
use dfesync_store::{Store, StoreConfig};
use std::path::Path;

/// Result type shared by the commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Opens the data directory, taking its lock.
pub fn open_store(data_dir: &Path) -> CommandResult<Store> {
    Ok(Store::open_with_config(data_dir, StoreConfig::default())?)
}

/// Parses a CNPJ/CPF argument.
pub fn parse_identity(text: &str) -> CommandResult<TaxId> {
    Ok(TaxId::parse(text)?)
}

/// Fails unless `identity` is registered.
pub fn require_credential(store: &Store, identity: &TaxId) -> CommandResult<()> {
    if store.credentials().get(identity).is_none() {
        return Err(format!("no credential registered for {identity}").into());
    }
    Ok(())
}
