//! # dfesync store
//!
//! Persistent state of the distribution engine:
//!
//! - [`CredentialStore`]: registered credentials
//! - [`CursorStore`]: last consumed NSU per credential, never lowered
//!   except by an explicit reset
//! - [`CooldownStore`]: the "no new documents" window per credential
//! - [`DocumentStore`]: documents keyed by document key, with SUMMARY and
//!   COMPLETE states and anti-downgrade upserts
//! - [`AckLedger`]: acknowledgments that need no resubmission
//!
//! Each store is a CBOR record log with CRC-framed records, replayed into
//! memory on open. [`Store`] opens all of them inside one locked data
//! directory.
//!
//! ```rust,ignore
//! use dfesync_store::Store;
//!
//! let store = Store::open(Path::new("data"))?;
//! let cursor = store.cursors().current(&identity);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod ack;
mod config;
mod cooldown;
mod credential;
mod cursor;
mod dir;
mod document;
mod error;
mod log;
mod store;

pub use ack::{AckEntry, AckLedger};
pub use config::StoreConfig;
pub use cooldown::{CooldownState, CooldownStore};
pub use credential::{Credential, CredentialStore, Passphrase};
pub use cursor::CursorStore;
pub use dir::DataDir;
pub use document::{DocumentRecord, DocumentStore, UpsertOutcome};
pub use error::{StoreError, StoreResult};
pub use store::Store;
