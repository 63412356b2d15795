//! # dfesync engine
//!
//! Document distribution synchronization for fiscal documents.
//!
//! This crate provides:
//! - Session factories: mutual-TLS HTTP sessions per credential, plus a
//!   scripted mock
//! - The distribution poller state machine (SUCCESS, EMPTY, THROTTLED,
//!   REJECTED, TRANSPORT_ERROR)
//! - The sync orchestrator: one worker per credential with backoff,
//!   cooldowns and graceful shutdown
//! - Acknowledgment submission through an external signer
//! - A per-credential status board
//!
//! ## Key Invariants
//!
//! - A cursor only moves after every document of its batch is persisted
//! - THROTTLED and transport failures never touch the cursor or cooldown
//! - Cycles for one credential never overlap
//! - A failing credential never stalls the others

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod ack;
mod config;
mod engine;
mod error;
mod http;
mod poller;
mod status;
mod transport;

pub use ack::{AckOutcome, Acknowledger, AcknowledgmentSigner, RecordingSigner};
pub use config::{Endpoints, EngineConfig, RetryConfig};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use http::{HttpSessionFactory, HttpTransport};
pub use poller::{Clock, FetchReport, Outcome, Poller};
pub use status::{CredentialStatus, OutcomeKind, StatusBoard};
pub use transport::{
    DistributionTransport, MockReply, MockSessionFactory, MockTransport, RawResponse,
    SessionFactory,
};
