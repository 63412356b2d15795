//! Per-credential status for collaborators that render it.

use crate::error::SyncError;
use crate::poller::Outcome;
use chrono::{DateTime, Utc};
use dfesync_protocol::{Nsu, TaxId};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

/// Kind of the last cycle result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Documents were persisted.
    Success,
    /// Nothing new.
    Empty,
    /// Skipped by the cooldown.
    CoolingDown,
    /// Rate limited.
    Throttled,
    /// Rejected by the service.
    Rejected,
    /// Network failure.
    TransportError,
    /// Certificate unusable; the worker is parked until it opens again.
    CredentialError,
    /// Any other failure, such as a store error.
    Failed,
}

impl From<&Outcome> for OutcomeKind {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success { .. } => Self::Success,
            Outcome::Empty { .. } => Self::Empty,
            Outcome::CoolingDown { .. } => Self::CoolingDown,
            Outcome::Throttled { .. } => Self::Throttled,
            Outcome::Rejected { .. } => Self::Rejected,
            Outcome::TransportError { .. } => Self::TransportError,
        }
    }
}

/// What collaborators see for one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    /// The credential.
    pub identity: TaxId,
    /// Kind of the last result.
    pub last_outcome: Option<OutcomeKind>,
    /// Human-readable form of the last result.
    pub last_detail: Option<String>,
    /// When the last result was recorded.
    pub last_at: Option<DateTime<Utc>>,
    /// Cursor after the last cycle.
    pub cursor: Option<Nsu>,
    /// Cycles that issued at least one request.
    pub cycles: u64,
    /// Upserts that wrote something.
    pub documents_stored: u64,
    /// THROTTLED outcomes.
    pub throttles: u64,
    /// REJECTED outcomes.
    pub rejections: u64,
    /// TRANSPORT_ERROR outcomes.
    pub transport_errors: u64,
    /// Message of the last error.
    pub last_error: Option<String>,
    /// True while the certificate cannot be opened.
    pub parked: bool,
}

impl CredentialStatus {
    fn new(identity: TaxId) -> Self {
        Self {
            identity,
            last_outcome: None,
            last_detail: None,
            last_at: None,
            cursor: None,
            cycles: 0,
            documents_stored: 0,
            throttles: 0,
            rejections: 0,
            transport_errors: 0,
            last_error: None,
            parked: false,
        }
    }
}

/// Shared board of [`CredentialStatus`] entries.
#[derive(Debug, Default)]
pub struct StatusBoard {
    entries: RwLock<BTreeMap<TaxId, CredentialStatus>>,
}

impl StatusBoard {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cycle outcome.
    pub fn record(&self, identity: &TaxId, outcome: &Outcome, cursor: Nsu, at: DateTime<Utc>) {
        let mut entries = self.entries.write();
        let status = entries
            .entry(identity.clone())
            .or_insert_with(|| CredentialStatus::new(identity.clone()));

        status.last_outcome = Some(OutcomeKind::from(outcome));
        status.last_detail = Some(outcome.to_string());
        status.last_at = Some(at);
        status.cursor = Some(cursor);
        status.parked = false;
        if !matches!(outcome, Outcome::CoolingDown { .. }) {
            status.cycles += 1;
        }
        match outcome {
            Outcome::Success { stored, .. } => {
                status.documents_stored += *stored as u64;
            }
            Outcome::Throttled { .. } => status.throttles += 1,
            Outcome::Rejected { .. } => status.rejections += 1,
            Outcome::TransportError { .. } => status.transport_errors += 1,
            Outcome::Empty { .. } | Outcome::CoolingDown { .. } => {}
        }
        if let Some(error) = outcome.error() {
            status.last_error = Some(error.to_string());
        }
    }

    /// Records a cycle that failed outright.
    pub fn record_failure(&self, identity: &TaxId, error: &SyncError, at: DateTime<Utc>) {
        let mut entries = self.entries.write();
        let status = entries
            .entry(identity.clone())
            .or_insert_with(|| CredentialStatus::new(identity.clone()));

        let kind = match error {
            SyncError::Credential { .. } => OutcomeKind::CredentialError,
            _ => OutcomeKind::Failed,
        };
        status.last_outcome = Some(kind);
        status.last_detail = Some(error.to_string());
        status.last_error = Some(error.to_string());
        status.last_at = Some(at);
        status.parked = kind == OutcomeKind::CredentialError;
    }

    /// Status of one credential.
    pub fn get(&self, identity: &TaxId) -> Option<CredentialStatus> {
        self.entries.read().get(identity).cloned()
    }

    /// Snapshot of every credential, ordered by identity.
    pub fn snapshot(&self) -> Vec<CredentialStatus> {
        self.entries.read().values().cloned().collect()
    }

    /// Drops the entry of a removed credential.
    pub fn forget(&self, identity: &TaxId) {
        self.entries.write().remove(identity);
    }
}
