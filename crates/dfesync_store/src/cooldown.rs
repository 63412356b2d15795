//! Per-credential "no new documents" windows.

use crate::error::StoreResult;
use crate::log::KeyedLog;
use chrono::{DateTime, Utc};
use dfesync_protocol::{Nsu, TaxId};
use dfesync_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When the service last reported no new documents, and at which cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    /// Time of the EMPTY response.
    pub declared_at: DateTime<Utc>,
    /// Cursor at that time.
    pub cursor: Nsu,
}

impl CooldownState {
    /// Time left in the window, or `None` if the window no longer blocks.
    ///
    /// The window blocks only while `current` still equals the cursor it was
    /// declared at.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>, window: Duration, current: Nsu) -> Option<Duration> {
        if self.cursor != current {
            return None;
        }
        // a declaration in the future (clock moved back) counts as just made
        let elapsed = (now - self.declared_at).to_std().unwrap_or(Duration::ZERO);
        window.checked_sub(elapsed).filter(|left| !left.is_zero())
    }
}

/// Cooldown Guard storage.
pub struct CooldownStore {
    log: KeyedLog<CooldownState>,
}

impl CooldownStore {
    pub(crate) const LOG_NAME: &'static str = "cooldowns.log";

    pub(crate) fn open(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> StoreResult<Self> {
        Ok(Self {
            log: KeyedLog::open(Self::LOG_NAME, backend, sync_on_write)?,
        })
    }

    /// Returns the stored state.
    #[must_use]
    pub fn get(&self, identity: &TaxId) -> Option<CooldownState> {
        self.log.get(identity.digits())
    }

    /// Returns how long polling stays blocked, if it is.
    #[must_use]
    pub fn blocked_for(
        &self,
        identity: &TaxId,
        now: DateTime<Utc>,
        window: Duration,
        current: Nsu,
    ) -> Option<Duration> {
        self.get(identity)
            .and_then(|state| state.remaining(now, window, current))
    }

    /// Records an EMPTY response.
    pub fn declare(&self, identity: &TaxId, at: DateTime<Utc>, cursor: Nsu) -> StoreResult<()> {
        self.log.put(
            identity.digits(),
            CooldownState {
                declared_at: at,
                cursor,
            },
        )
    }

    /// Clears the window. Writes nothing when there is none.
    pub fn clear(&self, identity: &TaxId) -> StoreResult<()> {
        self.log.remove(identity.digits()).map(|_| ())
    }

    pub(crate) fn compact(&self) -> StoreResult<()> {
        self.log.compact()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use dfesync_storage::InMemoryBackend;

    const HOUR: Duration = Duration::from_secs(3600);

    fn id() -> TaxId {
        TaxId::parse("12345678000190").unwrap()
    }

    #[test]
    fn blocks_within_window_at_same_cursor() {
        let store = CooldownStore::open(Box::new(InMemoryBackend::new()), false).unwrap();
        let t0 = Utc::now();
        let cursor = Nsu::new(7).unwrap();
        store.declare(&id(), t0, cursor).unwrap();

        let left = store
            .blocked_for(&id(), t0 + TimeDelta::minutes(10), HOUR, cursor)
            .unwrap();
        assert_eq!(left, Duration::from_secs(50 * 60));
        assert!(store
            .blocked_for(&id(), t0 + TimeDelta::minutes(60), HOUR, cursor)
            .is_none());
    }

    #[test]
    fn moved_cursor_unblocks() {
        let store = CooldownStore::open(Box::new(InMemoryBackend::new()), false).unwrap();
        let t0 = Utc::now();
        store.declare(&id(), t0, Nsu::new(7).unwrap()).unwrap();
        assert!(store
            .blocked_for(&id(), t0, HOUR, Nsu::new(8).unwrap())
            .is_none());
    }

    #[test]
    fn clear_removes_state() {
        let store = CooldownStore::open(Box::new(InMemoryBackend::new()), false).unwrap();
        store.declare(&id(), Utc::now(), Nsu::ZERO).unwrap();
        store.clear(&id()).unwrap();
        assert_eq!(store.get(&id()), None);
        store.clear(&id()).unwrap();
    }
}
