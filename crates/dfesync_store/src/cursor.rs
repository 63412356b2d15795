//! Per-credential NSU cursors.

use crate::error::StoreResult;
use crate::log::KeyedLog;
use dfesync_protocol::{Nsu, TaxId};
use dfesync_storage::StorageBackend;
use tracing::debug;

/// Last fully consumed sequence number per credential.
///
/// [`advance`](Self::advance) never lowers a cursor; only
/// [`reset`](Self::reset) can.
pub struct CursorStore {
    log: KeyedLog<Nsu>,
}

impl CursorStore {
    pub(crate) const LOG_NAME: &'static str = "cursors.log";

    pub(crate) fn open(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> StoreResult<Self> {
        Ok(Self {
            log: KeyedLog::open(Self::LOG_NAME, backend, sync_on_write)?,
        })
    }

    /// Returns the stored cursor, if the credential has polled before.
    #[must_use]
    pub fn get(&self, identity: &TaxId) -> Option<Nsu> {
        self.log.get(identity.digits())
    }

    /// Returns the stored cursor or [`Nsu::ZERO`].
    #[must_use]
    pub fn current(&self, identity: &TaxId) -> Nsu {
        self.get(identity).unwrap_or(Nsu::ZERO)
    }

    /// Moves the cursor forward to `to` and returns the resulting cursor.
    ///
    /// A `to` at or below the current cursor writes nothing.
    pub fn advance(&self, identity: &TaxId, to: Nsu) -> StoreResult<Nsu> {
        let written = self.log.update(identity.digits(), |current| match current {
            Some(&current) if current >= to => None,
            _ => Some(to),
        })?;
        match written {
            Some(cursor) => {
                debug!(identity = %identity, cursor = %cursor, "cursor advanced");
                Ok(cursor)
            }
            None => Ok(self.current(identity)),
        }
    }

    /// Sets the cursor to `to` unconditionally (full or partial resync).
    pub fn reset(&self, identity: &TaxId, to: Nsu) -> StoreResult<()> {
        self.log.put(identity.digits(), to)
    }

    pub(crate) fn remove(&self, identity: &TaxId) -> StoreResult<()> {
        self.log.remove(identity.digits()).map(|_| ())
    }

    pub(crate) fn compact(&self) -> StoreResult<()> {
        self.log.compact()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfesync_storage::InMemoryBackend;
    use proptest::prelude::*;

    fn store() -> CursorStore {
        CursorStore::open(Box::new(InMemoryBackend::new()), false).unwrap()
    }

    fn id() -> TaxId {
        TaxId::parse("12345678000190").unwrap()
    }

    #[test]
    fn starts_at_zero() {
        let store = store();
        assert_eq!(store.get(&id()), None);
        assert_eq!(store.current(&id()), Nsu::ZERO);
    }

    #[test]
    fn advance_never_lowers() {
        let store = store();
        store.advance(&id(), Nsu::new(10).unwrap()).unwrap();
        let after = store.advance(&id(), Nsu::new(4).unwrap()).unwrap();
        assert_eq!(after, Nsu::new(10).unwrap());
    }

    #[test]
    fn reset_can_lower() {
        let store = store();
        store.advance(&id(), Nsu::new(10).unwrap()).unwrap();
        store.reset(&id(), Nsu::ZERO).unwrap();
        assert_eq!(store.get(&id()), Some(Nsu::ZERO));
    }

    proptest! {
        #[test]
        fn cursor_is_non_decreasing(targets in prop::collection::vec(0u64..1_000, 1..40)) {
            let store = store();
            let mut previous = Nsu::ZERO;
            for target in targets {
                let now = store.advance(&id(), Nsu::new(target).unwrap()).unwrap();
                prop_assert!(now >= previous);
                prop_assert_eq!(now, previous.max(Nsu::new(target).unwrap()));
                previous = now;
            }
        }
    }
}
