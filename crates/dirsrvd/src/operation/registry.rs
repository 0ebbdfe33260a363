//! In-flight operation tracking for abandon and cancel requests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::OperationKey;
use super::cancel::CancelHandle;

/// Cancellation handles of operations currently inside `run`, keyed by
/// connection and message ID.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    in_flight: Mutex<HashMap<(u64, i32), CancelHandle>>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(u64, i32), CancelHandle>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracks `handle` until the returned guard is dropped.
    pub(crate) fn register(&self, key: OperationKey, handle: CancelHandle) -> Registration<'_> {
        let slot = (key.connection_id, key.message_id);
        self.lock().insert(slot, handle.clone());
        Registration {
            registry: self,
            slot,
            handle,
        }
    }

    /// Looks up an in-flight operation.
    #[must_use]
    pub fn find(&self, connection_id: u64, message_id: i32) -> Option<CancelHandle> {
        self.lock().get(&(connection_id, message_id)).cloned()
    }

    /// Handles of every in-flight operation on `connection_id`.
    #[must_use]
    pub fn for_connection(&self, connection_id: u64) -> Vec<CancelHandle> {
        self.lock()
            .iter()
            .filter(|((connection, _), _)| *connection == connection_id)
            .map(|(_, handle)| handle.clone())
            .collect()
    }

    /// Number of operations in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Removes the operation from the registry when dropped, unless a later
/// operation reusing the message ID has taken the slot over.
#[derive(Debug)]
pub(crate) struct Registration<'a> {
    registry: &'a OperationRegistry,
    slot: (u64, i32),
    handle: CancelHandle,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.registry.lock();
        if in_flight
            .get(&self.slot)
            .is_some_and(|current| current.same_slot(&self.handle))
        {
            in_flight.remove(&self.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(connection_id: u64, message_id: i32) -> OperationKey {
        OperationKey {
            connection_id,
            operation_id: 1,
            message_id,
        }
    }

    #[test]
    fn registration_is_scoped_to_guard() {
        let registry = OperationRegistry::new();
        {
            let _guard = registry.register(key(7, 3), CancelHandle::new());
            assert!(registry.find(7, 3).is_some());
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.find(7, 3).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn lists_operations_per_connection() {
        let registry = OperationRegistry::new();
        let _first = registry.register(key(1, 1), CancelHandle::new());
        let _second = registry.register(key(1, 2), CancelHandle::new());
        let _other = registry.register(key(2, 1), CancelHandle::new());

        assert_eq!(registry.for_connection(1).len(), 2);
        assert_eq!(registry.for_connection(3).len(), 0);
    }

    #[test]
    fn reused_message_ids_keep_the_newer_registration() {
        let registry = OperationRegistry::new();
        let newer = CancelHandle::new();
        let first = registry.register(key(4, 9), CancelHandle::new());
        let second = registry.register(key(4, 9), newer.clone());

        drop(first);
        let found = registry.find(4, 9).expect("newer operation should stay tracked");
        assert!(found.same_slot(&newer));

        drop(second);
        assert!(registry.find(4, 9).is_none());
    }
}
