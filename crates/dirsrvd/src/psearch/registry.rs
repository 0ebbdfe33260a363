//! Process-wide set of active persistent searches.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, warn};

use dirsrv_types::{Dn, Entry, ResultCode};

use crate::operation::LocalOperation;

use super::{ChangeType, PSEARCH_TARGET, PersistentSearch, PersistentSearchError};

/// Registered persistent searches.
///
/// Notification passes iterate over a snapshot, so searches deregistered
/// mid-pass are neither skipped nor visited twice by concurrent passes, and
/// a failing search never holds the lock while its sink runs.
#[derive(Debug, Default)]
pub struct PersistentSearchRegistry {
    searches: RwLock<Vec<Arc<PersistentSearch>>>,
    limit: Option<usize>,
}

impl PersistentSearchRegistry {
    /// Creates a registry admitting at most `limit` concurrent searches.
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            searches: RwLock::default(),
            limit,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<PersistentSearch>>> {
        self.searches.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<PersistentSearch>>> {
        self.searches.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Vec<Arc<PersistentSearch>> {
        self.read().clone()
    }

    /// Configured cap on concurrent searches.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns `true` when another search could be registered.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.limit.is_none_or(|limit| self.read().len() < limit)
    }

    /// Activates `search`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistentSearchError::LimitExceeded`] when the registry is
    /// full.
    pub fn register(&self, search: Arc<PersistentSearch>) -> Result<(), PersistentSearchError> {
        let mut searches = self.write();
        if let Some(limit) = self.limit
            && searches.len() >= limit
        {
            return Err(PersistentSearchError::LimitExceeded { limit });
        }
        debug!(
            target: PSEARCH_TARGET,
            conn = search.key().connection_id,
            msg = search.key().message_id,
            base_dn = %search.base_dn(),
            "persistent search registered"
        );
        searches.push(search);
        Ok(())
    }

    /// Removes `search`; returns `false` when it was not registered.
    pub fn deregister(&self, search: &Arc<PersistentSearch>) -> bool {
        search.mark_cancelled();
        let mut searches = self.write();
        let before = searches.len();
        searches.retain(|registered| !Arc::ptr_eq(registered, search));
        let removed = searches.len() != before;
        if removed {
            debug!(
                target: PSEARCH_TARGET,
                conn = search.key().connection_id,
                msg = search.key().message_id,
                "persistent search deregistered"
            );
        }
        removed
    }

    /// Ends the persistent search started by `message_id` on
    /// `connection_id`, answering it with `Canceled`.
    pub fn cancel(&self, connection_id: u64, message_id: i32) -> bool {
        let target = self.snapshot().into_iter().find(|search| {
            let key = search.key();
            key.connection_id == connection_id && key.message_id == message_id
        });
        let Some(search) = target else {
            return false;
        };
        if !self.deregister(&search) {
            return false;
        }
        if let Err(error) = search.finish(ResultCode::Canceled, "the persistent search was canceled")
        {
            debug!(
                target: PSEARCH_TARGET,
                error = %error,
                "could not deliver search-result-done to a canceled persistent search"
            );
        }
        true
    }

    /// Drops every search of a disconnected client; returns how many were
    /// removed.
    pub fn cancel_for_connection(&self, connection_id: u64) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|search| search.key().connection_id == connection_id)
            .filter(|search| self.deregister(search))
            .count()
    }

    /// Ends every search with `Unavailable`.
    pub fn shutdown(&self) {
        let searches = std::mem::take(&mut *self.write());
        for search in searches {
            search.mark_cancelled();
            if let Err(error) =
                search.finish(ResultCode::Unavailable, "the server is shutting down")
            {
                debug!(
                    target: PSEARCH_TARGET,
                    error = %error,
                    "could not notify persistent search of shutdown"
                );
            }
        }
    }

    /// Number of active searches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` when no search is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Replays a side-effect record against every search.
    pub fn process_local(&self, record: &LocalOperation) {
        match record {
            LocalOperation::Add { entry } => self.process_add(entry),
            LocalOperation::Delete { entry } => self.process_delete(entry),
            LocalOperation::Modify { old, new, .. } => self.process_modify(old, new),
            LocalOperation::ModifyDn { old, new } => self.process_modify_dn(old, new),
        }
    }

    /// Notifies searches of an added entry.
    pub fn process_add(&self, entry: &Entry) {
        for search in self.snapshot() {
            if search.wants(ChangeType::Add)
                && search.in_scope(entry.dn())
                && search.filter.matches(entry)
            {
                self.deliver(&search, entry, ChangeType::Add, None);
            }
        }
    }

    /// Notifies searches of a deleted entry.
    pub fn process_delete(&self, entry: &Entry) {
        for search in self.snapshot() {
            if search.wants(ChangeType::Delete)
                && search.in_scope(entry.dn())
                && search.filter.matches(entry)
            {
                self.deliver(&search, entry, ChangeType::Delete, None);
            }
        }
    }

    /// Notifies searches of a modified entry. A search hears about the change
    /// when the entry matched its filter before the modification or after
    /// it, so clients see entries leave their result set as well as enter it.
    pub fn process_modify(&self, old: &Entry, new: &Entry) {
        for search in self.snapshot() {
            if search.wants(ChangeType::Modify)
                && search.in_scope(old.dn())
                && (search.filter.matches(old) || search.filter.matches(new))
            {
                self.deliver(&search, new, ChangeType::Modify, None);
            }
        }
    }

    /// Notifies searches of a renamed entry. Either the old or the new
    /// position may satisfy scope and filter.
    pub fn process_modify_dn(&self, old: &Entry, new: &Entry) {
        for search in self.snapshot() {
            if !search.wants(ChangeType::ModifyDn) {
                continue;
            }
            let in_scope = search.in_scope(old.dn()) || search.in_scope(new.dn());
            let matches = search.filter.matches(old) || search.filter.matches(new);
            if in_scope && matches {
                self.deliver(&search, new, ChangeType::ModifyDn, Some(old.dn()));
            }
        }
    }

    fn deliver(
        &self,
        search: &Arc<PersistentSearch>,
        entry: &Entry,
        change: ChangeType,
        previous_dn: Option<&Dn>,
    ) {
        match search.notify(entry, change, previous_dn) {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    target: PSEARCH_TARGET,
                    conn = search.key().connection_id,
                    msg = search.key().message_id,
                    "persistent search consumer stopped accepting entries"
                );
                if self.deregister(search)
                    && let Err(error) = search.finish(
                        ResultCode::SizeLimitExceeded,
                        "the persistent search stopped accepting entries",
                    )
                {
                    warn!(
                        target: PSEARCH_TARGET,
                        error = %error,
                        "could not complete persistent search"
                    );
                }
            }
            Err(delivery) => {
                error!(
                    target: PSEARCH_TARGET,
                    conn = search.key().connection_id,
                    msg = search.key().message_id,
                    change = %change,
                    dn = %entry.dn(),
                    error = %delivery,
                    "persistent search notification failed"
                );
                self.deregister(search);
                if let Err(error) = search.finish(ResultCode::Other, delivery.message()) {
                    debug!(
                        target: PSEARCH_TARGET,
                        error = %error,
                        "best-effort search-result-done failed"
                    );
                }
            }
        }
    }
}
