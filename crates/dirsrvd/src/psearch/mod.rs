//! Persistent searches and change notification.
//!
//! A search carrying the persistent search control stays registered after
//! its initial phase. Every successful local change that went through a
//! workflow is then replayed against the registered searches; matching
//! entries stream to the client through the search's result sink.

mod control;
mod registry;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use dirsrv_types::{Dn, Entry, ResultCode, SearchFilter, SearchScope};

use crate::operation::{
    DeliveryError, Operation, OperationKey, Request, SearchResultSink, project_entry,
};

pub use control::{
    ChangeType, ChangeTypes, ENTRY_CHANGE_NOTIFICATION_OID, EntryChangeNotification,
    PERSISTENT_SEARCH_OID, PersistentSearchControl,
};
pub use registry::PersistentSearchRegistry;

pub(crate) const PSEARCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::psearch");

/// Errors raised while activating a persistent search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistentSearchError {
    /// The configured cap on concurrent persistent searches was reached.
    #[error("the limit of {limit} concurrent persistent searches has been reached")]
    LimitExceeded {
        /// Configured cap.
        limit: usize,
    },
    /// The request control could not be decoded.
    #[error("invalid persistent search control: {reason}")]
    InvalidControl {
        /// Decoder diagnostic.
        reason: String,
    },
}

/// A registered persistent search.
pub struct PersistentSearch {
    key: OperationKey,
    base_dn: Dn,
    scope: SearchScope,
    filter: SearchFilter,
    attributes: Vec<String>,
    control: PersistentSearchControl,
    sink: Arc<dyn SearchResultSink>,
    cancelled: AtomicBool,
}

impl PersistentSearch {
    /// Builds a persistent search from its parts.
    #[must_use]
    pub fn new(
        key: OperationKey,
        base_dn: Dn,
        scope: SearchScope,
        filter: SearchFilter,
        attributes: Vec<String>,
        control: PersistentSearchControl,
        sink: Arc<dyn SearchResultSink>,
    ) -> Self {
        Self {
            key,
            base_dn,
            scope,
            filter,
            attributes,
            control,
            sink,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Captures the decoded search parameters of `operation`.
    ///
    /// Returns `None` for non-search operations or before decoding.
    pub(crate) fn from_operation(
        operation: &Operation,
        control: PersistentSearchControl,
    ) -> Option<Self> {
        let Request::Search(search) = operation.request() else {
            return None;
        };
        Some(Self::new(
            operation.key(),
            operation.dn()?.clone(),
            operation.scope(),
            operation.filter()?.clone(),
            search.attributes.clone(),
            control,
            Arc::clone(&search.sink),
        ))
    }

    /// Identity of the owning search operation.
    #[must_use]
    pub const fn key(&self) -> OperationKey {
        self.key
    }

    /// Search base.
    #[must_use]
    pub const fn base_dn(&self) -> &Dn {
        &self.base_dn
    }

    /// Search scope.
    #[must_use]
    pub const fn scope(&self) -> SearchScope {
        self.scope
    }

    /// Change types the search subscribed to.
    #[must_use]
    pub const fn change_types(&self) -> ChangeTypes {
        self.control.change_types()
    }

    /// Returns `true` once the search has been cancelled or deregistered.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Marks the search cancelled; returns `false` if it already was.
    pub(crate) fn mark_cancelled(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    fn in_scope(&self, dn: &Dn) -> bool {
        self.scope.matches(&self.base_dn, dn)
    }

    fn wants(&self, change: ChangeType) -> bool {
        !self.is_cancelled() && self.control.change_types().contains(change)
    }

    fn notify(
        &self,
        entry: &Entry,
        change: ChangeType,
        previous_dn: Option<&Dn>,
    ) -> Result<bool, DeliveryError> {
        let projected = project_entry(entry, &self.attributes);
        let controls = if self.control.return_ecs() {
            vec![EntryChangeNotification::new(change, previous_dn.cloned()).to_control()]
        } else {
            Vec::new()
        };
        self.sink.return_entry(&projected, &controls)
    }

    fn finish(&self, code: ResultCode, message: &str) -> Result<(), DeliveryError> {
        self.sink.send_search_result_done(code, message)
    }
}

impl fmt::Debug for PersistentSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentSearch")
            .field("key", &self.key)
            .field("base_dn", &self.base_dn)
            .field("scope", &self.scope)
            .field("filter", &self.filter)
            .field("control", &self.control)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
