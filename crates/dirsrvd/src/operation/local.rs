//! Side-effect records attached by handlers for post-response replay.

use dirsrv_types::Entry;

use super::request::{Modification, OperationType};

/// One change applied to local storage by a workflow handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOperation {
    /// An entry was created.
    Add {
        /// Entry as stored.
        entry: Entry,
    },
    /// An entry was removed.
    Delete {
        /// Entry as it was before removal.
        entry: Entry,
    },
    /// An entry's attributes changed.
    Modify {
        /// Entry before the change.
        old: Entry,
        /// Entry after the change.
        new: Entry,
        /// Applied modifications.
        modifications: Vec<Modification>,
    },
    /// An entry was renamed or moved.
    ModifyDn {
        /// Entry under its former DN.
        old: Entry,
        /// Entry under its new DN.
        new: Entry,
    },
}

impl LocalOperation {
    /// Operation type that produced the record.
    #[must_use]
    pub const fn operation_type(&self) -> OperationType {
        match self {
            Self::Add { .. } => OperationType::Add,
            Self::Delete { .. } => OperationType::Delete,
            Self::Modify { .. } => OperationType::Modify,
            Self::ModifyDn { .. } => OperationType::ModifyDn,
        }
    }

    /// Entry affected by the change, in its final state.
    #[must_use]
    pub const fn entry(&self) -> &Entry {
        match self {
            Self::Add { entry } | Self::Delete { entry } => entry,
            Self::Modify { new, .. } | Self::ModifyDn { new, .. } => new,
        }
    }
}
