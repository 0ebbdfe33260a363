//! Access-control decision seam.

use super::Operation;

/// Yes/no policy decision consulted before core processing.
pub trait AccessControlHandler: Send + Sync {
    /// Returns `true` when the requester may perform `operation`.
    fn is_allowed(&self, operation: &Operation) -> bool;
}

/// Handler that permits every operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllAccessControl;

impl AccessControlHandler for AllowAllAccessControl {
    fn is_allowed(&self, _operation: &Operation) -> bool {
        true
    }
}
