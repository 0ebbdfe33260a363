//! Handlers for extended operations, selected by request OID.

use super::Operation;

/// Processes one extended operation OID.
///
/// Handlers set the result code on the operation and may answer early with
/// [`Operation::send_response`] when the protocol requires a response before
/// follow-up work.
pub trait ExtendedOperationHandler: Send + Sync {
    /// Request OID served by this handler.
    fn oid(&self) -> &str;

    /// Processes the request.
    fn process(&self, operation: &mut Operation);
}
