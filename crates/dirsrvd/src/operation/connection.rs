//! Seams towards the protocol layer that owns client connections.

use thiserror::Error;

use dirsrv_types::{Control, Entry, ResultCode};

use super::Operation;

/// Failure reported by a search result consumer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("search result delivery failed: {message}")]
pub struct DeliveryError {
    message: String,
}

impl DeliveryError {
    /// Builds an error from a diagnostic message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Diagnostic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Client connection that receives operation responses.
pub trait ClientConnection: Send + Sync {
    /// Identifier assigned when the client connected.
    fn connection_id(&self) -> u64;

    /// Writes the final response for `operation`.
    fn send_response(&self, operation: &Operation);

    /// Closes the connection, reporting `result` and `message` to the client
    /// where the protocol allows it.
    fn disconnect(&self, result: ResultCode, message: &str);
}

/// Consumer of streamed search results.
pub trait SearchResultSink: Send + Sync {
    /// Delivers one entry with its response controls.
    ///
    /// Returns `Ok(false)` when the consumer wants no further entries.
    ///
    /// # Errors
    ///
    /// Returns an error when the entry could not be delivered.
    fn return_entry(&self, entry: &Entry, controls: &[Control]) -> Result<bool, DeliveryError>;

    /// Completes the search with a final result.
    ///
    /// # Errors
    ///
    /// Returns an error when the completion could not be delivered.
    fn send_search_result_done(
        &self,
        result: ResultCode,
        message: &str,
    ) -> Result<(), DeliveryError>;
}
