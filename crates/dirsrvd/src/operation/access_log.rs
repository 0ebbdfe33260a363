//! Access log seam and its `tracing` implementation.

use tracing::info;

use super::Operation;

pub(crate) const ACCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::access");

/// Receives exactly one request and one response record per operation.
pub trait AccessLogger: Send + Sync {
    /// Records the incoming request.
    fn log_request(&self, operation: &Operation);

    /// Records the outcome.
    fn log_response(&self, operation: &Operation);
}

/// Access logger emitting structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAccessLogger;

impl AccessLogger for TracingAccessLogger {
    fn log_request(&self, operation: &Operation) {
        let key = operation.key();
        info!(
            target: ACCESS_TARGET,
            event = "request",
            conn = key.connection_id,
            op = key.operation_id,
            msg = key.message_id,
            kind = %operation.operation_type(),
            dn = operation.request().raw_dn().unwrap_or_default(),
            "request received"
        );
    }

    fn log_response(&self, operation: &Operation) {
        let key = operation.key();
        let etime_ms = operation
            .processing_time()
            .map_or(0, |elapsed| elapsed.as_millis());
        info!(
            target: ACCESS_TARGET,
            event = "response",
            conn = key.connection_id,
            op = key.operation_id,
            msg = key.message_id,
            kind = %operation.operation_type(),
            result = operation.result_code().as_int(),
            message = operation.error_message(),
            matched_dn = operation.matched_dn().map(ToString::to_string).unwrap_or_default(),
            entries = operation.entries_sent(),
            persistent = operation.is_persistent_search_registered(),
            etime_ms,
            "response sent"
        );
    }
}
