//! Plugin hook points invoked by the operation lifecycle.

use super::Operation;
use super::local::LocalOperation;

/// Decision returned by pre-parse plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreParseResult {
    /// Process the operation normally.
    Continue,
    /// Drop the client connection; nothing further is processed or sent.
    TerminateConnection {
        /// Reason recorded on the operation and reported on disconnect.
        reason: String,
    },
    /// Send the response right away, skipping core processing and
    /// post-operation plugins.
    SendResponseImmediately,
    /// Skip core processing but still run post-operation plugins.
    SkipCoreProcessing,
}

/// Decision returned by post-operation plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOperationResult {
    /// Continue to the response phase.
    Continue,
    /// Drop the client connection without sending a response.
    TerminateConnection {
        /// Reason recorded on the operation and reported on disconnect.
        reason: String,
    },
}

/// Hook points for server plugins.
pub trait PluginManager: Send + Sync {
    /// Runs before the request is logged or decoded.
    fn pre_parse(&self, operation: &mut Operation) -> PreParseResult;

    /// Runs after core processing, before the response is sent.
    fn post_operation(&self, operation: &mut Operation) -> PostOperationResult;

    /// Runs after the response was sent, once per side-effect record or once
    /// for the operation when it produced none.
    fn post_response(&self, operation: &Operation, record: Option<&LocalOperation>);
}

/// Plugin manager with no plugins configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPluginManager;

impl PluginManager for NoopPluginManager {
    fn pre_parse(&self, _operation: &mut Operation) -> PreParseResult {
        PreParseResult::Continue
    }

    fn post_operation(&self, _operation: &mut Operation) -> PostOperationResult {
        PostOperationResult::Continue
    }

    fn post_response(&self, _operation: &Operation, _record: Option<&LocalOperation>) {}
}
