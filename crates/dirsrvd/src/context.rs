//! Process-wide services shared by every operation.
//!
//! A [`ServerContext`] is built once at startup and handed to
//! [`crate::Operation::run`]. It owns the routing tree, the persistent search
//! registry, and the in-flight operation registry, and holds the pluggable
//! services (plugins, access control, access log, extended operations) as
//! trait objects selected at construction time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use dirsrv_config::Config;
use dirsrv_types::ResultCode;

use crate::compressed_schema::CompressedSchema;
use crate::operation::{
    AccessControlHandler, AccessLogger, AllowAllAccessControl, CancelRequest, CancelResult,
    ExtendedOperationHandler, NoopPluginManager, OperationRegistry, PluginManager,
    TracingAccessLogger,
};
use crate::psearch::{PERSISTENT_SEARCH_OID, PersistentSearchRegistry};
use crate::workflow::WorkflowTree;

const CONTEXT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::context");

/// Runtime policy derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    cancel_timeout: Duration,
    server_error_result_code: ResultCode,
    max_persistent_searches: Option<usize>,
}

impl ServerSettings {
    /// Builds settings from explicit values.
    #[must_use]
    pub const fn new(
        cancel_timeout: Duration,
        server_error_result_code: ResultCode,
        max_persistent_searches: Option<usize>,
    ) -> Self {
        Self {
            cancel_timeout,
            server_error_result_code,
            max_persistent_searches,
        }
    }

    /// Resolves settings from the loaded configuration.
    ///
    /// An unknown server-error result code falls back to `Other`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let code = config.server_error_result_code();
        let server_error_result_code = ResultCode::from_int(code).unwrap_or_else(|| {
            debug!(
                target: CONTEXT_TARGET,
                code,
                "unknown server error result code; using other"
            );
            ResultCode::Other
        });
        Self::new(
            config.cancel_timeout(),
            server_error_result_code,
            config.max_persistent_searches(),
        )
    }

    /// Upper bound a canceller waits for the cancellation outcome.
    #[must_use]
    pub const fn cancel_timeout(&self) -> Duration {
        self.cancel_timeout
    }

    /// Code substituted when an operation finishes without a result.
    #[must_use]
    pub const fn server_error_result_code(&self) -> ResultCode {
        self.server_error_result_code
    }

    /// Cap on concurrent persistent searches.
    #[must_use]
    pub const fn max_persistent_searches(&self) -> Option<usize> {
        self.max_persistent_searches
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Services shared by every operation.
pub struct ServerContext {
    settings: ServerSettings,
    workflows: WorkflowTree,
    persistent_searches: PersistentSearchRegistry,
    operations: OperationRegistry,
    plugins: Arc<dyn PluginManager>,
    access_control: Arc<dyn AccessControlHandler>,
    access_logger: Arc<dyn AccessLogger>,
    extended_handlers: HashMap<String, Arc<dyn ExtendedOperationHandler>>,
    supported_controls: HashSet<String>,
    schema: Option<Arc<CompressedSchema>>,
}

impl ServerContext {
    /// Starts building a context.
    #[must_use]
    pub fn builder(settings: ServerSettings) -> ServerContextBuilder {
        ServerContextBuilder::new(settings)
    }

    /// Runtime policy.
    #[must_use]
    pub const fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Routing tree.
    #[must_use]
    pub const fn workflows(&self) -> &WorkflowTree {
        &self.workflows
    }

    /// Registered persistent searches.
    #[must_use]
    pub const fn persistent_searches(&self) -> &PersistentSearchRegistry {
        &self.persistent_searches
    }

    /// Operations currently being processed.
    #[must_use]
    pub const fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    /// Plugin hooks.
    #[must_use]
    pub fn plugins(&self) -> &dyn PluginManager {
        self.plugins.as_ref()
    }

    /// Access decision service.
    #[must_use]
    pub fn access_control(&self) -> &dyn AccessControlHandler {
        self.access_control.as_ref()
    }

    /// Access log sink.
    #[must_use]
    pub fn access_logger(&self) -> &dyn AccessLogger {
        self.access_logger.as_ref()
    }

    /// Handler registered for an extended operation OID.
    #[must_use]
    pub fn extended_handler(&self, oid: &str) -> Option<Arc<dyn ExtendedOperationHandler>> {
        self.extended_handlers.get(oid).cloned()
    }

    /// Returns `true` when the core understands the control OID.
    #[must_use]
    pub fn supports_control(&self, oid: &str) -> bool {
        self.supported_controls.contains(oid)
    }

    /// Compressed schema tables, when loaded.
    #[must_use]
    pub fn schema(&self) -> Option<&Arc<CompressedSchema>> {
        self.schema.as_ref()
    }

    /// Cancels the operation started by `message_id` on `connection_id`.
    ///
    /// In-flight operations are asked to stop and the caller waits up to the
    /// configured bound. A persistent search registered under the same
    /// message ID is ended at once and reported as `Canceled`.
    pub fn cancel(
        &self,
        connection_id: u64,
        message_id: i32,
        request: CancelRequest,
    ) -> CancelResult {
        let Some(handle) = self.operations.find(connection_id, message_id) else {
            return if self.persistent_searches.cancel(connection_id, message_id) {
                CancelResult::Canceled
            } else {
                CancelResult::NoSuchOperation
            };
        };
        handle.request(request);
        if self.persistent_searches.cancel(connection_id, message_id) {
            return CancelResult::Canceled;
        }
        handle.wait(self.settings.cancel_timeout())
    }

    /// Abandons an operation; the outcome is not reported to the client.
    ///
    /// Returns `false` when nothing matched.
    pub fn abandon(&self, connection_id: u64, message_id: i32) -> bool {
        let request = CancelRequest::new(format!("abandoned by message ID {message_id}"));
        let Some(handle) = self.operations.find(connection_id, message_id) else {
            return self.persistent_searches.cancel(connection_id, message_id);
        };
        handle.request(request);
        self.persistent_searches.cancel(connection_id, message_id);
        true
    }

    /// Cancels everything a disconnected client left behind.
    pub fn disconnect_client(&self, connection_id: u64) {
        let in_flight = self.operations.for_connection(connection_id);
        for handle in &in_flight {
            handle.request(CancelRequest::new("the client connection was closed"));
        }
        let searches = self.persistent_searches.cancel_for_connection(connection_id);
        debug!(
            target: CONTEXT_TARGET,
            conn = connection_id,
            in_flight = in_flight.len(),
            persistent_searches = searches,
            "client disconnected"
        );
    }

    /// Ends all persistent searches.
    pub fn shutdown(&self) {
        info!(
            target: CONTEXT_TARGET,
            persistent_searches = self.persistent_searches.len(),
            in_flight = self.operations.len(),
            "server context shutting down"
        );
        self.persistent_searches.shutdown();
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("settings", &self.settings)
            .field("workflows", &self.workflows)
            .field("persistent_searches", &self.persistent_searches.len())
            .field("operations", &self.operations.len())
            .field("supported_controls", &self.supported_controls)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`ServerContext`] with default services unless overridden.
pub struct ServerContextBuilder {
    settings: ServerSettings,
    plugins: Arc<dyn PluginManager>,
    access_control: Arc<dyn AccessControlHandler>,
    access_logger: Arc<dyn AccessLogger>,
    extended_handlers: HashMap<String, Arc<dyn ExtendedOperationHandler>>,
    supported_controls: HashSet<String>,
    schema: Option<Arc<CompressedSchema>>,
}

impl ServerContextBuilder {
    fn new(settings: ServerSettings) -> Self {
        Self {
            settings,
            plugins: Arc::new(NoopPluginManager),
            access_control: Arc::new(AllowAllAccessControl),
            access_logger: Arc::new(TracingAccessLogger),
            extended_handlers: HashMap::new(),
            supported_controls: HashSet::from([PERSISTENT_SEARCH_OID.to_owned()]),
            schema: None,
        }
    }

    /// Replaces the plugin manager.
    #[must_use]
    pub fn plugins(mut self, plugins: Arc<dyn PluginManager>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Replaces the access control handler.
    #[must_use]
    pub fn access_control(mut self, handler: Arc<dyn AccessControlHandler>) -> Self {
        self.access_control = handler;
        self
    }

    /// Replaces the access logger.
    #[must_use]
    pub fn access_logger(mut self, logger: Arc<dyn AccessLogger>) -> Self {
        self.access_logger = logger;
        self
    }

    /// Registers an extended operation handler under its OID.
    #[must_use]
    pub fn extended_handler(mut self, handler: Arc<dyn ExtendedOperationHandler>) -> Self {
        self.extended_handlers
            .insert(handler.oid().to_owned(), handler);
        self
    }

    /// Declares a request control the core accepts even when critical.
    #[must_use]
    pub fn supported_control(mut self, oid: impl Into<String>) -> Self {
        self.supported_controls.insert(oid.into());
        self
    }

    /// Attaches loaded compressed schema tables.
    #[must_use]
    pub fn schema(mut self, schema: Arc<CompressedSchema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Finishes the context with an empty routing tree.
    #[must_use]
    pub fn build(self) -> ServerContext {
        ServerContext {
            persistent_searches: PersistentSearchRegistry::new(
                self.settings.max_persistent_searches(),
            ),
            settings: self.settings,
            workflows: WorkflowTree::new(),
            operations: OperationRegistry::new(),
            plugins: self.plugins,
            access_control: self.access_control,
            access_logger: self.access_logger,
            extended_handlers: self.extended_handlers,
            supported_controls: self.supported_controls,
            schema: self.schema,
        }
    }
}
