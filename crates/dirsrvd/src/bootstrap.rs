//! Directory server bootstrap orchestration.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig as _, OrthoError};
use thiserror::Error;

use dirsrv_config::{Config, InstancePaths, InstancePathsError};
use dirsrv_types::Dn;

use crate::compressed_schema::{CompressedSchema, CompressedSchemaError};
use crate::context::{ServerContext, ServerSettings};
use crate::health::HealthReporter;
use crate::operation::{
    AccessControlHandler, AccessLogger, AllowAllAccessControl, ExtendedOperationHandler,
    NoopPluginManager, PluginManager, TracingAccessLogger,
};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::workflow::{Workflow, WorkflowError, WorkflowHandler};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that resolves the layered configuration from defaults, files, the
/// environment and command-line arguments.
///
/// The default loader reads the process arguments through [`Config::load`].
#[derive(Debug, Default, Clone)]
pub struct SystemConfigLoader {
    args: Option<Vec<OsString>>,
}

impl SystemConfigLoader {
    /// Loader that parses `args` in place of the process arguments. The first
    /// item is the binary name.
    #[must_use]
    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self {
            args: Some(args.into_iter().map(Into::into).collect()),
        }
    }
}

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        match &self.args {
            Some(args) => Config::load_from_iter(args.iter().cloned()),
            None => Config::load(),
        }
    }
}

/// Loader that returns a configuration resolved elsewhere, for embedding the
/// server in a host process.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The instance directory layout could not be created.
    #[error("failed to prepare instance directory: {source}")]
    Paths {
        /// Filesystem error reported while preparing the directories.
        #[source]
        source: InstancePathsError,
    },
    /// The compressed schema file could not be loaded.
    #[error("failed to load compressed schema: {source}")]
    Schema {
        /// Underlying load error.
        #[source]
        source: CompressedSchemaError,
    },
}

/// Pluggable services wired into the server context.
pub struct ServerComponents {
    /// Plugin hooks.
    pub plugins: Arc<dyn PluginManager>,
    /// Access decision service.
    pub access_control: Arc<dyn AccessControlHandler>,
    /// Access log sink.
    pub access_logger: Arc<dyn AccessLogger>,
    /// Extended operation handlers, keyed by their OID.
    pub extended_handlers: Vec<Arc<dyn ExtendedOperationHandler>>,
}

impl Default for ServerComponents {
    fn default() -> Self {
        Self {
            plugins: Arc::new(NoopPluginManager),
            access_control: Arc::new(AllowAllAccessControl),
            access_logger: Arc::new(TracingAccessLogger),
            extended_handlers: Vec::new(),
        }
    }
}

/// Result of a successful bootstrap invocation.
pub struct DirectoryServer {
    config: Config,
    paths: InstancePaths,
    context: Arc<ServerContext>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl DirectoryServer {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Instance directory layout.
    #[must_use]
    pub const fn paths(&self) -> &InstancePaths {
        &self.paths
    }

    /// Shared services handed to every operation.
    #[must_use]
    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.context)
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Registers a naming context served by `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Duplicate`] when `base_dn` is already served.
    pub fn register_workflow(
        &self,
        base_dn: Dn,
        handler: Arc<dyn WorkflowHandler>,
    ) -> Result<Workflow, WorkflowError> {
        match self.context.workflows().insert(base_dn, handler) {
            Ok(workflow) => {
                self.reporter.workflow_registered(workflow.base_dn());
                Ok(workflow)
            }
            Err(error) => {
                self.reporter.workflow_failed(&error);
                Err(error)
            }
        }
    }

    /// Stops serving the naming context at `base_dn`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] when nothing is registered there.
    pub fn remove_workflow(&self, base_dn: &Dn) -> Result<(), WorkflowError> {
        self.context
            .workflows()
            .remove(base_dn)
            .inspect_err(|error| self.reporter.workflow_failed(error))
    }

    /// Ends persistent searches and reports shutdown.
    pub fn shutdown(&self) {
        self.reporter.shutdown_starting();
        self.context.shutdown();
    }
}

/// Bootstraps the server using the supplied collaborators.
///
/// # Errors
///
/// Fails when configuration, telemetry, instance directories, or the
/// compressed schema cannot be initialised.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    components: ServerComponents,
) -> Result<DirectoryServer, BootstrapError> {
    reporter.bootstrap_starting();

    let fail = |error: BootstrapError| {
        reporter.bootstrap_failed(&error);
        error
    };

    let config = loader
        .load()
        .map_err(|source| fail(BootstrapError::Configuration { source }))?;
    let telemetry = telemetry::initialise(&config)
        .map_err(|source| fail(BootstrapError::Telemetry { source }))?;
    let paths = InstancePaths::from_config(&config)
        .map_err(|source| fail(BootstrapError::Paths { source }))?;
    let schema = CompressedSchema::open_instance(&paths)
        .map_err(|source| fail(BootstrapError::Schema { source }))?;

    let mut builder = ServerContext::builder(ServerSettings::from_config(&config))
        .plugins(components.plugins)
        .access_control(components.access_control)
        .access_logger(components.access_logger)
        .schema(Arc::new(schema));
    for handler in components.extended_handlers {
        builder = builder.extended_handler(handler);
    }
    let context = Arc::new(builder.build());

    reporter.bootstrap_succeeded(&config);
    Ok(DirectoryServer {
        config,
        paths,
        context,
        telemetry,
        reporter,
    })
}
