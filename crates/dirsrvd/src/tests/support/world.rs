//! BDD test world for the bootstrap scenarios.

use std::cell::RefCell;
use std::sync::Arc;

use dirsrv_types::Dn;

use crate::bootstrap::{
    BootstrapError, ConfigLoader, DirectoryServer, ServerComponents, bootstrap_with,
};
use crate::workflow::{Workflow, WorkflowError};

use super::config_loader::{FailingConfigLoader, TestConfigLoader, UnwritableInstanceLoader};
use super::doubles::RecordingHandler;
use super::reporter::RecordingHealthReporter;

/// Scenario world shared across bootstrap steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    server: Option<DirectoryServer>,
    bootstrap_error: Option<BootstrapError>,
    workflow_result: Option<Result<Workflow, WorkflowError>>,
}

impl TestWorld {
    /// Builds a world with a successful configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            server: None,
            bootstrap_error: None,
            workflow_result: None,
        }
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
        self.reset_results();
    }

    /// Installs a loader that succeeds.
    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader::new());
        self.reset_results();
    }

    /// Installs a loader whose instance directory cannot be created.
    pub fn use_unwritable_instance(&mut self) {
        self.loader = Box::new(UnwritableInstanceLoader::new());
        self.reset_results();
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.server.is_some() || self.bootstrap_error.is_some() {
            return;
        }

        match bootstrap_with(
            &*self.loader,
            self.reporter.clone(),
            ServerComponents::default(),
        ) {
            Ok(server) => self.server = Some(server),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Returns whether bootstrap produced an error.
    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Returns the running server, if bootstrap succeeded.
    #[must_use]
    pub fn server(&self) -> Option<&DirectoryServer> {
        self.server.as_ref()
    }

    /// Registers a naming context on the running server.
    pub fn register_workflow(&mut self, base_dn: Dn) {
        let Some(server) = self.server.as_ref() else {
            return;
        };
        self.workflow_result =
            Some(server.register_workflow(base_dn, RecordingHandler::succeeding()));
    }

    /// Returns the last workflow registration outcome.
    #[must_use]
    pub fn workflow_result(&self) -> Option<&Result<Workflow, WorkflowError>> {
        self.workflow_result.as_ref()
    }

    /// Shuts the running server down.
    pub fn shutdown(&self) {
        if let Some(server) = self.server.as_ref() {
            server.shutdown();
        }
    }

    fn reset_results(&mut self) {
        self.server = None;
        self.bootstrap_error = None;
        self.workflow_result = None;
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
