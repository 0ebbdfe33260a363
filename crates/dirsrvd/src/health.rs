//! Structured health reporting for server lifecycle events.

use std::sync::Arc;

use dirsrv_config::Config;
use dirsrv_types::Dn;

use crate::bootstrap::BootstrapError;
use crate::workflow::WorkflowError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked after a naming context is registered.
    fn workflow_registered(&self, base_dn: &Dn);

    /// Invoked when a naming context cannot be registered or removed.
    fn workflow_failed(&self, error: &WorkflowError);

    /// Invoked when the server begins shutting down.
    fn shutdown_starting(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn workflow_registered(&self, base_dn: &Dn) {
        (**self).workflow_registered(base_dn);
    }

    fn workflow_failed(&self, error: &WorkflowError) {
        (**self).workflow_failed(error);
    }

    fn shutdown_starting(&self) {
        (**self).shutdown_starting();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting directory server bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            instance_dir = %config.instance_dir(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            cancel_timeout_ms = config.cancel_timeout_ms,
            "directory server bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "directory server bootstrap failed"
        );
    }

    fn workflow_registered(&self, base_dn: &Dn) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "workflow_registered",
            base_dn = %base_dn,
            "naming context registered"
        );
    }

    fn workflow_failed(&self, error: &WorkflowError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "workflow_failed",
            error = %error,
            "naming context change rejected"
        );
    }

    fn shutdown_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_starting",
            "directory server shutting down"
        );
    }
}
