//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::sync::Mutex;

use dirsrv_config::Config;
use dirsrv_types::Dn;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::workflow::WorkflowError;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// A naming context was registered.
    WorkflowRegistered(Dn),
    /// A naming context change was rejected.
    WorkflowFailed(String),
    /// Shutdown began.
    ShutdownStarting,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn workflow_registered(&self, base_dn: &Dn) {
        self.record(HealthEvent::WorkflowRegistered(base_dn.clone()));
    }

    fn workflow_failed(&self, error: &WorkflowError) {
        self.record(HealthEvent::WorkflowFailed(error.to_string()));
    }

    fn shutdown_starting(&self) {
        self.record(HealthEvent::ShutdownStarting);
    }
}
