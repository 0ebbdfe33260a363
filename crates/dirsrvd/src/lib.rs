//! Request-processing core of the directory server.
//!
//! A protocol front-end decodes client requests into [`Operation`]s and runs
//! each one on a worker thread with [`Operation::run`]. The run drives the
//! operation through plugin hooks, decoding, access control, routing to the
//! naming context that owns the target DN, handler execution, and the
//! response phase, honouring cooperative cancellation at every phase
//! boundary.
//!
//! Shared state lives in a [`ServerContext`] built at startup by
//! [`bootstrap_with`]:
//!
//! - the [`WorkflowTree`] mapping base DNs to backend handlers, with subtree
//!   fan-out for searches spanning several naming contexts;
//! - the [`PersistentSearchRegistry`] that replays committed changes to
//!   long-running searches;
//! - the in-flight [`OperationRegistry`] used by abandon and cancel.
//!
//! The [`compressed_schema`] module maps object-class sets and attribute
//! descriptions to compact tokens for entry encoding, persisting the
//! dictionary under the instance's `config` directory.

mod bootstrap;
pub mod compressed_schema;
mod context;
mod health;
pub mod operation;
pub mod psearch;
mod telemetry;
pub mod workflow;

pub use bootstrap::{
    BootstrapError, ConfigLoader, DirectoryServer, ServerComponents, StaticConfigLoader,
    SystemConfigLoader, bootstrap_with,
};
pub use compressed_schema::{CompressedSchema, CompressedSchemaError};
pub use context::{ServerContext, ServerContextBuilder, ServerSettings};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use operation::{Operation, OperationKey, OperationRegistry};
pub use psearch::{PersistentSearch, PersistentSearchError, PersistentSearchRegistry};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use workflow::{Workflow, WorkflowError, WorkflowHandler, WorkflowTree};

#[cfg(test)]
mod tests;
