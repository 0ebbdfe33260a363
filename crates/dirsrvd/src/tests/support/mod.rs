//! Test harness utilities shared by the unit and behavioural suites.

mod config_loader;
mod directory_world;
mod doubles;
mod reporter;
mod requests;
mod world;

pub use config_loader::{FailingConfigLoader, TestConfigLoader, UnwritableInstanceLoader};
pub use directory_world::{DirectoryWorld, directory_world};
pub use doubles::{RecordingConnection, RecordingHandler, RecordingSink, SentResponse, SinkBehaviour};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use requests::{add_request, dn, operation, person, search_request};
pub use world::{TestWorld, world};
