use std::process::ExitCode;
use std::sync::Arc;

use dirsrvd::{ServerComponents, StructuredHealthReporter, SystemConfigLoader, bootstrap_with};

fn main() -> ExitCode {
    let reporter = Arc::new(StructuredHealthReporter::new());
    match bootstrap_with(&SystemConfigLoader::default(), reporter, ServerComponents::default()) {
        Ok(server) => {
            server.shutdown();
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::FAILURE,
    }
}
