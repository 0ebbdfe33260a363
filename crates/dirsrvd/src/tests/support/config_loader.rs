//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig as _, OrthoError};
use tempfile::TempDir;

use dirsrv_config::Config;

use crate::bootstrap::ConfigLoader;

/// Loader that roots the instance directory in a temporary directory.
pub struct TestConfigLoader {
    instance_dir: TempDir,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            instance_dir: TempDir::new().expect("failed to create temporary instance directory"),
        }
    }

    #[must_use]
    pub fn instance_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.instance_dir.path().to_path_buf())
            .expect("temporary instance path was not valid UTF-8")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            instance_dir: self.instance_dir(),
            cancel_timeout_ms: 200,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("dirsrvd"),
            OsString::from("--log-format"),
            OsString::from("xml"),
        ];
        Config::load_from_iter(args)
    }
}

/// Loader whose instance directory sits beneath a regular file, so the
/// config directory cannot be created.
pub struct UnwritableInstanceLoader {
    root: TempDir,
}

impl UnwritableInstanceLoader {
    #[must_use]
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temporary directory");
        std::fs::write(root.path().join("blocker"), b"not a directory")
            .expect("failed to create blocking file");
        Self { root }
    }
}

impl ConfigLoader for UnwritableInstanceLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let blocked = self.root.path().join("blocker").join("instance");
        Ok(Config {
            instance_dir: Utf8PathBuf::from_path_buf(blocked)
                .expect("temporary instance path was not valid UTF-8"),
            ..Config::default()
        })
    }
}
