//! Derives on-disk locations inside a server instance directory.
//!
//! The compressed schema file lives in the instance `config` directory next to
//! its `.save` backup; both the daemon and offline tooling resolve it here so
//! they agree on the layout.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Config;

/// File name of the compressed schema dictionary within the config directory.
pub const COMPRESSED_SCHEMA_FILE_NAME: &str = "compressed-schema";

/// Canonical paths for persisted server state.
#[derive(Debug, Clone)]
pub struct InstancePaths {
    instance_dir: Utf8PathBuf,
    config_dir: Utf8PathBuf,
    compressed_schema_path: Utf8PathBuf,
}

impl InstancePaths {
    /// Derives paths from the configuration and creates the config directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the config directory cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, InstancePathsError> {
        Self::prepare(config.instance_dir())
    }

    /// Derives paths rooted at `instance_dir` and creates the config directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the config directory cannot be created.
    pub fn prepare(instance_dir: &Utf8Path) -> Result<Self, InstancePathsError> {
        let config_dir = instance_dir.join("config");
        fs::create_dir_all(&config_dir).map_err(|source| InstancePathsError::ConfigDirectory {
            path: config_dir.clone(),
            source,
        })?;
        Ok(Self {
            compressed_schema_path: config_dir.join(COMPRESSED_SCHEMA_FILE_NAME),
            config_dir,
            instance_dir: instance_dir.to_path_buf(),
        })
    }

    /// Root of the server instance.
    #[must_use]
    pub fn instance_dir(&self) -> &Utf8Path {
        &self.instance_dir
    }

    /// Directory holding instance configuration files.
    #[must_use]
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Live compressed schema file.
    #[must_use]
    pub fn compressed_schema_path(&self) -> &Utf8Path {
        &self.compressed_schema_path
    }

    /// Backup written aside while the compressed schema is replaced.
    #[must_use]
    pub fn compressed_schema_backup_path(&self) -> Utf8PathBuf {
        let mut path = self.compressed_schema_path.clone().into_string();
        path.push_str(".save");
        Utf8PathBuf::from(path)
    }
}

/// Errors raised while preparing instance paths.
#[derive(Debug, Error)]
pub enum InstancePathsError {
    /// Creating the instance config directory failed.
    #[error("failed to prepare config directory '{path}': {source}")]
    ConfigDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_schema_paths_under_config_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let config = Config {
            instance_dir: root.clone(),
            ..Config::default()
        };

        let paths = InstancePaths::from_config(&config).expect("paths should derive");

        assert_eq!(paths.instance_dir(), root);
        assert!(paths.config_dir().is_dir());
        assert!(paths.compressed_schema_path().ends_with("config/compressed-schema"));
        assert_eq!(
            paths.compressed_schema_backup_path().file_name(),
            Some("compressed-schema.save")
        );
    }

    #[test]
    fn reports_unwritable_instance_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, b"not a directory").expect("write blocker");
        let root = Utf8PathBuf::from_path_buf(blocker).expect("utf-8 path");

        let error = InstancePaths::prepare(&root).expect_err("file blocks directory creation");

        assert!(matches!(error, InstancePathsError::ConfigDirectory { .. }));
    }
}
