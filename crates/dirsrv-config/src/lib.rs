//! Layered configuration shared by the directory server binaries.
//!
//! Values are resolved by `ortho_config` from built-in defaults, an optional
//! configuration file (`--config-path` or `DIRSRV_CONFIG_PATH`), `DIRSRV_*`
//! environment variables, and finally command-line flags, with later layers
//! overriding earlier ones.

mod defaults;
mod logging;
mod paths;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CANCEL_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_SERVER_ERROR_RESULT_CODE,
    UNLIMITED_PERSISTENT_SEARCHES, default_instance_dir, default_log_filter,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{COMPRESSED_SCHEMA_FILE_NAME, InstancePaths, InstancePathsError};

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "DIRSRV")]
pub struct Config {
    /// `tracing-subscriber` filter expression, e.g. `info,dirsrvd::psearch=debug`.
    #[serde(default = "defaults::default_log_filter_string")]
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "defaults::default_log_format")]
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Server instance directory holding configuration and persisted state.
    #[serde(default = "defaults::default_instance_dir")]
    #[ortho_config(default = defaults::default_instance_dir())]
    pub instance_dir: Utf8PathBuf,
    /// Upper bound, in milliseconds, that a cancel request waits for the
    /// target operation to publish its cancellation outcome.
    #[serde(default = "defaults::default_cancel_timeout_ms")]
    #[ortho_config(default = DEFAULT_CANCEL_TIMEOUT_MS)]
    pub cancel_timeout_ms: u64,
    /// Result code reported when an operation fails for an internal reason.
    #[serde(default = "defaults::default_server_error_result_code")]
    #[ortho_config(default = DEFAULT_SERVER_ERROR_RESULT_CODE)]
    pub server_error_result_code: i32,
    /// Maximum number of concurrently registered persistent searches; `-1`
    /// disables the limit.
    #[serde(default = "defaults::default_max_persistent_searches")]
    #[ortho_config(default = UNLIMITED_PERSISTENT_SEARCHES)]
    pub max_persistent_searches: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
            instance_dir: default_instance_dir(),
            cancel_timeout_ms: DEFAULT_CANCEL_TIMEOUT_MS,
            server_error_result_code: DEFAULT_SERVER_ERROR_RESULT_CODE,
            max_persistent_searches: UNLIMITED_PERSISTENT_SEARCHES,
        }
    }
}

impl Config {
    /// Filter expression handed to the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Configured log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Server instance directory.
    #[must_use]
    pub fn instance_dir(&self) -> &camino::Utf8Path {
        &self.instance_dir
    }

    /// Cancel wait bound as a [`std::time::Duration`].
    #[must_use]
    pub const fn cancel_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cancel_timeout_ms)
    }

    /// Numeric result code used as the catch-all for internal failures.
    #[must_use]
    pub const fn server_error_result_code(&self) -> i32 {
        self.server_error_result_code
    }

    /// Persistent search limit, `None` when unlimited.
    #[must_use]
    pub fn max_persistent_searches(&self) -> Option<usize> {
        usize::try_from(self.max_persistent_searches).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.cancel_timeout(), std::time::Duration::from_secs(5));
        assert_eq!(config.server_error_result_code(), 80);
        assert_eq!(config.max_persistent_searches(), None);
    }

    #[test]
    fn non_negative_limit_is_enforced() {
        let config = Config {
            max_persistent_searches: 3,
            ..Config::default()
        };
        assert_eq!(config.max_persistent_searches(), Some(3));
    }
}
