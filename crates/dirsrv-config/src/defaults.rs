use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use dirs::data_local_dir;
#[cfg(unix)]
use libc::geteuid;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default bound on how long a cancel request waits for an outcome.
pub const DEFAULT_CANCEL_TIMEOUT_MS: u64 = 5_000;

/// Default catch-all result code for internal failures (`other`).
pub const DEFAULT_SERVER_ERROR_RESULT_CODE: i32 = 80;

/// Sentinel disabling the persistent search limit.
pub const UNLIMITED_PERSISTENT_SEARCHES: i64 = -1;

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub(crate) fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

pub(crate) fn default_cancel_timeout_ms() -> u64 {
    DEFAULT_CANCEL_TIMEOUT_MS
}

pub(crate) fn default_server_error_result_code() -> i32 {
    DEFAULT_SERVER_ERROR_RESULT_CODE
}

pub(crate) fn default_max_persistent_searches() -> i64 {
    UNLIMITED_PERSISTENT_SEARCHES
}

/// Computes the default server instance directory.
///
/// Prefers the per-user data directory and falls back to a uid-namespaced
/// directory under the system temporary directory.
pub fn default_instance_dir() -> Utf8PathBuf {
    default_instance_dir_inner()
}

#[cfg(unix)]
fn default_instance_dir_inner() -> Utf8PathBuf {
    if let Some(mut base) = data_local_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
    {
        base.push("dirsrv");
        return base;
    }
    let mut base = fallback_base_directory();
    base.push("dirsrv");
    base.push(format!("uid-{}", unsafe { geteuid() }));
    base
}

#[cfg(not(unix))]
fn default_instance_dir_inner() -> Utf8PathBuf {
    let mut base = fallback_base_directory();
    base.push("dirsrv");
    base
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
