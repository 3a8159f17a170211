//! Server configuration
//!
//! Environment Variables:
//! - `MEMDB_SOCKET` - Override the Unix socket path
//! - `MEMDB_STORE_DIR` - Directory for the store lock (ephemeral when unset)
//! - `MEMDB_LOG_FILE` - Log file path
//! - `MEMDB_LOG_LEVEL` - Log filter directive (e.g. `info`, `memdb=debug`)

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default socket path on platforms with a world-writable /tmp
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/memdb-unittest-socket";

/// Socket file name used relative to the working directory on macOS
pub const SOCKET_FILE_NAME: &str = "memdb-unittest-socket";

pub const DEFAULT_LOG_FILE: &str = "/tmp/memdb/exec.log";

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_SCHEMA_LEASE: Duration = Duration::from_millis(500);

pub const SERVER_VERSION: &str = "8.0.11-memdb";

/// Where the mock store keeps its lock; rows always live in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    path: Option<PathBuf>,
}

impl StoreOptions {
    pub fn ephemeral() -> Self {
        StoreOptions { path: None }
    }

    /// An empty path means ephemeral
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        StoreOptions {
            path: (!path.as_os_str().is_empty()).then_some(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub file: PathBuf,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: PathBuf::from(DEFAULT_LOG_FILE),
            format: LogFormat::Json,
        }
    }
}

/// Everything needed to bring up one embedded server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub store: StoreOptions,
    /// `None` leaves the process's tracing subscriber untouched
    pub log: Option<LogConfig>,
    pub schema_lease: Duration,
    /// Accept an already existing read-only account during bootstrap
    pub tolerate_existing_principal: bool,
    pub server_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            socket_path: default_socket_path(),
            store: StoreOptions::ephemeral(),
            log: Some(LogConfig::default()),
            schema_lease: DEFAULT_SCHEMA_LEASE,
            tolerate_existing_principal: false,
            server_version: SERVER_VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = ServerConfig::default();
        if let Some(dir) = non_empty_var("MEMDB_STORE_DIR") {
            config.store = StoreOptions::with_path(dir);
        }
        if let Some(log) = config.log.as_mut() {
            if let Some(file) = non_empty_var("MEMDB_LOG_FILE") {
                log.file = PathBuf::from(file);
            }
            if let Some(level) = non_empty_var("MEMDB_LOG_LEVEL") {
                log.level = level;
            }
        }
        config
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_store(mut self, store: StoreOptions) -> Self {
        self.store = store;
        self
    }

    pub fn with_log(mut self, log: Option<LogConfig>) -> Self {
        self.log = log;
        self
    }

    pub fn with_schema_lease(mut self, lease: Duration) -> Self {
        self.schema_lease = lease;
        self
    }

    pub fn tolerate_existing_principal(mut self, tolerate: bool) -> Self {
        self.tolerate_existing_principal = tolerate;
        self
    }
}

/// Socket path for the shared test server.
///
/// `MEMDB_SOCKET` wins; otherwise macOS uses the working directory (its /tmp
/// paths can exceed the socket path limit) and everything else uses /tmp.
pub fn default_socket_path() -> PathBuf {
    if let Some(path) = non_empty_var("MEMDB_SOCKET") {
        return PathBuf::from(path);
    }
    if cfg!(target_os = "macos") {
        if let Ok(cwd) = env::current_dir() {
            return cwd.join(SOCKET_FILE_NAME);
        }
    }
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_options_empty_path_is_ephemeral() {
        assert_eq!(StoreOptions::with_path(""), StoreOptions::ephemeral());
        assert!(StoreOptions::with_path("/tmp/x").path().is_some());
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.schema_lease, Duration::from_millis(500));
        assert!(!config.tolerate_existing_principal);
        assert!(config.store.path().is_none());
        let log = config.log.unwrap();
        assert_eq!(log.level, "info");
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.file, PathBuf::from(DEFAULT_LOG_FILE));
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::default()
            .with_socket_path("/tmp/other.sock")
            .with_log(None)
            .tolerate_existing_principal(true);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/other.sock"));
        assert!(config.log.is_none());
        assert!(config.tolerate_existing_principal);
    }
}
