//! memdb - an in-memory MySQL-compatible server for test suites
//!
//! Features:
//! - One embedded server per process, started and closed on demand
//! - MySQL wire protocol over a Unix socket
//! - Fixed admin and read-only identities, bootstrapped on every start
//! - Table maintenance helpers for resetting state between tests

pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod logging;
pub mod maintenance;
pub mod protocol;
pub mod server;
pub mod sql;
pub mod storage;

use std::sync::OnceLock;

pub use config::{LogConfig, LogFormat, ServerConfig, StoreOptions};
pub use connection::{
    build_dsn, connect, connect_with, dsn_for, get_conn, get_conn_with_db, get_dsn,
    get_dsn_with_db, get_readonly_conn_with_db, get_readonly_dsn_with_db, Dsn, Principal,
};
pub use error::{Error, Result};
pub use maintenance::{
    drop_all_tables, drop_table, exec_file, exec_sql, is_access_denied_error,
    is_already_exists_error, is_duplicate_entry_error, list_tables, set_utc_zone,
    truncate_all_tables, truncate_table,
};
pub use server::{Bootstrapper, LifecycleError, LifecycleManager, LifecycleState};
pub use storage::create_mock_store_and_domain;

pub(crate) static GLOBAL: OnceLock<LifecycleManager> = OnceLock::new();

/// The process-wide server manager, configured from the environment on
/// first use
pub fn global() -> &'static LifecycleManager {
    GLOBAL.get_or_init(|| {
        server::cleanup::register_exit_hook();
        LifecycleManager::new(ServerConfig::from_env())
    })
}

/// Start the process-wide server; no-op if it is already running
pub async fn start_server() -> Result<()> {
    global().start().await
}

/// Close the process-wide server and its storage
pub async fn close_server() -> Result<()> {
    global().close().await
}
