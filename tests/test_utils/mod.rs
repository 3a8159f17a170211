//! Shared test utilities
//!
//! Note: clippy reports false-positive dead_code warnings because it can't
//! trace usage across test binaries. These utilities are used by multiple tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use memdb::connection::connect_with;
use memdb::{LifecycleManager, Principal, ServerConfig};
use mysql_async::Conn;
use tempfile::TempDir;

/// A server on its own socket inside a temporary directory.
///
/// Each test binary is one process, so tests that start a server must be
/// `#[serial]`: only one server may run per process.
pub struct TestServer {
    dir: TempDir,
    pub manager: LifecycleManager,
}

impl TestServer {
    pub fn config(dir: &TempDir) -> ServerConfig {
        ServerConfig::default()
            .with_socket_path(dir.path().join("memdb.sock"))
            .with_log(None)
    }

    /// Start a fresh server, panicking on failure
    pub async fn start() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let manager = LifecycleManager::new(Self::config(&dir));
        manager.start().await.expect("server start failed");
        Self { dir, manager }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.manager.socket_path().to_path_buf()
    }

    pub fn dir(&self) -> &TempDir {
        &self.dir
    }

    /// Connect as `principal`, scoped to `database` (empty for none)
    pub async fn try_connect(&self, principal: Principal, database: &str) -> memdb::Result<Conn> {
        let dsn = self.manager.dsn(principal, database);
        connect_with(&dsn, 3, Duration::from_millis(20)).await
    }

    pub async fn admin(&self, database: &str) -> Conn {
        self.try_connect(Principal::Admin, database)
            .await
            .expect("admin connect failed")
    }

    pub async fn readonly(&self, database: &str) -> Conn {
        self.try_connect(Principal::ReadOnly, database)
            .await
            .expect("read-only connect failed")
    }

    pub async fn shutdown(self) {
        self.manager.close().await.expect("server close failed");
    }
}
