//! Unix socket listener
//!
//! The accept loop runs on a dedicated runtime so the server keeps serving
//! while the caller's own runtime is blocked inside a test.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UnixListener;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::executor::Engine;
use crate::server::handler::handle_connection;

const SERVER_WORKER_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build server runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("accept loop exited before binding")]
    NotBound,
}

/// MySQL-protocol server on a Unix socket
pub struct MemDbServer {
    socket_path: PathBuf,
    engine: Arc<Engine>,
    next_conn_id: AtomicU32,
}

impl MemDbServer {
    pub fn new(socket_path: impl Into<PathBuf>, engine: Arc<Engine>) -> Self {
        Self {
            socket_path: socket_path.into(),
            engine,
            next_conn_id: AtomicU32::new(1),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind, report the outcome on `bound`, then accept until `shutdown_rx`
    /// fires. The socket file is removed on exit.
    pub async fn run_with_shutdown(
        self,
        bound: oneshot::Sender<Result<(), ServerError>>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let listener = match UnixListener::bind(&self.socket_path) {
            Ok(listener) => listener,
            Err(source) => {
                let _ = bound.send(Err(ServerError::Bind {
                    path: self.socket_path.clone(),
                    source,
                }));
                return;
            }
        };
        let _ = bound.send(Ok(()));

        info!(socket = %self.socket_path.display(), "memdb server listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let connection_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                            let engine = self.engine.clone();
                            tokio::spawn(handle_connection(stream, connection_id, engine));
                        }
                        Err(e) => {
                            error!(error = %e, "Accept failed, stopping server");
                            break;
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);
        remove_socket_file(&self.socket_path);
        info!(socket = %self.socket_path.display(), "memdb server stopped");
    }
}

/// A running server: its runtime, accept task and shutdown channel
pub struct ServerHandle {
    socket_path: PathBuf,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    runtime: Option<Runtime>,
}

impl ServerHandle {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether the accept loop is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// End the accept loop but keep the runtime and handle, as a crashed
    /// loop would
    #[cfg(test)]
    pub(crate) async fn stop_accepting(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        while self.is_running() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    /// Stop accepting, wait for the accept loop to exit, then tear down the
    /// runtime together with every open session
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Accept loop ended abnormally");
            }
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
            remove_socket_file(&self.socket_path);
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Start serving `engine` on `socket_path`.
///
/// Returns once the socket is bound, so clients may connect immediately.
pub async fn start_server(
    socket_path: &Path,
    engine: Arc<Engine>,
) -> Result<ServerHandle, ServerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(SERVER_WORKER_THREADS)
        .thread_name("memdb-server")
        .enable_all()
        .build()
        .map_err(ServerError::Runtime)?;

    let (bound_tx, bound_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = MemDbServer::new(socket_path, engine);
    let task = runtime.spawn(server.run_with_shutdown(bound_tx, shutdown_rx));

    let handle = ServerHandle {
        socket_path: socket_path.to_path_buf(),
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
        runtime: Some(runtime),
    };

    match bound_rx.await {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            handle.shutdown().await;
            Err(e)
        }
        Err(_) => {
            handle.shutdown().await;
            Err(ServerError::NotBound)
        }
    }
}

pub(crate) fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(socket = %path.display(), error = %e, "Failed to remove socket file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::executor::EngineOptions;
    use crate::storage::create_mock_store_and_domain;
    use std::time::Duration;

    fn engine(socket: &Path) -> Arc<Engine> {
        let (store, domain) =
            create_mock_store_and_domain(&StoreOptions::ephemeral(), Duration::from_millis(500))
                .unwrap();
        Arc::new(Engine::new(
            store,
            domain,
            EngineOptions {
                server_version: crate::config::SERVER_VERSION.to_string(),
                socket: socket.display().to_string(),
            },
        ))
    }

    #[tokio::test]
    async fn test_start_and_shutdown_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("memdb.sock");

        let handle = start_server(&socket, engine(&socket)).await.unwrap();
        assert!(handle.is_running());
        assert!(socket.exists());

        handle.shutdown().await;
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("missing-dir").join("memdb.sock");

        let err = start_server(&socket, engine(&socket)).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_stopped_accept_loop_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("memdb.sock");

        let mut handle = start_server(&socket, engine(&socket)).await.unwrap();
        handle.stop_accepting().await;
        assert!(!handle.is_running());
        assert!(!socket.exists());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_stops_server() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("memdb.sock");

        let handle = start_server(&socket, engine(&socket)).await.unwrap();
        drop(handle);
        assert!(!socket.exists());
    }
}
