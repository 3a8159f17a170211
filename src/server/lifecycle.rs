//! Server lifecycle manager
//!
//! Owns the embedded server and its storage. `start` and `close` are
//! serialized by one async lock and are both idempotent; the observable
//! state lives behind a separate cheap lock so it can be read at any time.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::connection::{Dsn, Principal};
use crate::error::{Error, Result};
use crate::executor::{Engine, EngineOptions};
use crate::logging::init_logger;
use crate::server::bootstrap::Bootstrapper;
use crate::server::listener::{remove_socket_file, start_server, ServerHandle};
use crate::storage::{create_mock_store_and_domain, Domain, MockStore};

/// At most one running server per process
static INSTANCE_ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("another memdb server is already running in this process")]
    InstanceActive,

    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("cannot remove stale socket {}: {source}", path.display())]
    StaleSocket {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Starting,
    Running,
    Closing,
    Closed,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unstarted, Starting)
                | (Unstarted, Closing)
                | (Starting, Running)
                | (Starting, Unstarted)
                | (Starting, Closed)
                | (Running, Starting)
                | (Running, Closing)
                | (Closing, Closed)
                | (Closed, Starting)
        )
    }
}

#[derive(Default)]
struct Resources {
    server: Option<ServerHandle>,
    store: Option<Arc<MockStore>>,
    domain: Option<Arc<Domain>>,
    holds_instance: bool,
}

pub struct LifecycleManager {
    config: ServerConfig,
    resources: Mutex<Resources>,
    state: RwLock<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            resources: Mutex::new(Resources::default()),
            state: RwLock::new(LifecycleState::Unstarted),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Connection string for `principal` against this manager's socket
    pub fn dsn(&self, principal: Principal, database: &str) -> Dsn {
        Dsn::for_principal(principal, self.socket_path(), database)
    }

    /// Bring the server up. Returns immediately if it is already serving.
    pub async fn start(&self) -> Result<()> {
        let mut res = self.resources.lock().await;

        let previous = match self.state() {
            LifecycleState::Running if res.server.as_ref().is_some_and(ServerHandle::is_running) => {
                return Ok(());
            }
            LifecycleState::Running => {
                warn!(socket = %self.socket_path().display(), "Accept loop died, restarting server");
                if let Err(e) = self.release(&mut res).await {
                    warn!(error = %e, "Releasing dead server failed");
                }
                LifecycleState::Closed
            }
            LifecycleState::Unstarted => LifecycleState::Unstarted,
            LifecycleState::Closed => LifecycleState::Closed,
            // A start or close future was dropped mid-way
            LifecycleState::Starting | LifecycleState::Closing => {
                if let Err(e) = self.release(&mut res).await {
                    warn!(error = %e, "Releasing interrupted server failed");
                }
                *self.state.write() = LifecycleState::Closed;
                LifecycleState::Closed
            }
        };

        self.transition(LifecycleState::Starting)?;

        match self.bring_up(&mut res).await {
            Ok(()) => {
                self.transition(LifecycleState::Running)?;
                info!(socket = %self.socket_path().display(), "memdb server started");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "memdb server failed to start");
                if let Err(release_err) = self.release(&mut res).await {
                    warn!(error = %release_err, "Cleanup after failed start incomplete");
                }
                self.transition(previous)?;
                Err(e)
            }
        }
    }

    /// Shut the server down and close storage. No-op when already closed.
    pub async fn close(&self) -> Result<()> {
        let mut res = self.resources.lock().await;

        match self.state() {
            LifecycleState::Closed => return Ok(()),
            LifecycleState::Starting | LifecycleState::Closing => {
                *self.state.write() = LifecycleState::Closing;
            }
            LifecycleState::Unstarted | LifecycleState::Running => {
                self.transition(LifecycleState::Closing)?;
            }
        }

        let result = self.release(&mut res).await;
        self.transition(LifecycleState::Closed)?;
        info!(socket = %self.socket_path().display(), "memdb server closed");
        result
    }

    async fn bring_up(&self, res: &mut Resources) -> Result<()> {
        if self.config.socket_path.as_os_str().is_empty() {
            return Err(Error::Config("socket path is empty".to_string()));
        }

        if INSTANCE_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LifecycleError::InstanceActive.into());
        }
        res.holds_instance = true;

        remove_stale_socket(self.socket_path())?;

        if let Some(log) = &self.config.log {
            init_logger(log)?;
        }

        let (store, domain) =
            create_mock_store_and_domain(&self.config.store, self.config.schema_lease)?;
        res.store = Some(store.clone());
        res.domain = Some(domain.clone());

        let engine = Arc::new(Engine::new(
            store,
            domain,
            EngineOptions {
                server_version: self.config.server_version.clone(),
                socket: self.socket_path().display().to_string(),
            },
        ));
        res.server = Some(start_server(self.socket_path(), engine).await?);

        Bootstrapper::new()
            .tolerate_existing_principal(self.config.tolerate_existing_principal)
            .run(&self.dsn(Principal::Admin, ""))
            .await
    }

    /// Tear down whatever `res` holds. Storage is closed even when the
    /// server handle is already gone.
    async fn release(&self, res: &mut Resources) -> Result<()> {
        if let Some(server) = res.server.take() {
            server.shutdown().await;
        }
        res.domain = None;

        let result = match res.store.take() {
            Some(store) => store.close().map_err(Error::from),
            None => Ok(()),
        };

        if res.holds_instance {
            INSTANCE_ACTIVE.store(false, Ordering::Release);
            res.holds_instance = false;
        }
        result
    }

    fn transition(&self, next: LifecycleState) -> std::result::Result<(), LifecycleError> {
        let mut state = self.state.write();
        if !state.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// Best-effort socket removal for the exit hook; skipped while a start
    /// or close is in flight
    pub(crate) fn remove_socket_if_idle(&self) {
        if let Ok(res) = self.resources.try_lock() {
            if res.server.is_some() {
                remove_socket_file(self.socket_path());
            }
        }
    }
}

#[cfg(test)]
impl LifecycleManager {
    /// End the accept loop while leaving the manager in `Running`
    async fn kill_accept_loop(&self) {
        let mut res = self.resources.lock().await;
        if let Some(server) = res.server.as_mut() {
            server.stop_accepting().await;
        }
    }

    async fn server_running(&self) -> bool {
        let res = self.resources.lock().await;
        res.server.as_ref().is_some_and(ServerHandle::is_running)
    }
}

fn remove_stale_socket(path: &Path) -> std::result::Result<(), LifecycleError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(socket = %path.display(), "Removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LifecycleError::StaleSocket {
            path: path.to_path_buf(),
            source,
        }),
    }
}
