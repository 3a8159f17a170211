//! Embedded server: listener, lifecycle and bootstrap

pub mod bootstrap;
pub mod cleanup;
pub mod handler;
pub mod lifecycle;
pub mod listener;

pub use bootstrap::Bootstrapper;
pub use lifecycle::{LifecycleError, LifecycleManager, LifecycleState};
pub use listener::{start_server, MemDbServer, ServerError, ServerHandle};
