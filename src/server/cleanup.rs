//! Process-exit cleanup for the shared server

use std::sync::Once;

use tracing::warn;

static REGISTER: Once = Once::new();

extern "C" fn cleanup_at_exit() {
    if let Some(manager) = crate::GLOBAL.get() {
        manager.remove_socket_if_idle();
    }
}

/// Register the exit hook that removes the shared server's socket file
pub fn register_exit_hook() {
    REGISTER.call_once(|| {
        // SAFETY: `cleanup_at_exit` is a plain `extern "C"` function that
        // neither unwinds nor calls `exit`.
        let rc = unsafe { libc::atexit(cleanup_at_exit) };
        if rc != 0 {
            warn!(rc, "Failed to register exit hook");
        }
    });
}
