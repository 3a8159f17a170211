//! Connection handler for the MySQL client protocol

use std::sync::Arc;

use tokio::net::UnixStream;
use tracing::{debug, error, warn};

use crate::executor::Engine;
use crate::protocol::MySqlConnection;

/// Handle one client connection: handshake, then the command loop
pub async fn handle_connection(stream: UnixStream, connection_id: u32, engine: Arc<Engine>) {
    debug!(connection_id, "Client connected");

    let mut conn = MySqlConnection::new(stream, connection_id, engine);

    if let Err(e) = conn.handshake().await {
        warn!(connection_id, error = %e, "Handshake failed");
        return;
    }

    if let Err(e) = conn.run().await {
        if !e.is_disconnect() {
            error!(connection_id, error = %e, "Connection error");
        }
    }

    debug!(connection_id, "Client disconnected");
}
