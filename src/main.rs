//! memdb server binary
//!
//! Usage: memdb [--socket PATH] [--store-dir DIR] [--log-file FILE] [--log-level LEVEL]
//!
//! Exit codes:
//!   0 - Clean shutdown after Ctrl-C
//!   1 - Server failed to start or close

use std::path::PathBuf;

use clap::Parser;

use memdb::config::{default_socket_path, DEFAULT_LOG_FILE, DEFAULT_LOG_LEVEL};
use memdb::{LifecycleManager, LogConfig, Principal, ServerConfig, StoreOptions};

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run an in-memory MySQL-compatible server on a Unix socket")]
struct Cli {
    /// Socket path (defaults to the platform's test socket)
    #[arg(long, env = "MEMDB_SOCKET")]
    socket: Option<PathBuf>,

    /// Claim a storage directory instead of keeping everything in memory
    #[arg(long, env = "MEMDB_STORE_DIR")]
    store_dir: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_LOG_FILE, env = "MEMDB_LOG_FILE")]
    log_file: PathBuf,

    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "MEMDB_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let store = match cli.store_dir {
        Some(dir) => StoreOptions::with_path(dir),
        None => StoreOptions::ephemeral(),
    };
    let log = LogConfig {
        level: cli.log_level,
        file: cli.log_file,
        ..LogConfig::default()
    };
    let config = ServerConfig::default()
        .with_socket_path(cli.socket.unwrap_or_else(default_socket_path))
        .with_store(store)
        .with_log(Some(log));

    let manager = LifecycleManager::new(config);
    if let Err(e) = manager.start().await {
        eprintln!("ERROR: Failed to start server: {}", e);
        std::process::exit(1);
    }

    println!("{}", manager.dsn(Principal::Admin, ""));
    eprintln!("memdb listening on {}, Ctrl-C to stop", manager.socket_path().display());

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("ERROR: Cannot wait for Ctrl-C: {}", e);
    }

    if let Err(e) = manager.close().await {
        eprintln!("ERROR: Failed to close server: {}", e);
        std::process::exit(1);
    }
}
