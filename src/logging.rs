//! Process-wide log setup
//!
//! Installs a `tracing` subscriber that writes to a file. Only the first
//! installation in a process takes effect; later calls (including ones made
//! after a test harness installed its own subscriber) are no-ops.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("cannot open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid log level '{level}': {message}")]
    Filter { level: String, message: String },
}

/// Install the file logger described by `config`
pub fn init_logger(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Filter {
        level: config.level.clone(),
        message: e.to_string(),
    })?;

    if let Some(parent) = config.file.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if installed.is_err() {
        debug!("global subscriber already installed, keeping it");
    }
    Ok(())
}
