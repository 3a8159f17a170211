//! Crate-level error type

use thiserror::Error;

use crate::logging::LoggingError;
use crate::server::lifecycle::LifecycleError;
use crate::server::listener::ServerError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("Bootstrap step '{step}' failed: {source}")]
    Bootstrap {
        step: &'static str,
        #[source]
        source: mysql_async::Error,
    },

    #[error("Could not connect after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: mysql_async::Error,
    },

    #[error("SQL error: {0}")]
    Sql(#[from] mysql_async::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// MySQL error code reported by the server, if this error carries one
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Error::Sql(e) | Error::Bootstrap { source: e, .. } | Error::Connect { source: e, .. } => {
                server_code(e)
            }
            _ => None,
        }
    }
}

/// MySQL error code of a client error returned by the server
pub fn server_code(e: &mysql_async::Error) -> Option<u16> {
    match e {
        mysql_async::Error::Server(server) => Some(server.code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(code: u16) -> mysql_async::Error {
        mysql_async::Error::Server(mysql_async::ServerError {
            code,
            message: "boom".to_string(),
            state: "HY000".to_string(),
        })
    }

    #[test]
    fn test_server_code() {
        assert_eq!(Error::Sql(server_error(1062)).server_code(), Some(1062));
        assert_eq!(
            Error::Bootstrap {
                step: "create read-only principal",
                source: server_error(1396),
            }
            .server_code(),
            Some(1396)
        );
        assert_eq!(Error::InvalidDsn("x".to_string()).server_code(), None);
    }

    #[test]
    fn test_bootstrap_message_names_step() {
        let e = Error::Bootstrap {
            step: "set global time zone",
            source: server_error(1227),
        };
        assert!(e.to_string().contains("set global time zone"));
    }
}
