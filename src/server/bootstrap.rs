//! Schema bootstrap
//!
//! Runs once per successful start, over an admin connection to the freshly
//! bound server.

use mysql_async::prelude::Queryable;
use mysql_async::Conn;
use tracing::{debug, info};

use crate::connection::{connect_with, Dsn, CONNECT_RETRIES, CONNECT_RETRY_DELAY};
use crate::error::{server_code, Error, Result};

const ER_CANNOT_USER: u16 = 1396;

struct Step {
    name: &'static str,
    sql: &'static str,
    /// Skipped with a log line when it fails with ER_CANNOT_USER and the
    /// bootstrapper tolerates an existing principal
    creates_principal: bool,
}

const STEPS: [Step; 4] = [
    Step {
        name: "set global time zone",
        sql: "SET GLOBAL time_zone = 'UTC'",
        creates_principal: false,
    },
    Step {
        name: "enable multi-statement mode",
        sql: "SET GLOBAL multi_statement_mode = 'ON'",
        creates_principal: false,
    },
    Step {
        name: "create read-only principal",
        sql: "CREATE USER 'readonly'@'%' IDENTIFIED BY 'readonly'",
        creates_principal: true,
    },
    Step {
        name: "grant read-only privileges",
        sql: "GRANT SELECT ON *.* TO 'readonly'@'%'",
        creates_principal: false,
    },
];

/// Applies the global settings and the read-only account
#[derive(Debug, Clone, Default)]
pub struct Bootstrapper {
    tolerate_existing_principal: bool,
}

impl Bootstrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tolerate_existing_principal(mut self, tolerate: bool) -> Self {
        self.tolerate_existing_principal = tolerate;
        self
    }

    /// Connect as `dsn` and run every step
    pub async fn run(&self, dsn: &Dsn) -> Result<()> {
        let mut conn = connect_with(dsn, CONNECT_RETRIES, CONNECT_RETRY_DELAY).await?;
        let result = self.run_on(&mut conn).await;
        if let Err(e) = conn.disconnect().await {
            debug!(error = %e, "Bootstrap connection did not close cleanly");
        }
        result
    }

    /// Run every step on an open admin connection, stopping at the first
    /// failure
    pub async fn run_on(&self, conn: &mut Conn) -> Result<()> {
        for step in &STEPS {
            match conn.query_drop(step.sql).await {
                Ok(()) => debug!(step = step.name, "Bootstrap step done"),
                Err(e)
                    if step.creates_principal
                        && self.tolerate_existing_principal
                        && server_code(&e) == Some(ER_CANNOT_USER) =>
                {
                    info!(step = step.name, "Read-only principal already exists");
                }
                Err(source) => {
                    return Err(Error::Bootstrap {
                        step: step.name,
                        source,
                    });
                }
            }
        }
        info!("Bootstrap complete");
        Ok(())
    }
}
