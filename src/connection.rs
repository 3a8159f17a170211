//! Connection factory
//!
//! Builds connection strings for the fixed identities and opens client
//! connections with bounded retry across the server's startup window.
//!
//! Connection string format:
//! `user:password@unix(/path/to/socket)/database?charset=utf8mb4&parseTime=true&loc=UTC`

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use lazy_static::lazy_static;
use mysql_async::{Conn, Opts, OptsBuilder};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Attempts made by [`connect`] before giving up
pub const CONNECT_RETRIES: u32 = 10;
/// Pause between connection attempts
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub const ADMIN_USER: &str = "root";
pub const READONLY_USER: &str = "readonly";
pub const READONLY_PASSWORD: &str = "readonly";

const DEFAULT_CHARSET: &str = "utf8mb4";
const DEFAULT_LOC: &str = "UTC";

lazy_static! {
    static ref DSN_RE: Regex = Regex::new(
        r"^(?P<user>[^:@]*)(?::(?P<pass>[^@]*))?@unix\((?P<socket>[^)]+)\)/(?P<db>[^?/]*)(?:\?(?P<params>.*))?$"
    )
    .expect("DSN pattern is valid");
}

/// Fixed identities known to the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    /// `root`, no password, all privileges
    Admin,
    /// `readonly`/`readonly`, `SELECT` on everything; created by bootstrap
    ReadOnly,
}

impl Principal {
    pub fn user(&self) -> &'static str {
        match self {
            Principal::Admin => ADMIN_USER,
            Principal::ReadOnly => READONLY_USER,
        }
    }

    pub fn credential(&self) -> &'static str {
        match self {
            Principal::Admin => "",
            Principal::ReadOnly => READONLY_PASSWORD,
        }
    }
}

/// Parsed connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub user: String,
    pub password: String,
    pub socket: PathBuf,
    /// Empty for a connection without a current database
    pub database: String,
    pub charset: String,
    pub parse_time: bool,
    /// Session time zone: `UTC`, `Local` or `±HH:MM`
    pub loc: String,
}

impl Dsn {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        socket: impl Into<PathBuf>,
        database: impl Into<String>,
    ) -> Self {
        Dsn {
            user: user.into(),
            password: password.into(),
            socket: socket.into(),
            database: database.into(),
            charset: DEFAULT_CHARSET.to_string(),
            parse_time: true,
            loc: DEFAULT_LOC.to_string(),
        }
    }

    pub fn for_principal(principal: Principal, socket: &Path, database: &str) -> Self {
        Dsn::new(principal.user(), principal.credential(), socket, database)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let caps = DSN_RE
            .captures(s)
            .ok_or_else(|| Error::InvalidDsn(format!("malformed connection string '{}'", s)))?;
        let field = |name: &str| caps.name(name).map_or("", |m| m.as_str());

        let mut dsn = Dsn::new(field("user"), field("pass"), field("socket"), field("db"));
        if dsn.user.is_empty() {
            return Err(Error::InvalidDsn("missing user".to_string()));
        }

        for param in field("params").split('&').filter(|p| !p.is_empty()) {
            let (key, value) = param
                .split_once('=')
                .ok_or_else(|| Error::InvalidDsn(format!("parameter '{}' has no value", param)))?;
            let value = decode_param(value);
            match key {
                "charset" => dsn.charset = value,
                "parseTime" => {
                    dsn.parse_time = value.parse().map_err(|_| {
                        Error::InvalidDsn(format!("parseTime must be true or false, got '{}'", value))
                    })?
                }
                "loc" => dsn.loc = value,
                other => {
                    return Err(Error::InvalidDsn(format!("unknown parameter '{}'", other)));
                }
            }
        }

        dsn.session_time_zone()?;
        Ok(dsn)
    }

    /// Value for `SET time_zone` derived from `loc`
    fn session_time_zone(&self) -> Result<String> {
        if self.loc.eq_ignore_ascii_case("UTC") {
            return Ok("UTC".to_string());
        }
        if self.loc == "Local" {
            return Ok("SYSTEM".to_string());
        }
        let offset = self.loc.as_bytes();
        let valid = offset.len() == 6
            && matches!(offset[0], b'+' | b'-')
            && offset[1..3].iter().all(u8::is_ascii_digit)
            && offset[3] == b':'
            && offset[4..6].iter().all(u8::is_ascii_digit);
        if valid {
            Ok(self.loc.clone())
        } else {
            Err(Error::InvalidDsn(format!("unsupported loc '{}'", self.loc)))
        }
    }

    /// Client options for this connection string
    pub fn to_opts(&self) -> Result<Opts> {
        let time_zone = self.session_time_zone()?;
        let builder = OptsBuilder::default()
            .socket(Some(self.socket.to_string_lossy().into_owned()))
            .user(Some(self.user.clone()))
            .pass(Some(self.password.clone()).filter(|p| !p.is_empty()))
            .db_name(Some(self.database.clone()).filter(|db| !db.is_empty()))
            .prefer_socket(false)
            .max_allowed_packet(Some(16_777_216))
            .wait_timeout(Some(28_800))
            .init(vec![
                format!("SET NAMES {}", self.charset),
                format!("SET time_zone = '{}'", time_zone),
            ]);
        Ok(Opts::from(builder))
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@unix({})/{}?charset={}&parseTime={}&loc={}",
            self.user,
            self.password,
            self.socket.display(),
            self.database,
            self.charset,
            self.parse_time,
            self.loc
        )
    }
}

impl FromStr for Dsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dsn::parse(s)
    }
}

fn decode_param(value: &str) -> String {
    value
        .replace("%2B", "+")
        .replace("%2b", "+")
        .replace("%3A", ":")
        .replace("%3a", ":")
        .replace("%2F", "/")
        .replace("%2f", "/")
}

// ============ Connecting ============

/// Parse `dsn` and connect, retrying across the startup window
pub async fn connect(dsn: &str) -> Result<Conn> {
    let dsn = Dsn::parse(dsn)?;
    connect_with(&dsn, CONNECT_RETRIES, CONNECT_RETRY_DELAY).await
}

/// Connect with an explicit retry budget; the last error is returned when
/// every attempt fails
pub async fn connect_with(dsn: &Dsn, attempts: u32, delay: Duration) -> Result<Conn> {
    let opts = dsn.to_opts()?;
    let attempts = attempts.max(1);

    let mut attempt = 1;
    loop {
        match Conn::new(opts.clone()).await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < attempts => {
                debug!(attempt, error = %e, socket = %dsn.socket.display(), "Connection attempt failed");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(attempts, error = %e, socket = %dsn.socket.display(), "Giving up connecting");
                return Err(Error::Connect {
                    attempts,
                    source: e,
                });
            }
        }
    }
}

// ============ Helpers bound to the process-wide server ============

/// Connection string for arbitrary credentials against the shared socket
pub fn build_dsn(user: &str, credential: &str, database: &str) -> String {
    Dsn::new(user, credential, crate::global().socket_path(), database).to_string()
}

/// Connection string for one of the fixed identities
pub fn dsn_for(principal: Principal, database: &str) -> String {
    build_dsn(principal.user(), principal.credential(), database)
}

/// Admin connection string without a database
pub fn get_dsn() -> String {
    dsn_for(Principal::Admin, "")
}

pub fn get_dsn_with_db(database: &str) -> String {
    dsn_for(Principal::Admin, database)
}

pub fn get_readonly_dsn_with_db(database: &str) -> String {
    dsn_for(Principal::ReadOnly, database)
}

/// Admin connection without a database
pub async fn get_conn() -> Result<Conn> {
    connect(&get_dsn()).await
}

pub async fn get_conn_with_db(database: &str) -> Result<Conn> {
    connect(&get_dsn_with_db(database)).await
}

pub async fn get_readonly_conn_with_db(database: &str) -> Result<Conn> {
    connect(&get_readonly_dsn_with_db(database)).await
}
