//! Table maintenance helpers for test suites
//!
//! Batch operations run sequentially and stop at the first failure, so a
//! failed batch can leave some tables cleared and others not. Dropping uses
//! `IF EXISTS`, which makes a retried drop batch safe.

use std::path::Path;

use mysql_async::prelude::Queryable;
use mysql_async::Conn;
use tracing::debug;

use crate::error::{Error, Result};

pub const ER_DBACCESS_DENIED: u16 = 1044;
pub const ER_ACCESS_DENIED: u16 = 1045;
pub const ER_TABLE_EXISTS: u16 = 1050;
pub const ER_DUP_ENTRY: u16 = 1062;
pub const ER_TABLEACCESS_DENIED: u16 = 1142;

/// Tables of the connection's current database, in creation order
pub async fn list_tables(conn: &mut Conn) -> Result<Vec<String>> {
    let tables: Vec<String> = conn.query("SHOW TABLES").await?;
    Ok(tables)
}

pub async fn truncate_table(conn: &mut Conn, table: &str) -> Result<()> {
    conn.query_drop(format!("TRUNCATE TABLE {}", quote_identifier(table)))
        .await?;
    Ok(())
}

/// Empty every table of the current database
pub async fn truncate_all_tables(conn: &mut Conn) -> Result<()> {
    let tables = list_tables(conn).await?;
    for table in &tables {
        truncate_table(conn, table).await?;
    }
    debug!(count = tables.len(), "Truncated all tables");
    Ok(())
}

pub async fn drop_table(conn: &mut Conn, table: &str) -> Result<()> {
    conn.query_drop(format!("DROP TABLE IF EXISTS {}", quote_identifier(table)))
        .await?;
    Ok(())
}

/// Drop every table of the current database
pub async fn drop_all_tables(conn: &mut Conn) -> Result<()> {
    let tables = list_tables(conn).await?;
    for table in &tables {
        drop_table(conn, table).await?;
    }
    debug!(count = tables.len(), "Dropped all tables");
    Ok(())
}

/// Run `sql` and discard every result set it produces
pub async fn exec_sql(conn: &mut Conn, sql: &str) -> Result<()> {
    conn.query_drop(sql).await?;
    Ok(())
}

/// Run a whole SQL script in one round trip. Scripts with several statements
/// need multi-statement mode, which bootstrap enables.
pub async fn exec_file(conn: &mut Conn, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let sql = tokio::fs::read_to_string(path).await?;
    debug!(path = %path.display(), bytes = sql.len(), "Executing SQL file");
    exec_sql(conn, &sql).await
}

pub fn is_already_exists_error(e: &Error) -> bool {
    e.server_code() == Some(ER_TABLE_EXISTS)
}

pub fn is_duplicate_entry_error(e: &Error) -> bool {
    e.server_code() == Some(ER_DUP_ENTRY)
}

pub fn is_access_denied_error(e: &Error) -> bool {
    matches!(
        e.server_code(),
        Some(ER_TABLEACCESS_DENIED | ER_ACCESS_DENIED | ER_DBACCESS_DENIED)
    )
}

extern "C" {
    // POSIX; the libc crate has no binding for it on linux-gnu
    fn tzset();
}

/// Pin the process's local time zone to UTC
pub fn set_utc_zone() {
    std::env::set_var("TZ", "UTC");
    // SAFETY: tzset only re-reads TZ into the C library's process-wide zone state.
    unsafe { tzset() };
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(code: u16) -> Error {
        Error::Sql(mysql_async::Error::Server(mysql_async::ServerError {
            code,
            message: String::new(),
            state: "HY000".to_string(),
        }))
    }

    #[test]
    fn test_error_classification() {
        assert!(is_already_exists_error(&server_error(1050)));
        assert!(!is_already_exists_error(&server_error(1062)));

        assert!(is_duplicate_entry_error(&server_error(1062)));

        assert!(is_access_denied_error(&server_error(1142)));
        assert!(is_access_denied_error(&server_error(1045)));
        assert!(is_access_denied_error(&server_error(1044)));
        assert!(!is_access_denied_error(&server_error(1146)));
        assert!(!is_access_denied_error(&Error::Config("x".to_string())));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("students"), "`students`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_set_utc_zone() {
        set_utc_zone();
        assert_eq!(std::env::var("TZ").unwrap(), "UTC");
        assert_eq!(chrono::Local::now().offset().local_minus_utc(), 0);
    }
}
