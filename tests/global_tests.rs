//! Process-wide server and the connection helpers bound to it
//!
//! One test only: the global manager is configured from the environment on
//! first use and lives for the whole test binary.

use memdb::{
    close_server, get_conn, get_conn_with_db, get_dsn, get_readonly_conn_with_db,
    get_readonly_dsn_with_db, global, is_access_denied_error, start_server, Error,
    LifecycleState,
};
use mysql_async::prelude::*;
use tempfile::TempDir;

#[tokio::test]
async fn test_global_server_flow() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("memdb-unittest-socket");
    std::env::set_var("MEMDB_SOCKET", &socket);
    std::env::set_var("MEMDB_LOG_FILE", dir.path().join("log").join("exec.log"));

    assert_eq!(global().socket_path(), socket.as_path());
    assert_eq!(global().state(), LifecycleState::Unstarted);

    start_server().await.unwrap();
    start_server().await.unwrap();
    assert!(socket.exists());
    assert!(dir.path().join("log").join("exec.log").exists());

    assert_eq!(
        get_dsn(),
        format!(
            "root:@unix({})/?charset=utf8mb4&parseTime=true&loc=UTC",
            socket.display()
        )
    );
    assert!(get_readonly_dsn_with_db("test").starts_with("readonly:readonly@unix("));

    let mut admin = get_conn().await.unwrap();
    admin.query_drop("CREATE DATABASE school").await.unwrap();
    drop(admin);

    let mut conn = get_conn_with_db("school").await.unwrap();
    conn.query_drop("CREATE TABLE t (id INT PRIMARY KEY)")
        .await
        .unwrap();
    let db: Option<String> = conn.query_first("SELECT DATABASE()").await.unwrap();
    assert_eq!(db.as_deref(), Some("school"));

    let mut ro = get_readonly_conn_with_db("school").await.unwrap();
    let err: Error = ro
        .query_drop("INSERT INTO t VALUES (1)")
        .await
        .unwrap_err()
        .into();
    assert!(is_access_denied_error(&err));
    drop(ro);
    drop(conn);

    close_server().await.unwrap();
    assert_eq!(global().state(), LifecycleState::Closed);
    assert!(!socket.exists());
    assert!(matches!(get_conn().await, Err(Error::Connect { .. })));

    // full restart cycle with fresh storage
    start_server().await.unwrap();
    let err = get_conn_with_db("school").await.unwrap_err();
    assert_eq!(err.server_code(), Some(1049));
    close_server().await.unwrap();
}
