//! End-to-end scenarios through a real client
//!
//! Privileges, table maintenance, unique keys, timestamps and scripts.

mod test_utils;

use std::io::Write;

use chrono::{NaiveDateTime, Utc};
use memdb::{
    drop_all_tables, exec_file, exec_sql, is_access_denied_error, is_already_exists_error,
    is_duplicate_entry_error, list_tables, truncate_all_tables, Error, Principal,
};
use mysql_async::prelude::*;
use serial_test::serial;

use test_utils::TestServer;

const STUDENT_SCHEMA: &str = "CREATE TABLE students (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    student_number VARCHAR(32) NOT NULL,
    name VARCHAR(64) NOT NULL,
    age INT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE KEY uk_student_number (student_number)
)";

async fn read_created_at(conn: &mut mysql_async::Conn) -> NaiveDateTime {
    let text: Option<String> = conn
        .query_first("SELECT created_at FROM students")
        .await
        .unwrap();
    NaiveDateTime::parse_from_str(&text.unwrap(), "%Y-%m-%d %H:%M:%S").unwrap()
}

#[tokio::test]
#[serial]
async fn test_student_scenario() {
    let server = TestServer::start().await;
    let mut conn = server.admin("test").await;
    conn.query_drop(STUDENT_SCHEMA).await.unwrap();

    conn.query_drop(
        "INSERT INTO students (student_number, name, age) VALUES ('10086', 'ZhangSan', 18)",
    )
    .await
    .unwrap();

    let name: Option<String> = conn
        .query_first("SELECT name FROM students WHERE student_number = '10086'")
        .await
        .unwrap();
    assert_eq!(name.as_deref(), Some("ZhangSan"));

    truncate_all_tables(&mut conn).await.unwrap();

    let name: Option<String> = conn
        .query_first("SELECT name FROM students WHERE student_number = '10086'")
        .await
        .unwrap();
    assert_eq!(name, None);

    drop(conn);
    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_readonly_cannot_write() {
    let server = TestServer::start().await;
    let mut admin = server.admin("test").await;
    admin.query_drop(STUDENT_SCHEMA).await.unwrap();
    admin
        .query_drop("INSERT INTO students (student_number, name, age) VALUES ('1', 'a', 1)")
        .await
        .unwrap();

    let mut ro = server.readonly("test").await;
    let count: Option<i64> = ro
        .query_first("SELECT COUNT(*) FROM students")
        .await
        .unwrap();
    assert_eq!(count, Some(1));

    for sql in [
        "INSERT INTO students (student_number, name, age) VALUES ('2', 'b', 2)",
        "UPDATE students SET age = 3",
        "DELETE FROM students",
        "CREATE TABLE other (id INT)",
    ] {
        let err: Error = ro.query_drop(sql).await.unwrap_err().into();
        assert!(is_access_denied_error(&err), "{}: {}", sql, err);
    }

    let count: Option<i64> = admin
        .query_first("SELECT COUNT(*) FROM students")
        .await
        .unwrap();
    assert_eq!(count, Some(1));

    drop(admin);
    drop(ro);
    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_wrong_password_rejected() {
    let server = TestServer::start().await;
    let mut dsn = server.manager.dsn(Principal::ReadOnly, "");
    dsn.password = "wrong".to_string();

    let err = memdb::connection::connect_with(&dsn, 1, std::time::Duration::from_millis(1))
        .await
        .unwrap_err();
    assert_eq!(err.server_code(), Some(1045));

    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_clear_and_drop() {
    let server = TestServer::start().await;
    let mut conn = server.admin("test").await;

    exec_sql(
        &mut conn,
        "CREATE TABLE a (id INT PRIMARY KEY); \
         CREATE TABLE b (id INT PRIMARY KEY, note TEXT); \
         INSERT INTO a VALUES (1), (2), (3); \
         INSERT INTO b VALUES (1, 'x'), (2, 'y');",
    )
    .await
    .unwrap();
    assert_eq!(list_tables(&mut conn).await.unwrap(), vec!["a", "b"]);

    truncate_all_tables(&mut conn).await.unwrap();
    assert_eq!(list_tables(&mut conn).await.unwrap(), vec!["a", "b"]);
    for table in ["a", "b"] {
        let count: Option<i64> = conn
            .query_first(format!("SELECT COUNT(*) FROM {}", table))
            .await
            .unwrap();
        assert_eq!(count, Some(0), "table {}", table);
    }

    drop_all_tables(&mut conn).await.unwrap();
    assert!(list_tables(&mut conn).await.unwrap().is_empty());

    // nothing left to drop
    drop_all_tables(&mut conn).await.unwrap();

    drop(conn);
    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_duplicate_key_before_and_after_clear() {
    let server = TestServer::start().await;
    let mut conn = server.admin("test").await;
    conn.query_drop(STUDENT_SCHEMA).await.unwrap();

    let insert = "INSERT INTO students (student_number, name, age) VALUES ('10086', 'ZhangSan', 18)";
    exec_sql(&mut conn, insert).await.unwrap();

    let err = exec_sql(&mut conn, insert).await.unwrap_err();
    assert!(is_duplicate_entry_error(&err), "{}", err);

    truncate_all_tables(&mut conn).await.unwrap();
    exec_sql(&mut conn, insert).await.unwrap();

    let err = exec_sql(&mut conn, "CREATE TABLE students (id INT)")
        .await
        .unwrap_err();
    assert!(is_already_exists_error(&err), "{}", err);

    drop(conn);
    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_timestamps_are_utc() {
    let server = TestServer::start().await;
    let mut conn = server.admin("test").await;
    conn.query_drop(STUDENT_SCHEMA).await.unwrap();
    conn.query_drop("INSERT INTO students (student_number, name) VALUES ('1', 'a')")
        .await
        .unwrap();

    let zone: Option<String> = conn.query_first("SELECT @@time_zone").await.unwrap();
    assert_eq!(zone.as_deref(), Some("UTC"));
    let global_zone: Option<String> = conn
        .query_first("SELECT @@global.time_zone")
        .await
        .unwrap();
    assert_eq!(global_zone.as_deref(), Some("UTC"));

    let created = read_created_at(&mut conn).await;
    let drift = (Utc::now().naive_utc() - created).num_seconds().abs();
    assert!(drift < 60, "created_at {} is not UTC", created);

    // a client in another zone sees the same instant shifted
    conn.query_drop("SET time_zone = '+08:00'").await.unwrap();
    let shifted = read_created_at(&mut conn).await;
    assert_eq!(
        (shifted - created).num_hours(),
        8,
        "session zone not applied"
    );

    drop(conn);
    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_exec_file() {
    let server = TestServer::start().await;
    let mut conn = server.admin("").await;

    let path = server.dir().path().join("fixture.sql");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "CREATE DATABASE school;").unwrap();
    writeln!(file, "USE school;").unwrap();
    writeln!(file, "{};", STUDENT_SCHEMA).unwrap();
    writeln!(
        file,
        "INSERT INTO students (student_number, name, age) VALUES ('1', 'a', 10), ('2', 'b', 11);"
    )
    .unwrap();
    drop(file);

    exec_file(&mut conn, &path).await.unwrap();

    let mut conn = server.admin("school").await;
    let names: Vec<String> = conn
        .query("SELECT name FROM students ORDER BY student_number")
        .await
        .unwrap();
    assert_eq!(names, vec!["a", "b"]);

    let missing = exec_file(&mut conn, server.dir().path().join("absent.sql")).await;
    assert!(matches!(missing, Err(Error::Io(_))));

    drop(conn);
    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_auto_increment_ids() {
    let server = TestServer::start().await;
    let mut conn = server.admin("test").await;
    conn.query_drop(STUDENT_SCHEMA).await.unwrap();

    conn.query_drop("INSERT INTO students (student_number, name) VALUES ('1', 'a')")
        .await
        .unwrap();
    assert_eq!(conn.last_insert_id(), Some(1));
    conn.query_drop("INSERT INTO students (student_number, name) VALUES ('2', 'b')")
        .await
        .unwrap();
    assert_eq!(conn.last_insert_id(), Some(2));

    conn.query_drop("UPDATE students SET age = 20 WHERE id = 2")
        .await
        .unwrap();
    assert_eq!(conn.affected_rows(), 1);

    drop(conn);
    server.shutdown().await;
}
