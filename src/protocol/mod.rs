//! Wire protocol implementations
//!
//! Currently supports the MySQL protocol over Unix sockets.

pub mod mysql;

pub use mysql::{auth, MySqlConnection};
