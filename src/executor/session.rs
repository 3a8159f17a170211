//! Per-connection session state

use std::collections::HashMap;

use super::datum::Datum;
use super::time::TimeZoneSpec;

/// Per-connection session state
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique connection identifier
    pub connection_id: u32,
    /// Currently selected database (USE db)
    pub database: Option<String>,
    /// Authenticated username
    pub user: String,
    /// Client host as seen by the server
    pub host: String,
    /// Host pattern of the matched account (`CURRENT_USER()`)
    pub account_host: String,
    pub time_zone: TimeZoneSpec,
    /// Session overrides of system variables
    pub variables: HashMap<String, String>,
    /// `@name` user variables
    pub user_variables: HashMap<String, Datum>,
    pub last_insert_id: u64,
    /// Client asked for matched instead of changed rows in UPDATE counts
    pub found_rows: bool,
}

impl Session {
    /// Create a new, unauthenticated session
    pub fn new(connection_id: u32) -> Self {
        Self {
            connection_id,
            database: None,
            user: String::new(),
            host: "localhost".to_string(),
            account_host: "%".to_string(),
            time_zone: TimeZoneSpec::System,
            variables: HashMap::new(),
            user_variables: HashMap::new(),
            last_insert_id: 0,
            found_rows: false,
        }
    }

    /// Set the current database
    pub fn set_database(&mut self, database: Option<String>) {
        self.database = database;
    }

    /// Drop session-level state, keeping identity and database
    pub fn reset(&mut self, global_time_zone: TimeZoneSpec) {
        self.variables.clear();
        self.user_variables.clear();
        self.time_zone = global_time_zone;
        self.last_insert_id = 0;
    }
}
