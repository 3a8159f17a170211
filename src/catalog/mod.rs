//! Catalog - schema and account metadata
//!
//! Databases, table definitions, accounts with their grants, and global
//! system variables. The catalog is pure metadata; row data lives in the
//! mock store keyed by [`TableId`].

pub mod privileges;

use std::collections::BTreeMap;

use crate::sql::ast::Expr;

pub use privileges::{
    check_privilege, GrantEntry, HostPattern, Privilege, PrivilegeObject, RequiredPrivilege,
};

/// Identifier of a table's row storage in the mock store
pub type TableId = u64;

/// SQL data types supported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// BOOL / BOOLEAN (stored as TINYINT(1))
    Boolean,
    /// INT, TINYINT, SMALLINT, MEDIUMINT
    Int,
    BigInt,
    /// FLOAT, DOUBLE, DECIMAL
    Double,
    /// Variable-length string with max length in characters
    Varchar(u32),
    Text,
    Date,
    /// Wall-clock date and time, stored as written
    Datetime,
    /// Instant, stored in UTC and shown in the session time zone
    Timestamp,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Boolean | DataType::Int | DataType::BigInt)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, DataType::Varchar(_) | DataType::Text)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            DataType::Date | DataType::Datetime | DataType::Timestamp
        )
    }
}

/// Column definition
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// Default value expression, evaluated per inserted row
    pub default: Option<Expr>,
    pub auto_increment: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        ColumnDef {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            auto_increment: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Unique constraint, including the primary key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    /// `PRIMARY` for the primary key
    pub name: String,
    /// Column positions in the table
    pub columns: Vec<usize>,
}

impl UniqueKey {
    pub fn is_primary(&self) -> bool {
        self.name == "PRIMARY"
    }
}

/// Table definition
#[derive(Debug, Clone)]
pub struct TableDef {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub keys: Vec<UniqueKey>,
}

impl TableDef {
    /// Find a column by name (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn auto_increment_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.auto_increment)
    }
}

/// A database and its tables in creation order
#[derive(Debug, Clone)]
pub struct DatabaseDef {
    pub name: String,
    pub tables: Vec<TableDef>,
}

impl DatabaseDef {
    pub fn new(name: impl Into<String>) -> Self {
        DatabaseDef {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// An account (`'name'@'host'`) with its grants
#[derive(Debug, Clone)]
pub struct UserDef {
    pub name: String,
    pub host: HostPattern,
    /// Hex SHA1(SHA1(password)); empty for no password
    pub password_hash: String,
    pub grants: Vec<GrantEntry>,
}

/// In-memory catalog
#[derive(Debug, Default)]
pub struct Catalog {
    databases: Vec<DatabaseDef>,
    users: Vec<UserDef>,
    globals: BTreeMap<String, String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Databases ============

    pub fn databases(&self) -> &[DatabaseDef] {
        &self.databases
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseDef> {
        self.databases.iter().find(|d| d.name == name)
    }

    pub fn database_exists(&self, name: &str) -> bool {
        self.database(name).is_some()
    }

    /// Returns false if the database already exists
    pub fn create_database(&mut self, name: &str) -> bool {
        if self.database_exists(name) {
            return false;
        }
        self.databases.push(DatabaseDef::new(name));
        true
    }

    pub fn drop_database(&mut self, name: &str) -> Option<DatabaseDef> {
        let pos = self.databases.iter().position(|d| d.name == name)?;
        Some(self.databases.remove(pos))
    }

    // ============ Tables ============

    pub fn table(&self, database: &str, name: &str) -> Option<&TableDef> {
        self.database(database)?.table(name)
    }

    /// Returns false if the database does not exist
    pub fn add_table(&mut self, database: &str, table: TableDef) -> bool {
        match self.databases.iter_mut().find(|d| d.name == database) {
            Some(db) => {
                db.tables.push(table);
                true
            }
            None => false,
        }
    }

    pub fn remove_table(&mut self, database: &str, name: &str) -> Option<TableDef> {
        let db = self.databases.iter_mut().find(|d| d.name == database)?;
        let pos = db.tables.iter().position(|t| t.name == name)?;
        Some(db.tables.remove(pos))
    }

    // ============ Accounts ============

    /// Exact lookup by account name and host pattern
    pub fn user(&self, name: &str, host: &str) -> Option<&UserDef> {
        self.users
            .iter()
            .find(|u| u.name == name && u.host.as_str() == host)
    }

    pub fn user_mut(&mut self, name: &str, host: &str) -> Option<&mut UserDef> {
        self.users
            .iter_mut()
            .find(|u| u.name == name && u.host.as_str() == host)
    }

    /// Find the account a connecting client authenticates as.
    ///
    /// The most specific matching host pattern wins.
    pub fn match_user(&self, name: &str, client_host: &str) -> Option<&UserDef> {
        self.users
            .iter()
            .filter(|u| u.name == name && u.host.matches(client_host))
            .max_by_key(|u| u.host.specificity())
    }

    /// Returns false if the account already exists
    pub fn add_user(&mut self, user: UserDef) -> bool {
        if self.user(&user.name, user.host.as_str()).is_some() {
            return false;
        }
        self.users.push(user);
        true
    }

    pub fn remove_user(&mut self, name: &str, host: &str) -> Option<UserDef> {
        let pos = self
            .users
            .iter()
            .position(|u| u.name == name && u.host.as_str() == host)?;
        Some(self.users.remove(pos))
    }

    // ============ Global variables ============

    pub fn global(&self, name: &str) -> Option<&str> {
        self.globals.get(name).map(String::as_str)
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<String>) {
        self.globals.insert(name.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn students(id: TableId) -> TableDef {
        TableDef {
            id,
            name: "students".to_string(),
            columns: vec![
                ColumnDef::new("student_number", DataType::Varchar(32)).not_null(),
                ColumnDef::new("name", DataType::Varchar(64)),
            ],
            keys: vec![UniqueKey {
                name: "PRIMARY".to_string(),
                columns: vec![0],
            }],
        }
    }

    #[test]
    fn test_tables_keep_creation_order() {
        let mut catalog = Catalog::new();
        assert!(catalog.create_database("school"));
        assert!(!catalog.create_database("school"));

        let mut second = students(2);
        second.name = "classes".to_string();
        assert!(catalog.add_table("school", students(1)));
        assert!(catalog.add_table("school", second));

        let names: Vec<&str> = catalog
            .database("school")
            .unwrap()
            .tables
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["students", "classes"]);

        assert!(catalog.remove_table("school", "students").is_some());
        assert!(catalog.table("school", "students").is_none());
        assert!(!catalog.add_table("missing", students(3)));
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let table = students(1);
        assert_eq!(table.column_index("NAME"), Some(1));
        assert_eq!(table.column_index("age"), None);
        assert!(table.keys[0].is_primary());
    }

    #[test]
    fn test_match_user_prefers_specific_host() {
        let mut catalog = Catalog::new();
        let user = |host: &str, hash: &str| UserDef {
            name: "app".to_string(),
            host: HostPattern::new(host),
            password_hash: hash.to_string(),
            grants: Vec::new(),
        };
        assert!(catalog.add_user(user("%", "any")));
        assert!(catalog.add_user(user("localhost", "local")));
        assert!(!catalog.add_user(user("%", "dup")));

        let matched = catalog.match_user("app", "localhost").unwrap();
        assert_eq!(matched.password_hash, "local");
        let matched = catalog.match_user("app", "10.0.0.1").unwrap();
        assert_eq!(matched.password_hash, "any");
        assert!(catalog.match_user("nobody", "localhost").is_none());
    }
}
