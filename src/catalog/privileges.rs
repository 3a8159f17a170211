//! MySQL-compatible privilege model
//!
//! Grants are held at three levels:
//! - Global: `*.*` - all databases, all tables
//! - Database: `db.*` - all tables in database
//! - Table: `db.table` - specific table

/// Privilege types understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    /// Full access (expands to all privileges)
    All,
    Select,
    Insert,
    Update,
    Delete,
    /// Create tables/databases
    Create,
    /// Remove or truncate tables, remove databases
    Drop,
    /// Create users, set global variables
    Super,
}

impl Privilege {
    /// Parse privilege name from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ALL" | "ALL PRIVILEGES" => Some(Privilege::All),
            "SELECT" => Some(Privilege::Select),
            "INSERT" => Some(Privilege::Insert),
            "UPDATE" => Some(Privilege::Update),
            "DELETE" => Some(Privilege::Delete),
            "CREATE" => Some(Privilege::Create),
            "DROP" => Some(Privilege::Drop),
            "SUPER" => Some(Privilege::Super),
            _ => None,
        }
    }

    /// Upper-case name as it appears in error messages
    pub fn to_str(&self) -> &'static str {
        match self {
            Privilege::All => "ALL",
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Create => "CREATE",
            Privilege::Drop => "DROP",
            Privilege::Super => "SUPER",
        }
    }
}

/// Object a grant applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegeObject {
    /// `*.*`
    Global,
    /// `db.*`
    Database(String),
    /// `db.table`
    Table { database: String, table: String },
}

impl PrivilegeObject {
    pub fn table(database: &str, table: &str) -> Self {
        PrivilegeObject::Table {
            database: database.to_string(),
            table: table.to_string(),
        }
    }

    /// Check if this object covers another object
    /// (Global covers Database, Database covers Table)
    pub fn covers(&self, other: &PrivilegeObject) -> bool {
        match (self, other) {
            (PrivilegeObject::Global, _) => true,
            (PrivilegeObject::Database(db1), PrivilegeObject::Database(db2)) => db1 == db2,
            (PrivilegeObject::Database(db1), PrivilegeObject::Table { database, .. }) => {
                db1 == database
            }
            (
                PrivilegeObject::Table {
                    database: db1,
                    table: tbl1,
                },
                PrivilegeObject::Table {
                    database: db2,
                    table: tbl2,
                },
            ) => db1 == db2 && tbl1 == tbl2,
            _ => false,
        }
    }
}

/// Host part of a `'user'@'host'` account name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPattern(String);

impl HostPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        HostPattern(pattern.into())
    }

    /// Wildcard pattern matching any host
    pub fn any() -> Self {
        HostPattern("%".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this pattern matches a client host name.
    ///
    /// Socket clients always present themselves as `localhost`.
    pub fn matches(&self, client_host: &str) -> bool {
        let pattern = &self.0;

        if pattern == "%" || pattern == client_host {
            return true;
        }

        if pattern == "localhost" {
            return client_host == "localhost" || client_host == "127.0.0.1" || client_host == "::1";
        }

        // Prefix wildcard, e.g. "192.168.%"
        if let Some(prefix) = pattern.strip_suffix('%') {
            return client_host.starts_with(prefix);
        }

        false
    }

    /// Ordering for MySQL host precedence; higher wins
    pub fn specificity(&self) -> u8 {
        let pattern = &self.0;
        if pattern == "%" {
            0
        } else if pattern.contains('%') {
            1
        } else if pattern == "localhost" {
            2
        } else {
            3
        }
    }
}

/// A stored grant entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantEntry {
    pub privilege: Privilege,
    pub object: PrivilegeObject,
}

impl GrantEntry {
    pub fn new(privilege: Privilege, object: PrivilegeObject) -> Self {
        GrantEntry { privilege, object }
    }

    /// Check if this grant covers a privilege request
    pub fn covers(&self, privilege: Privilege, object: &PrivilegeObject) -> bool {
        if !self.object.covers(object) {
            return false;
        }
        self.privilege == Privilege::All || self.privilege == privilege
    }
}

/// Required privilege for an operation
#[derive(Debug, Clone)]
pub struct RequiredPrivilege {
    pub privilege: Privilege,
    pub object: PrivilegeObject,
}

impl RequiredPrivilege {
    pub fn on_table(privilege: Privilege, database: &str, table: &str) -> Self {
        RequiredPrivilege {
            privilege,
            object: PrivilegeObject::table(database, table),
        }
    }

    pub fn on_database(privilege: Privilege, database: &str) -> Self {
        RequiredPrivilege {
            privilege,
            object: PrivilegeObject::Database(database.to_string()),
        }
    }

    pub fn global(privilege: Privilege) -> Self {
        RequiredPrivilege {
            privilege,
            object: PrivilegeObject::Global,
        }
    }
}

/// Check if a set of grants satisfies a required privilege
pub fn check_privilege(grants: &[GrantEntry], required: &RequiredPrivilege) -> bool {
    grants
        .iter()
        .any(|grant| grant.covers(required.privilege, &required.object))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_pattern_matches() {
        let any = HostPattern::any();
        assert!(any.matches("localhost"));
        assert!(any.matches("192.168.1.1"));

        let localhost = HostPattern::new("localhost");
        assert!(localhost.matches("localhost"));
        assert!(localhost.matches("127.0.0.1"));
        assert!(!localhost.matches("192.168.1.1"));

        let prefix = HostPattern::new("192.168.%");
        assert!(prefix.matches("192.168.1.1"));
        assert!(!prefix.matches("10.0.0.1"));

        let exact = HostPattern::new("db.example.com");
        assert!(exact.matches("db.example.com"));
        assert!(!exact.matches("other.example.com"));
    }

    #[test]
    fn test_privilege_object_covers() {
        let global = PrivilegeObject::Global;
        let db = PrivilegeObject::Database("school".to_string());
        let table = PrivilegeObject::table("school", "students");

        assert!(global.covers(&db));
        assert!(global.covers(&table));

        assert!(!db.covers(&global));
        assert!(db.covers(&table));

        assert!(!table.covers(&db));
        assert!(table.covers(&table));

        let other_db = PrivilegeObject::Database("other".to_string());
        assert!(!db.covers(&other_db));
    }

    #[test]
    fn test_read_only_grant() {
        let grants = vec![GrantEntry::new(Privilege::Select, PrivilegeObject::Global)];

        assert!(check_privilege(
            &grants,
            &RequiredPrivilege::on_table(Privilege::Select, "school", "students")
        ));
        assert!(!check_privilege(
            &grants,
            &RequiredPrivilege::on_table(Privilege::Insert, "school", "students")
        ));
        assert!(!check_privilege(
            &grants,
            &RequiredPrivilege::global(Privilege::Super)
        ));
    }

    #[test]
    fn test_all_covers_everything() {
        let grants = vec![GrantEntry::new(Privilege::All, PrivilegeObject::Global)];
        assert!(check_privilege(
            &grants,
            &RequiredPrivilege::on_database(Privilege::Create, "school")
        ));
        assert!(check_privilege(
            &grants,
            &RequiredPrivilege::global(Privilege::Super)
        ));
    }

    #[test]
    fn test_privilege_parse() {
        assert_eq!(Privilege::parse("select"), Some(Privilege::Select));
        assert_eq!(Privilege::parse("ALL PRIVILEGES"), Some(Privilege::All));
        assert_eq!(Privilege::parse("alter"), None);
    }
}
