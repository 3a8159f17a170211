//! Executor error types
//!
//! Every engine failure carries the MySQL error code and SQL state the
//! client receives in the ERR packet.

use std::fmt;

use crate::sql::SqlError;
use crate::storage::StorageError;

/// MySQL error codes
pub mod codes {
    pub const ER_DB_CREATE_EXISTS: u16 = 1007;
    pub const ER_DB_DROP_EXISTS: u16 = 1008;
    pub const ER_DBACCESS_DENIED: u16 = 1044;
    pub const ER_ACCESS_DENIED: u16 = 1045;
    pub const ER_NO_DB_ERROR: u16 = 1046;
    pub const ER_UNKNOWN_COM_ERROR: u16 = 1047;
    pub const ER_BAD_NULL_ERROR: u16 = 1048;
    pub const ER_BAD_DB_ERROR: u16 = 1049;
    pub const ER_TABLE_EXISTS_ERROR: u16 = 1050;
    pub const ER_BAD_TABLE_ERROR: u16 = 1051;
    pub const ER_BAD_FIELD_ERROR: u16 = 1054;
    pub const ER_DUP_FIELDNAME: u16 = 1060;
    pub const ER_DUP_ENTRY: u16 = 1062;
    pub const ER_PARSE_ERROR: u16 = 1064;
    pub const ER_EMPTY_QUERY: u16 = 1065;
    pub const ER_WRONG_VALUE_COUNT_ON_ROW: u16 = 1136;
    pub const ER_KEY_COLUMN_DOES_NOT_EXIST: u16 = 1072;
    pub const ER_UNKNOWN_ERROR: u16 = 1105;
    pub const ER_TABLEACCESS_DENIED: u16 = 1142;
    pub const ER_NO_SUCH_TABLE: u16 = 1146;
    pub const ER_UNKNOWN_SYSTEM_VARIABLE: u16 = 1193;
    pub const ER_WRONG_VALUE_FOR_VAR: u16 = 1231;
    pub const ER_NOT_SUPPORTED_YET: u16 = 1235;
    pub const ER_INCORRECT_GLOBAL_LOCAL_VAR: u16 = 1238;
    pub const ER_SPECIFIC_ACCESS_DENIED: u16 = 1227;
    pub const ER_TRUNCATED_WRONG_VALUE: u16 = 1292;
    pub const ER_UNSUPPORTED_PS: u16 = 1295;
    pub const ER_UNKNOWN_TIME_ZONE: u16 = 1298;
    pub const ER_NO_DEFAULT_FOR_FIELD: u16 = 1364;
    pub const ER_TRUNCATED_WRONG_VALUE_FOR_FIELD: u16 = 1366;
    pub const ER_DIVISION_BY_ZERO: u16 = 1365;
    pub const ER_CANNOT_USER: u16 = 1396;
    pub const ER_DATA_TOO_LONG: u16 = 1406;
    pub const ER_CANT_CREATE_USER_WITH_GRANT: u16 = 1410;
    pub const ER_AUTOINC_READ_FAILED: u16 = 1467;
    pub const ER_DATA_OUT_OF_RANGE: u16 = 1690;
    /// Multi-statement batch rejected because multi_statement_mode is OFF
    pub const ER_MULTI_STATEMENT_DISABLED: u16 = 8130;
}

/// SQL state codes
pub mod states {
    pub const SYNTAX_ERROR: &str = "42000";
    pub const NO_SUCH_TABLE: &str = "42S02";
    pub const TABLE_EXISTS: &str = "42S01";
    pub const BAD_FIELD: &str = "42S22";
    pub const INTEGRITY: &str = "23000";
    pub const NO_DB: &str = "3D000";
    pub const ACCESS_DENIED: &str = "28000";
    pub const DATA: &str = "22001";
    pub const OUT_OF_RANGE: &str = "22003";
    pub const DATETIME: &str = "22007";
    pub const GENERAL_ERROR: &str = "HY000";
}

/// Result type for executor operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error as reported to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: u16,
    pub state: &'static str,
    pub message: String,
}

impl EngineError {
    pub fn new(code: u16, state: &'static str, message: impl Into<String>) -> Self {
        EngineError {
            code,
            state,
            message: message.into(),
        }
    }

    pub fn syntax(detail: &str) -> Self {
        Self::new(
            codes::ER_PARSE_ERROR,
            states::SYNTAX_ERROR,
            format!(
                "You have an error in your SQL syntax; check the manual that corresponds to your MySQL server version for the right syntax to use {}",
                detail
            ),
        )
    }

    pub fn unsupported(what: &str) -> Self {
        Self::new(
            codes::ER_NOT_SUPPORTED_YET,
            states::SYNTAX_ERROR,
            format!("This version of MySQL doesn't yet support '{}'", what),
        )
    }

    pub fn no_database() -> Self {
        Self::new(codes::ER_NO_DB_ERROR, states::NO_DB, "No database selected")
    }

    pub fn unknown_database(name: &str) -> Self {
        Self::new(
            codes::ER_BAD_DB_ERROR,
            states::SYNTAX_ERROR,
            format!("Unknown database '{}'", name),
        )
    }

    pub fn no_such_table(database: &str, table: &str) -> Self {
        Self::new(
            codes::ER_NO_SUCH_TABLE,
            states::NO_SUCH_TABLE,
            format!("Table '{}.{}' doesn't exist", database, table),
        )
    }

    pub fn table_exists(table: &str) -> Self {
        Self::new(
            codes::ER_TABLE_EXISTS_ERROR,
            states::TABLE_EXISTS,
            format!("Table '{}' already exists", table),
        )
    }

    pub fn unknown_column(column: &str, clause: &str) -> Self {
        Self::new(
            codes::ER_BAD_FIELD_ERROR,
            states::BAD_FIELD,
            format!("Unknown column '{}' in '{}'", column, clause),
        )
    }

    pub fn duplicate_entry(value: &str, table: &str, key: &str) -> Self {
        Self::new(
            codes::ER_DUP_ENTRY,
            states::INTEGRITY,
            format!("Duplicate entry '{}' for key '{}.{}'", value, table, key),
        )
    }

    pub fn bad_null(column: &str) -> Self {
        Self::new(
            codes::ER_BAD_NULL_ERROR,
            states::INTEGRITY,
            format!("Column '{}' cannot be null", column),
        )
    }

    /// Table-level privilege failure (e.g. INSERT by a read-only account)
    pub fn table_access_denied(command: &str, user: &str, host: &str, table: &str) -> Self {
        Self::new(
            codes::ER_TABLEACCESS_DENIED,
            states::SYNTAX_ERROR,
            format!(
                "{} command denied to user '{}'@'{}' for table '{}'",
                command, user, host, table
            ),
        )
    }

    pub fn database_access_denied(user: &str, host: &str, database: &str) -> Self {
        Self::new(
            codes::ER_DBACCESS_DENIED,
            states::SYNTAX_ERROR,
            format!(
                "Access denied for user '{}'@'{}' to database '{}'",
                user, host, database
            ),
        )
    }

    pub fn specific_access_denied(privilege: &str) -> Self {
        Self::new(
            codes::ER_SPECIFIC_ACCESS_DENIED,
            states::SYNTAX_ERROR,
            format!(
                "Access denied; you need (at least one of) the {} privilege(s) for this operation",
                privilege
            ),
        )
    }

    pub fn access_denied(user: &str, host: &str, using_password: bool) -> Self {
        Self::new(
            codes::ER_ACCESS_DENIED,
            states::ACCESS_DENIED,
            format!(
                "Access denied for user '{}'@'{}' (using password: {})",
                user,
                host,
                if using_password { "YES" } else { "NO" }
            ),
        )
    }

    pub fn unknown_variable(name: &str) -> Self {
        Self::new(
            codes::ER_UNKNOWN_SYSTEM_VARIABLE,
            states::GENERAL_ERROR,
            format!("Unknown system variable '{}'", name),
        )
    }

    pub fn wrong_value_for_var(name: &str, value: &str) -> Self {
        Self::new(
            codes::ER_WRONG_VALUE_FOR_VAR,
            states::SYNTAX_ERROR,
            format!("Variable '{}' can't be set to the value of '{}'", name, value),
        )
    }

    pub fn cannot_user(operation: &str, account: &str) -> Self {
        Self::new(
            codes::ER_CANNOT_USER,
            states::GENERAL_ERROR,
            format!("Operation {} failed for {}", operation, account),
        )
    }

    pub fn out_of_range(expr: &str) -> Self {
        Self::new(
            codes::ER_DATA_OUT_OF_RANGE,
            states::OUT_OF_RANGE,
            format!("BIGINT value is out of range in '{}'", expr),
        )
    }

    /// The auto-increment counter has no next value
    pub fn autoinc_exhausted() -> Self {
        Self::new(
            codes::ER_AUTOINC_READ_FAILED,
            states::GENERAL_ERROR,
            "Failed to read auto-increment value from storage engine",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::ER_UNKNOWN_ERROR, states::GENERAL_ERROR, message)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR {} ({}): {}", self.code, self.state, self.message)
    }
}

impl std::error::Error for EngineError {}

impl From<SqlError> for EngineError {
    fn from(e: SqlError) -> Self {
        match e {
            SqlError::Parse(near) => EngineError::syntax(&near),
            SqlError::Unsupported(what) => EngineError::unsupported(&what),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        EngineError::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_entry_message() {
        let e = EngineError::duplicate_entry("10086", "students", "PRIMARY");
        assert_eq!(e.code, 1062);
        assert_eq!(e.state, "23000");
        assert_eq!(
            e.message,
            "Duplicate entry '10086' for key 'students.PRIMARY'"
        );
    }

    #[test]
    fn test_from_sql_error() {
        let e: EngineError = SqlError::Parse("near 'SELEC 1'".to_string()).into();
        assert_eq!(e.code, codes::ER_PARSE_ERROR);
        assert!(e.message.ends_with("near 'SELEC 1'"));
    }

    #[test]
    fn test_closed_storage_maps_to_unknown_error() {
        let e: EngineError = StorageError::Closed.into();
        assert_eq!(e.code, codes::ER_UNKNOWN_ERROR);
        assert_eq!(e.to_string(), "ERROR 1105 (HY000): Storage is closed");
    }
}
