//! System variable registry
//!
//! Settable variables are stored as strings in the catalog (global) and the
//! session; read-only ones are answered by the engine from its own state.

use super::time::TimeZoneSpec;

/// Where a variable may be set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    GlobalOnly,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Text,
    Number,
    Switch,
    TimeZone,
    MultiStatement,
}

#[derive(Debug)]
pub struct SystemVariable {
    pub name: &'static str,
    pub default: &'static str,
    pub scope: VarScope,
    pub read_only: bool,
    kind: VarKind,
}

impl SystemVariable {
    /// Validate and normalize a new value; `None` if rejected
    pub fn normalize(&self, value: &str) -> Option<String> {
        match self.kind {
            VarKind::Text => Some(value.to_string()),
            VarKind::Number => value.trim().parse::<u64>().ok().map(|n| n.to_string()),
            VarKind::Switch => match value.to_uppercase().as_str() {
                "ON" | "1" | "TRUE" => Some("ON".to_string()),
                "OFF" | "0" | "FALSE" => Some("OFF".to_string()),
                _ => None,
            },
            VarKind::TimeZone => TimeZoneSpec::parse(value).map(|z| z.name()),
            VarKind::MultiStatement => match value.to_uppercase().as_str() {
                "ON" | "1" => Some("ON".to_string()),
                "OFF" | "0" => Some("OFF".to_string()),
                "WARN" | "2" => Some("WARN".to_string()),
                _ => None,
            },
        }
    }

    /// Numeric variables are returned to clients as integers
    pub fn is_numeric(&self) -> bool {
        self.kind == VarKind::Number
    }
}

const fn var(
    name: &'static str,
    default: &'static str,
    scope: VarScope,
    kind: VarKind,
) -> SystemVariable {
    SystemVariable {
        name,
        default,
        scope,
        read_only: false,
        kind,
    }
}

const fn read_only(name: &'static str, kind: VarKind) -> SystemVariable {
    SystemVariable {
        name,
        default: "",
        scope: VarScope::GlobalOnly,
        read_only: true,
        kind,
    }
}

use VarKind::*;
use VarScope::*;

pub static SYSTEM_VARIABLES: &[SystemVariable] = &[
    var("time_zone", "SYSTEM", Both, TimeZone),
    var("multi_statement_mode", "OFF", Both, MultiStatement),
    var("autocommit", "ON", Both, Switch),
    var("foreign_key_checks", "ON", Both, Switch),
    var("sql_mode", "STRICT_TRANS_TABLES,NO_ENGINE_SUBSTITUTION", Both, Text),
    var("character_set_client", "utf8mb4", Both, Text),
    var("character_set_connection", "utf8mb4", Both, Text),
    var("character_set_results", "utf8mb4", Both, Text),
    var("character_set_server", "utf8mb4", Both, Text),
    var("collation_connection", "utf8mb4_bin", Both, Text),
    var("collation_server", "utf8mb4_bin", Both, Text),
    var("transaction_isolation", "REPEATABLE-READ", Both, Text),
    var("max_allowed_packet", "67108864", Both, Number),
    var("wait_timeout", "28800", Both, Number),
    var("interactive_timeout", "28800", Both, Number),
    var("net_read_timeout", "30", Both, Number),
    var("net_write_timeout", "60", Both, Number),
    var("sql_select_limit", "18446744073709551615", Both, Number),
    read_only("version", Text),
    read_only("version_comment", Text),
    read_only("socket", Text),
    read_only("port", Number),
    read_only("lower_case_table_names", Number),
    read_only("schema_lease", Text),
    read_only("schema_version", Number),
    read_only("stats_collection", Switch),
];

/// Look up a variable by name (case-insensitive)
pub fn lookup(name: &str) -> Option<&'static SystemVariable> {
    SYSTEM_VARIABLES
        .iter()
        .find(|v| v.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(lookup("TIME_ZONE").is_some());
        assert!(lookup("version").unwrap().read_only);
        assert!(lookup("no_such_var").is_none());
    }

    #[test]
    fn test_normalize() {
        let tz = lookup("time_zone").unwrap();
        assert_eq!(tz.normalize("utc"), Some("UTC".to_string()));
        assert_eq!(tz.normalize("Mars/Olympus"), None);

        let mode = lookup("multi_statement_mode").unwrap();
        assert_eq!(mode.normalize("on"), Some("ON".to_string()));
        assert_eq!(mode.normalize("maybe"), None);

        let packet = lookup("max_allowed_packet").unwrap();
        assert_eq!(packet.normalize("1024"), Some("1024".to_string()));
        assert_eq!(packet.normalize("big"), None);
        assert!(packet.is_numeric());
    }
}
