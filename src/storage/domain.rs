//! Domain - catalog holder bound to one mock store
//!
//! Owns the catalog, the schema version counter, and the store-level settings
//! (schema lease, statistics collection). A fresh domain is seeded with the
//! `root@%` superuser, the `test` database, and default global variables.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::catalog::{
    Catalog, GrantEntry, HostPattern, Privilege, PrivilegeObject, TableId, UserDef,
};
use crate::executor::variables::SYSTEM_VARIABLES;

/// Superuser account created with every domain
pub const ROOT_USER: &str = "root";

/// Database present in every fresh domain
pub const DEFAULT_DATABASE: &str = "test";

pub struct Domain {
    catalog: RwLock<Catalog>,
    schema_lease: Duration,
    stats_enabled: bool,
    schema_version: AtomicU64,
    next_table_id: AtomicU64,
}

impl Domain {
    /// Create a seeded domain. Statistics collection is always off.
    pub fn bootstrap(schema_lease: Duration) -> Self {
        let mut catalog = Catalog::new();

        catalog.create_database(DEFAULT_DATABASE);
        catalog.add_user(UserDef {
            name: ROOT_USER.to_string(),
            host: HostPattern::any(),
            password_hash: String::new(),
            grants: vec![GrantEntry::new(Privilege::All, PrivilegeObject::Global)],
        });
        for var in SYSTEM_VARIABLES.iter().filter(|v| !v.read_only) {
            catalog.set_global(var.name, var.default);
        }

        Domain {
            catalog: RwLock::new(catalog),
            schema_lease,
            stats_enabled: false,
            schema_version: AtomicU64::new(1),
            next_table_id: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read()
    }

    pub fn catalog_mut(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write()
    }

    pub fn schema_lease(&self) -> Duration {
        self.schema_lease
    }

    pub fn stats_enabled(&self) -> bool {
        self.stats_enabled
    }

    pub fn schema_version(&self) -> u64 {
        self.schema_version.load(Ordering::Acquire)
    }

    /// Record a DDL change; returns the new version
    pub fn bump_schema_version(&self) -> u64 {
        self.schema_version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn allocate_table_id(&self) -> TableId {
        self.next_table_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_seeds_root_and_defaults() {
        let domain = Domain::bootstrap(Duration::from_millis(500));
        let catalog = domain.catalog();

        let root = catalog.match_user(ROOT_USER, "localhost").unwrap();
        assert!(root.password_hash.is_empty());
        assert_eq!(root.grants.len(), 1);
        assert!(catalog.database_exists(DEFAULT_DATABASE));
        assert_eq!(catalog.global("time_zone"), Some("SYSTEM"));
        assert_eq!(catalog.global("multi_statement_mode"), Some("OFF"));
        assert_eq!(catalog.global("version"), None);

        assert_eq!(domain.schema_lease(), Duration::from_millis(500));
        assert!(!domain.stats_enabled());
    }

    #[test]
    fn test_schema_version_and_table_ids() {
        let domain = Domain::bootstrap(Duration::from_millis(500));
        let v = domain.schema_version();
        assert_eq!(domain.bump_schema_version(), v + 1);

        let a = domain.allocate_table_id();
        let b = domain.allocate_table_id();
        assert_ne!(a, b);
    }
}
