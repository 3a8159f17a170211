//! Storage subsystem
//!
//! Provides the in-memory mock store for row data and the domain that holds
//! catalog metadata on top of it.

pub mod domain;
pub mod error;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

pub use domain::{Domain, DEFAULT_DATABASE, ROOT_USER};
pub use error::{StorageError, StorageResult};
pub use store::{MockStore, TableData};

use crate::config::StoreOptions;

/// Provision a fresh mock store and a domain bound to it.
///
/// The domain is built only after the store opened successfully, so a failure
/// never leaves a half-initialized pair behind.
pub fn create_mock_store_and_domain(
    options: &StoreOptions,
    schema_lease: Duration,
) -> StorageResult<(Arc<MockStore>, Arc<Domain>)> {
    let store = Arc::new(MockStore::open(options)?);
    let domain = Arc::new(Domain::bootstrap(schema_lease));

    info!(
        path = ?options.path(),
        schema_lease_ms = schema_lease.as_millis() as u64,
        stats = domain.stats_enabled(),
        "mock storage provisioned"
    );

    Ok((store, domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_provision_ephemeral() {
        let (store, domain) =
            create_mock_store_and_domain(&StoreOptions::ephemeral(), Duration::from_millis(500))
                .unwrap();
        assert!(!store.is_closed());
        assert!(domain.catalog().database_exists(DEFAULT_DATABASE));
    }

    #[test]
    fn test_provision_fails_on_locked_directory() {
        let dir = tempdir().unwrap();
        let options = StoreOptions::with_path(dir.path());
        let (first, _domain) =
            create_mock_store_and_domain(&options, Duration::from_millis(500)).unwrap();

        let second = create_mock_store_and_domain(&options, Duration::from_millis(500));
        assert!(matches!(second, Err(StorageError::Locked(_))));

        first.close().unwrap();
        assert!(create_mock_store_and_domain(&options, Duration::from_millis(500)).is_ok());
    }
}
