//! Mock key-value store
//!
//! Holds table rows in process memory. A store opened with a directory takes
//! an exclusive `LOCK` file there so two stores never share a path; the rows
//! themselves are never written to disk.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::error::{StorageError, StorageResult};
use crate::catalog::TableId;
use crate::config::StoreOptions;
use crate::executor::Row;

const LOCK_FILE: &str = "LOCK";

/// Rows and auto-increment counter of one table
#[derive(Debug, Default)]
pub struct TableData {
    pub rows: Vec<Row>,
    /// Last value handed out for the AUTO_INCREMENT column
    pub auto_increment: i64,
}

/// In-memory row storage
pub struct MockStore {
    path: Option<PathBuf>,
    lock_file: Mutex<Option<PathBuf>>,
    closed: AtomicBool,
    tables: RwLock<HashMap<TableId, TableData>>,
}

impl MockStore {
    /// Open a store. An absent path gives a purely ephemeral store.
    pub fn open(options: &StoreOptions) -> StorageResult<Self> {
        let lock_file = match options.path() {
            Some(dir) => Some(acquire_lock(dir)?),
            None => None,
        };

        debug!(path = ?options.path(), "mock store opened");

        Ok(MockStore {
            path: options.path().map(Path::to_path_buf),
            lock_file: Mutex::new(lock_file),
            closed: AtomicBool::new(false),
            tables: RwLock::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    pub fn create_table(&self, id: TableId) -> StorageResult<()> {
        self.ensure_open()?;
        let mut tables = self.tables.write();
        if tables.contains_key(&id) {
            return Err(StorageError::TableExists(id));
        }
        tables.insert(id, TableData::default());
        Ok(())
    }

    /// Remove a table's rows; missing tables are ignored
    pub fn drop_table(&self, id: TableId) -> StorageResult<()> {
        self.ensure_open()?;
        self.tables.write().remove(&id);
        Ok(())
    }

    /// Remove all rows and reset the auto-increment counter
    pub fn truncate(&self, id: TableId) -> StorageResult<usize> {
        self.write(id, |data| {
            let removed = data.rows.len();
            data.rows.clear();
            data.auto_increment = 0;
            removed
        })
    }

    pub fn read<R>(&self, id: TableId, f: impl FnOnce(&TableData) -> R) -> StorageResult<R> {
        self.ensure_open()?;
        let tables = self.tables.read();
        let data = tables.get(&id).ok_or(StorageError::TableNotFound(id))?;
        Ok(f(data))
    }

    pub fn write<R>(
        &self,
        id: TableId,
        f: impl FnOnce(&mut TableData) -> R,
    ) -> StorageResult<R> {
        self.ensure_open()?;
        let mut tables = self.tables.write();
        let data = tables.get_mut(&id).ok_or(StorageError::TableNotFound(id))?;
        Ok(f(data))
    }

    /// Close the store, discarding all rows. Closing twice is a no-op.
    pub fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.tables.write().clear();

        if let Some(lock) = self.lock_file.lock().take() {
            match fs::remove_file(&lock) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(path = ?self.path, "mock store closed");
        Ok(())
    }
}

impl Drop for MockStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to release mock store lock");
        }
    }
}

fn acquire_lock(dir: &Path) -> StorageResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let lock = dir.join(LOCK_FILE);
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&lock) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(StorageError::Locked(dir.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    writeln!(file, "{}", std::process::id())?;
    Ok(lock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Datum;
    use tempfile::tempdir;

    #[test]
    fn test_ephemeral_store() {
        let store = MockStore::open(&StoreOptions::ephemeral()).unwrap();
        assert!(store.path().is_none());

        store.create_table(1).unwrap();
        store
            .write(1, |t| t.rows.push(vec![Datum::Int(1)]))
            .unwrap();
        assert_eq!(store.read(1, |t| t.rows.len()).unwrap(), 1);

        assert_eq!(store.truncate(1).unwrap(), 1);
        assert_eq!(store.read(1, |t| t.rows.len()).unwrap(), 0);
        assert!(matches!(
            store.create_table(1),
            Err(StorageError::TableExists(1))
        ));
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let store = MockStore::open(&StoreOptions::ephemeral()).unwrap();
        store.create_table(7).unwrap();
        store.close().unwrap();
        store.close().unwrap();

        assert!(store.is_closed());
        assert!(matches!(store.read(7, |_| ()), Err(StorageError::Closed)));
        assert!(matches!(store.create_table(8), Err(StorageError::Closed)));
    }

    #[test]
    fn test_directory_lock() {
        let dir = tempdir().unwrap();
        let options = StoreOptions::with_path(dir.path().join("db"));

        let first = MockStore::open(&options).unwrap();
        assert!(dir.path().join("db").join(LOCK_FILE).exists());
        assert!(matches!(
            MockStore::open(&options),
            Err(StorageError::Locked(_))
        ));

        first.close().unwrap();
        assert!(!dir.path().join("db").join(LOCK_FILE).exists());
        let second = MockStore::open(&options).unwrap();
        drop(second);
        assert!(!dir.path().join("db").join(LOCK_FILE).exists());
    }

    #[test]
    fn test_missing_table() {
        let store = MockStore::open(&StoreOptions::ephemeral()).unwrap();
        assert!(matches!(
            store.write(42, |_| ()),
            Err(StorageError::TableNotFound(42))
        ));
        store.drop_table(42).unwrap();
    }
}
