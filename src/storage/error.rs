//! Storage error types

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::TableId;

/// Storage operation errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Another store holds the directory lock
    #[error("Storage directory {} is locked by another store", .0.display())]
    Locked(PathBuf),

    #[error("Table {0} not found in storage")]
    TableNotFound(TableId),

    #[error("Table {0} already exists in storage")]
    TableExists(TableId),

    /// Storage is closed
    #[error("Storage is closed")]
    Closed,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
