//! Partition error types

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while bootstrapping or resyncing area stores
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The unified store to copy from does not exist
    #[error("Legacy store not found: {}", .0.display())]
    LegacyMissing(PathBuf),

    /// SQLite error while copying
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PartitionResult<T> = Result<T, PartitionError>;
