//! Store error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening or using a store file
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store file does not exist and the open mode cannot create it
    #[error("Store file not found: {}", .0.display())]
    Missing(PathBuf),

    /// Connection pool could not hand out a connection within the I/O timeout
    #[error("Store unavailable ({}): {reason}", path.display())]
    Pool { path: PathBuf, reason: String },

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Write attempted through a read-only handle
    #[error("Store {area} is open read-only")]
    ReadOnly { area: String },

    /// Unrecognised area code
    #[error("Unknown area: {0}")]
    UnknownArea(String),

    /// Unrecognised editor scope code
    #[error("Unknown editor scope: {0}")]
    UnknownScope(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
