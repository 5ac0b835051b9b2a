//! Writer lock error types
//!
//! Contention and lock loss are not errors: they come back as
//! `AcquireOutcome::Contended` and `Ok(false)` respectively.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while talking to a store's lock table
#[derive(Debug, Error)]
pub enum LockError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Store could not be opened
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Empty or otherwise unusable lock key
    #[error("Invalid lock key: {0:?}")]
    InvalidLockKey(String),

    /// Recovery command could not be parsed
    #[error("Invalid lock command '{input}': {reason}")]
    InvalidCommand { input: String, reason: String },

    /// Blocking lock I/O did not complete
    #[error("Lock task failed: {0}")]
    Task(String),
}

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_error_display() {
        let err = LockError::InvalidCommand {
            input: "NOPE:".to_string(),
            reason: "missing lock key".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid lock command 'NOPE:': missing lock key");
    }

    #[test]
    fn test_store_error_conversion() {
        let err: LockError = StoreError::UnknownArea("X".to_string()).into();
        assert!(matches!(err, LockError::Store(_)));
    }
}
