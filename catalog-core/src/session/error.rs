//! Session error types
//!
//! Losing the race for a lock is not an error; see `LoginOutcome::Contended`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::writer_lock::LockError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("User name must not be empty")]
    EmptyUser,

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Blocking store I/O panicked or was cancelled
    #[error("Session task failed: {0}")]
    Task(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
