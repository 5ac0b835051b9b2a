//! Shared catalog store coordination
//!
//! Several desktop processes share one catalog split across per-area SQLite files.
//! This crate provides the pieces that keep them from trampling each other:
//!
//! - [`writer_lock`]: lease-based single-writer lock per store file, with heartbeat and
//!   operator recovery
//! - [`partition`]: bootstrap and resync of the area stores from the legacy unified store
//! - [`router`]: maps catalog operations to area stores and enforces the editor scope
//! - [`session`]: login flow tying the three together

pub mod clock;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod partition;
pub mod router;
pub mod session;
pub mod store;
pub mod test_utils;
pub mod writer_lock;

pub use config::{Config, ConfigError};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
pub use router::{Operation, RouterError, ScopeRouter};
pub use session::{
    prepare_stores, CatalogSession, LoginOutcome, LoginRequest, RequestedRole, Role, SessionError,
};
pub use store::{Area, EditorScope, KnownStore, StorePaths};
pub use writer_lock::{AcquireOutcome, LeaseState, LockManager};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(Area::ALL.len(), 3);
        assert_eq!(Operation::ALL.len(), 93);
        assert!(Config::default().validate().is_ok());
    }
}
