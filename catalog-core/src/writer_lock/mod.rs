//! Cooperative writer locks stored inside each store file
//!
//! Many desktop processes share the same store files over a network share. At most one
//! of them may write a given store at a time; the others open it read-only. Coordination
//! goes through the `app_writer_lock` table of the store itself:
//!
//! - `LockManager` acquires, refreshes, releases and force-clears lease rows
//! - `spawn_heartbeat` keeps a session's leases alive and demotes it when one is lost
//! - `recovery` lets an operator inspect and clear leftover rows

pub mod error;
pub mod heartbeat;
pub mod manager;
pub mod recovery;
pub mod row;

pub use error::{LockError, LockResult};
pub use heartbeat::{
    spawn_heartbeat, HeartbeatHandle, HeartbeatSettings, HeldLease, LeaseState,
    MIN_HEARTBEAT_INTERVAL,
};
pub use manager::LockManager;
pub use recovery::{
    execute_clear, inspect_stores, ClearCommand, ClearResult, LockReport, StoreLockStatus,
    StoreLocks,
};
pub use row::{AcquireOutcome, LeaseGrant, LockHolder, LockRow, LockTarget, LockToken, MAIN_LOCK_KEY};
