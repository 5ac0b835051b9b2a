//! Splitting the legacy unified store into area stores
//!
//! `bootstrap` runs on every startup and only fills stores that are new or empty.
//! `resync` is the operator's repair tool and rebuilds every area store from the
//! legacy store, one destination transaction at a time.

pub mod engine;
pub mod error;
pub mod report;

pub use engine::{bootstrap, resync, table_counts};
pub use error::{PartitionError, PartitionResult};
pub use report::{
    BootstrapAction, BootstrapOutcome, BootstrapReport, ResyncReport, StoreOutcome, TableCount,
    TableCounts,
};
