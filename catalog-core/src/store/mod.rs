//! Store files: identities, schema, and owned handles
//!
//! The catalog lives in one durable SQLite file per area plus the historical unified file.
//! Stores are independent: there are no cross-store transactions, and each one carries
//! its own `app_writer_lock` table.

pub mod area;
pub mod error;
pub mod handle;
pub mod paths;
pub mod schema;

pub use area::{Area, EditorScope, KnownStore};
pub use error::{StoreError, StoreResult};
pub use handle::{AccessMode, AreaStores, Store, StoreConnection, WriteGate};
pub use paths::{default_file_name, StorePaths};
pub use schema::{area_tables, migrate, StoreLayout, TableSpec, LOCK_TABLE};
