//! Routing of catalog operations to area stores
//!
//! The router owns the three area stores of a session. Reads go to the operation's
//! store unconditionally. Writes are checked first against the store's write gate and
//! then against the session's editor scope, both before a connection is taken.

use metrics::counter;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::error::{RouterError, RouterResult};
use super::operation::Operation;
use crate::store::{Area, AreaStores, EditorScope, Store};

/// Per-session operation router
#[derive(Debug)]
pub struct ScopeRouter {
    stores: AreaStores,
    scope: EditorScope,
}

impl ScopeRouter {
    pub fn new(stores: AreaStores, scope: EditorScope) -> Self {
        Self { stores, scope }
    }

    pub fn editor_scope(&self) -> EditorScope {
        self.scope
    }

    pub fn store(&self, area: Area) -> &Store {
        self.stores.get(area)
    }

    pub fn stores(&self) -> &AreaStores {
        &self.stores
    }

    /// Path of every area store
    pub fn store_paths(&self) -> BTreeMap<Area, PathBuf> {
        self.stores
            .iter()
            .map(|store| (store.area(), store.path().to_path_buf()))
            .collect()
    }

    /// Store of the granted area; `MAIN` sessions default to normati
    pub fn active_store(&self) -> &Store {
        match self.scope {
            EditorScope::Area(area) => self.stores.get(area),
            EditorScope::Main => self.stores.get(Area::Normati),
        }
    }

    /// Resolve the store `op` runs against, enforcing write permissions
    pub fn route(&self, op: Operation) -> RouterResult<&Store> {
        let area = op.area();
        let store = self.stores.get(area);

        if op.is_write() {
            if store.is_read_only() {
                warn!(op = op.name(), area = %area, "write refused, store is read-only");
                counter!("router.denied", "reason" => "read_only").increment(1);
                return Err(RouterError::ReadOnly { op: op.name(), area });
            }
            if !self.scope.permits(area) {
                warn!(
                    op = op.name(),
                    area = %area,
                    scope = %self.scope,
                    "write refused, outside editor scope"
                );
                counter!("router.denied", "reason" => "scope").increment(1);
                return Err(RouterError::ScopeDenied {
                    op: op.name(),
                    session: self.scope,
                    required: area,
                });
            }
        }

        Ok(store)
    }

    /// Route `op` and run `f` on a connection to its store
    pub fn dispatch<T, F>(&self, op: Operation, f: F) -> RouterResult<T>
    where
        F: FnOnce(&Connection) -> RouterResult<T>,
    {
        let store = self.route(op)?;
        let conn = if op.is_write() {
            store.write_connection()?
        } else {
            store.read_connection()?
        };

        debug!(op = op.name(), area = %op.area(), "dispatch");
        f(&conn)
    }

    /// Same as `dispatch`, resolving the operation by identifier
    pub fn dispatch_named<T, F>(&self, name: &str, f: F) -> RouterResult<T>
    where
        F: FnOnce(&Connection) -> RouterResult<T>,
    {
        let op = Operation::from_name(name)
            .ok_or_else(|| RouterError::UnknownOperation(name.to_string()))?;
        self.dispatch(op, f)
    }
}
