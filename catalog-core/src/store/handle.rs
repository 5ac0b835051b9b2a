//! Owned store handles
//!
//! A `Store` wraps a connection pool for one store file together with a `WriteGate`.
//! The gate starts open only for handles opened read-write, and can only ever close:
//! once a session loses its writer lease the gate is demoted and stays shut.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::area::Area;
use super::error::{StoreError, StoreResult};
use super::paths::StorePaths;
use super::schema::{migrate, StoreLayout};

/// Pooled connection type handed out by stores
pub type StoreConnection = PooledConnection<SqliteConnectionManager>;

const POOL_SIZE: u32 = 4;

/// How a store file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadOnly => f.write_str("ro"),
            AccessMode::ReadWrite => f.write_str("rw"),
        }
    }
}

/// Shared, one-way "writes allowed" flag
#[derive(Debug, Clone)]
pub struct WriteGate {
    writable: Arc<AtomicBool>,
}

impl WriteGate {
    pub fn new(writable: bool) -> Self {
        Self {
            writable: Arc::new(AtomicBool::new(writable)),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    /// Close the gate for good
    pub fn demote(&self) {
        self.writable.store(false, Ordering::Release);
    }
}

/// One opened store file
pub struct Store {
    area: Area,
    path: PathBuf,
    pool: Pool<SqliteConnectionManager>,
    gate: WriteGate,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("area", &self.area)
            .field("path", &self.path)
            .field("writable", &self.gate.is_writable())
            .finish()
    }
}

impl Store {
    /// Open an area store
    ///
    /// `ReadOnly` never creates anything and fails with `StoreError::Missing` when the file
    /// is absent. `ReadWrite` creates the file if needed and brings its schema up to date.
    pub fn open(
        area: Area,
        path: impl AsRef<Path>,
        mode: AccessMode,
        io_timeout: Duration,
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let flags = match mode {
            AccessMode::ReadOnly => {
                if !path.is_file() {
                    return Err(StoreError::Missing(path));
                }
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
            AccessMode::ReadWrite => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                OpenFlags::default()
            }
        };

        let pool = build_pool(&path, flags, io_timeout)?;
        let store = Self {
            area,
            path,
            pool,
            gate: WriteGate::new(mode == AccessMode::ReadWrite),
        };

        let conn = store.checkout()?;
        if mode == AccessMode::ReadWrite {
            migrate(&conn, StoreLayout::Area(area))?;
        }

        debug!(area = %area, store = %store.path.display(), mode = %mode, "opened store");
        Ok(store)
    }

    pub fn area(&self) -> Area {
        self.area
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current access mode, re-read from the gate on every call
    pub fn mode(&self) -> AccessMode {
        if self.gate.is_writable() {
            AccessMode::ReadWrite
        } else {
            AccessMode::ReadOnly
        }
    }

    pub fn is_read_only(&self) -> bool {
        !self.gate.is_writable()
    }

    /// Handle on this store's gate, for the heartbeat task
    pub fn gate(&self) -> WriteGate {
        self.gate.clone()
    }

    /// Demote this handle to read-only
    pub fn demote(&self) {
        if self.gate.is_writable() {
            warn!(area = %self.area, store = %self.path.display(), "store demoted to read-only");
        }
        self.gate.demote();
    }

    /// Connection for reads
    pub fn read_connection(&self) -> StoreResult<StoreConnection> {
        self.checkout()
    }

    /// Connection for writes; refused once the gate is closed
    pub fn write_connection(&self) -> StoreResult<StoreConnection> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly {
                area: self.area.code().to_string(),
            });
        }
        self.checkout()
    }

    fn checkout(&self) -> StoreResult<StoreConnection> {
        self.pool.get().map_err(|e| StoreError::Pool {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

/// Build a small pool whose connections wait at most `io_timeout` on a busy file
pub(crate) fn build_pool(
    path: &Path,
    flags: OpenFlags,
    io_timeout: Duration,
) -> StoreResult<Pool<SqliteConnectionManager>> {
    let io_timeout = io_timeout.max(Duration::from_millis(1));
    let manager = SqliteConnectionManager::file(path)
        .with_flags(flags)
        .with_init(move |conn| conn.busy_timeout(io_timeout));

    Pool::builder()
        .max_size(POOL_SIZE)
        .min_idle(Some(0))
        .connection_timeout(io_timeout)
        .build(manager)
        .map_err(|e| StoreError::Pool {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// The three area stores of one session
#[derive(Debug)]
pub struct AreaStores {
    normati: Store,
    commerciali: Store,
    materiali: Store,
}

impl AreaStores {
    pub fn new(normati: Store, commerciali: Store, materiali: Store) -> Self {
        Self {
            normati,
            commerciali,
            materiali,
        }
    }

    /// Open the three stores, read-write for `writable` areas and read-only otherwise
    pub fn open(paths: &StorePaths, writable: &[Area], io_timeout: Duration) -> StoreResult<Self> {
        let open = |area: Area| {
            let mode = if writable.contains(&area) {
                AccessMode::ReadWrite
            } else {
                AccessMode::ReadOnly
            };
            Store::open(area, paths.area(area), mode, io_timeout)
        };

        Ok(Self::new(
            open(Area::Normati)?,
            open(Area::Commerciali)?,
            open(Area::Materiali)?,
        ))
    }

    pub fn get(&self, area: Area) -> &Store {
        match area {
            Area::Normati => &self.normati,
            Area::Commerciali => &self.commerciali,
            Area::Materiali => &self.materiali,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Store> {
        [&self.normati, &self.commerciali, &self.materiali].into_iter()
    }

    /// Demote every handle
    pub fn demote_all(&self) {
        for store in self.iter() {
            store.demote();
        }
    }
}
