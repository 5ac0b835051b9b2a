//! Operator tools for inspecting and clearing writer locks
//!
//! Inspection never creates files or tables: store files are opened read-only and a
//! missing file or missing lock table is reported as such.

use chrono::NaiveDateTime;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::error::{LockError, LockResult};
use super::manager::{read_rows, LockManager};
use super::row::LockTarget;
use crate::clock::Clock;
use crate::store::schema::table_exists;
use crate::store::{KnownStore, LOCK_TABLE};

/// One lock row as shown to an operator
#[derive(Debug, Clone, Serialize)]
pub struct LockReport {
    pub lock_key: String,
    pub holder: String,
    pub token: String,
    pub acquired_at: String,
    pub heartbeat_at: String,
    /// `None` when the heartbeat timestamp does not parse
    pub age_secs: Option<i64>,
    pub stale: bool,
}

/// Lock state of one store file
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreLockStatus {
    MissingFile,
    NoLockTable,
    Unreadable { reason: String },
    Locks { locks: Vec<LockReport> },
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreLocks {
    pub store: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: StoreLockStatus,
}

/// Report the lock rows of every store in `stores`
pub fn inspect_stores(
    stores: &[(KnownStore, PathBuf)],
    stale_after: Duration,
    clock: &dyn Clock,
) -> Vec<StoreLocks> {
    let timeout_secs = i64::try_from(stale_after.as_secs()).unwrap_or(i64::MAX);
    let now = clock.now();

    stores
        .iter()
        .map(|(store, path)| StoreLocks {
            store: store.code().to_string(),
            path: path.clone(),
            status: inspect_one(path, now, timeout_secs).unwrap_or_else(|e| {
                StoreLockStatus::Unreadable {
                    reason: e.to_string(),
                }
            }),
        })
        .collect()
}

fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn has_lock_table(path: &Path) -> LockResult<bool> {
    Ok(table_exists(&open_read_only(path)?, LOCK_TABLE)?)
}

fn inspect_one(path: &Path, now: NaiveDateTime, timeout_secs: i64) -> LockResult<StoreLockStatus> {
    if !path.is_file() {
        return Ok(StoreLockStatus::MissingFile);
    }

    let conn = open_read_only(path)?;
    if !table_exists(&conn, LOCK_TABLE)? {
        return Ok(StoreLockStatus::NoLockTable);
    }

    let locks = read_rows(&conn)?
        .into_iter()
        .map(|row| LockReport {
            age_secs: row.age_secs(now),
            stale: row.is_stale(now, timeout_secs),
            token: row.token.as_str().to_string(),
            lock_key: row.lock_key,
            holder: row.holder,
            acquired_at: row.acquired_at,
            heartbeat_at: row.heartbeat_at,
        })
        .collect();

    Ok(StoreLockStatus::Locks { locks })
}

/// Which locks an operator asked to clear
///
/// Grammar: `ALL` clears every row of every store, `STORE:ALL` every row of one store,
/// `STORE:KEY` one row. Store codes and `ALL` are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearCommand {
    All,
    Store { store: KnownStore, target: LockTarget },
}

impl FromStr for ClearCommand {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = |reason: &str| LockError::InvalidCommand {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        if input.eq_ignore_ascii_case("ALL") {
            return Ok(ClearCommand::All);
        }

        let (store, key) = input
            .split_once(':')
            .ok_or_else(|| invalid("expected ALL, STORE:ALL or STORE:KEY"))?;
        let store: KnownStore = store
            .trim()
            .parse()
            .map_err(|_| invalid("unknown store"))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(invalid("missing lock key"));
        }

        let target = if key.eq_ignore_ascii_case("ALL") {
            LockTarget::All
        } else {
            LockTarget::Key(key.to_string())
        };
        Ok(ClearCommand::Store { store, target })
    }
}

impl ClearCommand {
    /// Expand into per-store targets
    pub fn targets(&self, stores: &[(KnownStore, PathBuf)]) -> Vec<(KnownStore, PathBuf, LockTarget)> {
        match self {
            ClearCommand::All => stores
                .iter()
                .map(|(store, path)| (*store, path.clone(), LockTarget::All))
                .collect(),
            ClearCommand::Store { store, target } => stores
                .iter()
                .filter(|(s, _)| s == store)
                .map(|(s, path)| (*s, path.clone(), target.clone()))
                .collect(),
        }
    }
}

/// Outcome of clearing one store
#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub store: String,
    pub path: PathBuf,
    pub removed: usize,
    /// Set when the store was not touched
    pub skipped: Option<String>,
}

/// Clear the locks selected by `command`
///
/// Missing store files and stores without a lock table are skipped, never created. A
/// store that cannot be read or cleared is reported as skipped and the remaining
/// stores are still processed.
pub fn execute_clear(
    stores: &[(KnownStore, PathBuf)],
    command: &ClearCommand,
    io_timeout: Duration,
) -> Vec<ClearResult> {
    let mut results = Vec::new();

    for (store, path, target) in command.targets(stores) {
        let skipped = |path: PathBuf, reason: String| ClearResult {
            store: store.code().to_string(),
            path,
            removed: 0,
            skipped: Some(reason),
        };

        if !path.is_file() {
            info!(store = %store, path = %path.display(), "store file missing, nothing to clear");
            results.push(skipped(path, "missing file".to_string()));
            continue;
        }

        match has_lock_table(&path) {
            Ok(true) => {}
            Ok(false) => {
                info!(store = %store, path = %path.display(), "store has no lock table, nothing to clear");
                results.push(skipped(path, "no lock table".to_string()));
                continue;
            }
            Err(e) => {
                warn!(store = %store, path = %path.display(), error = %e, "store unreadable, not cleared");
                results.push(skipped(path, format!("unreadable: {}", e)));
                continue;
            }
        }

        match LockManager::open(&path, io_timeout).and_then(|manager| manager.force_clear(&target)) {
            Ok(removed) => {
                if removed > 0 {
                    warn!(store = %store, target = %target, removed, "cleared writer locks");
                }
                results.push(ClearResult {
                    store: store.code().to_string(),
                    path,
                    removed,
                    skipped: None,
                });
            }
            Err(e) => {
                warn!(store = %store, path = %path.display(), error = %e, "clear failed");
                results.push(skipped(path, format!("clear failed: {}", e)));
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{Area, StorePaths};
    use crate::writer_lock::row::MAIN_LOCK_KEY;
    use std::sync::Arc;
    use tempfile::TempDir;

    const IO: Duration = Duration::from_secs(2);

    #[test]
    fn test_parse_clear_commands() {
        assert_eq!("all".parse::<ClearCommand>().unwrap(), ClearCommand::All);
        assert_eq!(
            "materiali:MAIN".parse::<ClearCommand>().unwrap(),
            ClearCommand::Store {
                store: KnownStore::Area(Area::Materiali),
                target: LockTarget::Key("MAIN".to_string()),
            }
        );
        assert_eq!(
            "LEGACY:all".parse::<ClearCommand>().unwrap(),
            ClearCommand::Store {
                store: KnownStore::Legacy,
                target: LockTarget::All,
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_commands() {
        for bad in ["", "MAIN", "NOWHERE:MAIN", "NORMATI:", "NORMATI:  "] {
            assert!(bad.parse::<ClearCommand>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_inspect_reports_missing_and_tableless_stores() {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        Connection::open(&paths.normati)
            .unwrap()
            .execute("CREATE TABLE item (id INTEGER PRIMARY KEY)", [])
            .unwrap();

        let clock = ManualClock::starting_now();
        let reports = inspect_stores(&paths.known_stores(), Duration::from_secs(60), &clock);

        assert_eq!(reports.len(), 4);
        assert!(matches!(reports[0].status, StoreLockStatus::MissingFile));
        assert!(matches!(reports[1].status, StoreLockStatus::NoLockTable));
        assert!(!paths.legacy.exists());
    }

    #[test]
    fn test_inspect_and_clear_one_store() {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let clock = ManualClock::starting_now();

        for area in Area::ALL {
            LockManager::open(paths.area(area), IO)
                .unwrap()
                .with_clock(Arc::new(clock.clone()))
                .try_acquire("alice", Duration::from_secs(60), MAIN_LOCK_KEY)
                .unwrap();
        }
        clock.advance(Duration::from_secs(90));

        let reports = inspect_stores(&paths.known_stores(), Duration::from_secs(60), &clock);
        match &reports[3].status {
            StoreLockStatus::Locks { locks } => {
                assert_eq!(locks.len(), 1);
                assert_eq!(locks[0].holder, "alice");
                assert_eq!(locks[0].age_secs, Some(90));
                assert!(locks[0].stale);
            }
            other => panic!("unexpected status {:?}", other),
        }

        let command: ClearCommand = "MATERIALI:MAIN".parse().unwrap();
        let results = execute_clear(&paths.known_stores(), &command, IO);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].removed, 1);

        let remaining = LockManager::open(&paths.normati, IO).unwrap().list().unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn test_clear_all_skips_missing_files() {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        LockManager::open(&paths.commerciali, IO)
            .unwrap()
            .try_acquire("bob", Duration::from_secs(60), MAIN_LOCK_KEY)
            .unwrap();

        let results = execute_clear(&paths.known_stores(), &ClearCommand::All, IO);
        assert_eq!(results.len(), 4);
        assert_eq!(results.iter().map(|r| r.removed).sum::<usize>(), 1);
        assert_eq!(results.iter().filter(|r| r.skipped.is_some()).count(), 3);
        assert!(!paths.legacy.exists());
    }

    #[test]
    fn test_clear_leaves_tableless_store_untouched() {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        Connection::open(&paths.legacy)
            .unwrap()
            .execute("CREATE TABLE item (id INTEGER PRIMARY KEY)", [])
            .unwrap();

        let command: ClearCommand = "LEGACY:ALL".parse().unwrap();
        let results = execute_clear(&paths.known_stores(), &command, IO);
        assert_eq!(results[0].skipped.as_deref(), Some("no lock table"));

        let conn = Connection::open(&paths.legacy).unwrap();
        assert!(!table_exists(&conn, LOCK_TABLE).unwrap());
    }

    #[test]
    fn test_clear_all_continues_past_unreadable_store() {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        std::fs::write(&paths.legacy, "not a catalog store\n".repeat(64)).unwrap();
        for area in Area::ALL {
            LockManager::open(paths.area(area), IO)
                .unwrap()
                .try_acquire("alice", Duration::from_secs(60), MAIN_LOCK_KEY)
                .unwrap();
        }

        let results = execute_clear(&paths.known_stores(), &ClearCommand::All, IO);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].store, "LEGACY");
        assert_eq!(results[0].removed, 0);
        assert!(results[0]
            .skipped
            .as_deref()
            .is_some_and(|reason| reason.starts_with("unreadable")));

        for result in &results[1..] {
            assert_eq!(result.removed, 1, "{}", result.store);
            assert!(result.skipped.is_none());
        }
        for area in Area::ALL {
            assert!(LockManager::open(paths.area(area), IO).unwrap().list().unwrap().is_empty());
        }
    }

    #[test]
    fn test_status_serializes_with_tag() {
        let report = StoreLocks {
            store: "LEGACY".to_string(),
            path: PathBuf::from("legacy.db"),
            status: StoreLockStatus::MissingFile,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "missing_file");
        assert_eq!(json["store"], "LEGACY");
    }
}
