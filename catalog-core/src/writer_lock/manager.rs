//! Lease-based writer lock on one store file
//!
//! Each store carries an `app_writer_lock` table with one row per lock key. A row is a
//! lease: its holder refreshes `heartbeat_at` periodically, and anyone may take the row
//! over once the heartbeat is older than the caller's timeout. Ownership is proved by a
//! random token that is replaced on every acquisition, so a holder whose lease was taken
//! over finds out on its next heartbeat.

use chrono::NaiveDateTime;
use metrics::counter;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{LockError, LockResult};
use super::row::{AcquireOutcome, LeaseGrant, LockRow, LockTarget, LockToken};
use crate::clock::{format_timestamp, Clock, SystemClock};
use crate::store::handle::{build_pool, StoreConnection};
use crate::store::schema::{lock_table_ddl, table_exists};
use crate::store::{StoreError, LOCK_TABLE};

/// Lock operations against a single store file
#[derive(Clone)]
pub struct LockManager {
    path: PathBuf,
    pool: Pool<SqliteConnectionManager>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager").field("path", &self.path).finish()
    }
}

impl LockManager {
    /// Open the lock table of the store at `path`, creating file and table if needed
    pub fn open(path: impl AsRef<Path>, io_timeout: Duration) -> LockResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::from)?;
        }

        let pool = build_pool(&path, OpenFlags::default(), io_timeout)?;
        let manager = Self {
            path,
            pool,
            clock: Arc::new(SystemClock),
        };

        manager.connection()?.execute_batch(lock_table_ddl())?;
        Ok(manager)
    }

    /// Replace the wall-clock source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lease for `lock_key`
    ///
    /// Runs inside one immediate transaction: the row is inserted when absent, taken over
    /// when its heartbeat is older than `timeout` (or unreadable), and left alone otherwise.
    pub fn try_acquire(
        &self,
        holder: &str,
        timeout: Duration,
        lock_key: &str,
    ) -> LockResult<AcquireOutcome> {
        validate_key(lock_key)?;
        let timeout_secs = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);

        let mut conn = self.connection()?;
        conn.execute_batch(lock_table_ddl())?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = self.clock.now();
        let existing = read_row(&tx, lock_key)?;

        let outcome = match existing {
            None => {
                let grant = new_grant(holder, lock_key, now, None);
                tx.execute(
                    "INSERT INTO app_writer_lock (lock_key, holder, token, acquired_at, heartbeat_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        grant.lock_key,
                        grant.holder,
                        grant.token.as_str(),
                        grant.acquired_at,
                        grant.heartbeat_at
                    ],
                )?;
                AcquireOutcome::Acquired(grant)
            }
            Some(row) if !row.is_stale(now, timeout_secs) => {
                AcquireOutcome::Contended(row.holder_info(now))
            }
            Some(row) => {
                let grant = new_grant(holder, lock_key, now, Some(row.holder.clone()));
                tx.execute(
                    "UPDATE app_writer_lock
                     SET holder = ?1, token = ?2, acquired_at = ?3, heartbeat_at = ?4
                     WHERE lock_key = ?5",
                    params![
                        grant.holder,
                        grant.token.as_str(),
                        grant.acquired_at,
                        grant.heartbeat_at,
                        grant.lock_key
                    ],
                )?;
                warn!(
                    store = %self.path.display(),
                    lock_key,
                    previous_holder = %row.holder,
                    age_secs = ?row.age_secs(now),
                    holder,
                    "took over stale writer lock"
                );
                AcquireOutcome::Acquired(grant)
            }
        };

        tx.commit()?;

        match &outcome {
            AcquireOutcome::Acquired(grant) => {
                info!(store = %self.path.display(), lock_key, holder = %grant.holder, "writer lock acquired");
                let outcome = if grant.stolen_from.is_some() { "stolen" } else { "fresh" };
                counter!("writer_lock.acquire.total", "outcome" => outcome).increment(1);
            }
            AcquireOutcome::Contended(current) => {
                debug!(
                    store = %self.path.display(),
                    lock_key,
                    holder = %current.holder,
                    age_secs = ?current.age_secs,
                    "writer lock held elsewhere"
                );
                counter!("writer_lock.acquire.total", "outcome" => "contended").increment(1);
            }
        }

        Ok(outcome)
    }

    /// Refresh the lease; `Ok(false)` means the row no longer carries `token`
    pub fn heartbeat(&self, token: &LockToken, lock_key: &str) -> LockResult<bool> {
        let conn = self.connection()?;
        if !table_exists(&conn, LOCK_TABLE)? {
            return Ok(false);
        }

        let stamp = format_timestamp(self.clock.now());
        let changed = conn.execute(
            "UPDATE app_writer_lock SET heartbeat_at = ?1 WHERE lock_key = ?2 AND token = ?3",
            params![stamp, lock_key, token.as_str()],
        )?;

        debug!(store = %self.path.display(), lock_key, changed, "heartbeat");
        Ok(changed == 1)
    }

    /// Drop the lease if it is still ours; releasing twice is harmless
    pub fn release(&self, token: &LockToken, lock_key: &str) -> LockResult<bool> {
        let conn = self.connection()?;
        if !table_exists(&conn, LOCK_TABLE)? {
            return Ok(false);
        }

        let removed = conn.execute(
            "DELETE FROM app_writer_lock WHERE lock_key = ?1 AND token = ?2",
            params![lock_key, token.as_str()],
        )?;

        if removed > 0 {
            info!(store = %self.path.display(), lock_key, "writer lock released");
            counter!("writer_lock.release.total").increment(1);
        }
        Ok(removed > 0)
    }

    /// Delete lock rows regardless of holder; returns the number removed
    pub fn force_clear(&self, target: &LockTarget) -> LockResult<usize> {
        let conn = self.connection()?;
        if !table_exists(&conn, LOCK_TABLE)? {
            return Ok(0);
        }

        let removed = match target {
            LockTarget::All => conn.execute("DELETE FROM app_writer_lock", [])?,
            LockTarget::Key(key) => conn.execute(
                "DELETE FROM app_writer_lock WHERE lock_key = ?1",
                params![key],
            )?,
        };

        warn!(store = %self.path.display(), target = %target, removed, "writer lock cleared by force");
        counter!("writer_lock.force_clear.rows").increment(removed as u64);
        Ok(removed)
    }

    /// Current row for `lock_key`, if any
    pub fn current(&self, lock_key: &str) -> LockResult<Option<LockRow>> {
        let conn = self.connection()?;
        if !table_exists(&conn, LOCK_TABLE)? {
            return Ok(None);
        }
        Ok(read_row(&conn, lock_key)?)
    }

    /// Every lock row, ordered by key
    pub fn list(&self) -> LockResult<Vec<LockRow>> {
        let conn = self.connection()?;
        if !table_exists(&conn, LOCK_TABLE)? {
            return Ok(Vec::new());
        }
        Ok(read_rows(&conn)?)
    }

    fn connection(&self) -> LockResult<StoreConnection> {
        self.pool.get().map_err(|e| {
            LockError::Store(StoreError::Pool {
                path: self.path.clone(),
                reason: e.to_string(),
            })
        })
    }
}

fn validate_key(lock_key: &str) -> LockResult<()> {
    if lock_key.trim().is_empty() {
        return Err(LockError::InvalidLockKey(lock_key.to_string()));
    }
    Ok(())
}

fn new_grant(
    holder: &str,
    lock_key: &str,
    now: NaiveDateTime,
    stolen_from: Option<String>,
) -> LeaseGrant {
    let stamp = format_timestamp(now);
    LeaseGrant {
        lock_key: lock_key.to_string(),
        holder: holder.to_string(),
        token: LockToken::mint(),
        acquired_at: stamp.clone(),
        heartbeat_at: stamp,
        stolen_from,
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LockRow> {
    Ok(LockRow {
        lock_key: row.get(0)?,
        holder: row.get(1)?,
        token: LockToken::from_raw(row.get::<_, String>(2)?),
        acquired_at: row.get(3)?,
        heartbeat_at: row.get(4)?,
    })
}

/// Read one lock row from any connection that can see the table
pub(crate) fn read_row(conn: &Connection, lock_key: &str) -> rusqlite::Result<Option<LockRow>> {
    conn.query_row(
        "SELECT lock_key, holder, token, acquired_at, heartbeat_at
         FROM app_writer_lock WHERE lock_key = ?1",
        params![lock_key],
        map_row,
    )
    .optional()
}

/// Read every lock row, ordered by key
pub(crate) fn read_rows(conn: &Connection) -> rusqlite::Result<Vec<LockRow>> {
    let mut stmt = conn.prepare(
        "SELECT lock_key, holder, token, acquired_at, heartbeat_at
         FROM app_writer_lock ORDER BY lock_key",
    )?;
    let rows = stmt.query_map([], map_row)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::writer_lock::row::MAIN_LOCK_KEY;
    use tempfile::TempDir;

    const IO: Duration = Duration::from_secs(2);
    const TIMEOUT: Duration = Duration::from_secs(60);

    fn manager(dir: &TempDir, clock: &ManualClock) -> LockManager {
        LockManager::open(dir.path().join("store.db"), IO)
            .unwrap()
            .with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn test_acquire_on_empty_table() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let locks = manager(&dir, &clock);

        let outcome = locks.try_acquire("alice", TIMEOUT, MAIN_LOCK_KEY).unwrap();
        let grant = outcome.into_grant().unwrap();
        assert_eq!(grant.holder, "alice");
        assert_eq!(grant.acquired_at, grant.heartbeat_at);
        assert!(grant.stolen_from.is_none());

        let row = locks.current(MAIN_LOCK_KEY).unwrap().unwrap();
        assert_eq!(row.token, grant.token);
    }

    #[test]
    fn test_fresh_lease_is_contended() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let locks = manager(&dir, &clock);

        locks.try_acquire("alice", TIMEOUT, MAIN_LOCK_KEY).unwrap();
        clock.advance(Duration::from_secs(10));

        let outcome = locks.try_acquire("bob", TIMEOUT, MAIN_LOCK_KEY).unwrap();
        match outcome {
            AcquireOutcome::Contended(holder) => {
                assert_eq!(holder.holder, "alice");
                assert_eq!(holder.age_secs, Some(10));
            }
            other => panic!("expected contention, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_lease_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let locks = manager(&dir, &clock);

        let first = locks
            .try_acquire("alice", TIMEOUT, MAIN_LOCK_KEY)
            .unwrap()
            .into_grant()
            .unwrap();
        clock.advance(Duration::from_secs(61));

        let second = locks
            .try_acquire("bob", TIMEOUT, MAIN_LOCK_KEY)
            .unwrap()
            .into_grant()
            .unwrap();
        assert_eq!(second.stolen_from.as_deref(), Some("alice"));
        assert_ne!(first.token, second.token);

        assert!(!locks.heartbeat(&first.token, MAIN_LOCK_KEY).unwrap());
        assert!(locks.heartbeat(&second.token, MAIN_LOCK_KEY).unwrap());
    }

    #[test]
    fn test_heartbeat_keeps_lease_fresh() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let locks = manager(&dir, &clock);

        let grant = locks
            .try_acquire("alice", TIMEOUT, MAIN_LOCK_KEY)
            .unwrap()
            .into_grant()
            .unwrap();

        for _ in 0..5 {
            clock.advance(Duration::from_secs(30));
            assert!(locks.heartbeat(&grant.token, MAIN_LOCK_KEY).unwrap());
        }

        let outcome = locks.try_acquire("bob", TIMEOUT, MAIN_LOCK_KEY).unwrap();
        assert!(!outcome.acquired());
    }

    #[test]
    fn test_release_is_idempotent_and_token_checked() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let locks = manager(&dir, &clock);

        let grant = locks
            .try_acquire("alice", TIMEOUT, MAIN_LOCK_KEY)
            .unwrap()
            .into_grant()
            .unwrap();

        assert!(!locks.release(&LockToken::mint(), MAIN_LOCK_KEY).unwrap());
        assert!(locks.current(MAIN_LOCK_KEY).unwrap().is_some());

        assert!(locks.release(&grant.token, MAIN_LOCK_KEY).unwrap());
        assert!(!locks.release(&grant.token, MAIN_LOCK_KEY).unwrap());
        assert!(locks.current(MAIN_LOCK_KEY).unwrap().is_none());
    }

    #[test]
    fn test_unparsable_heartbeat_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let locks = manager(&dir, &clock);

        let conn = Connection::open(locks.path()).unwrap();
        conn.execute(
            "INSERT INTO app_writer_lock VALUES ('MAIN', 'ghost', 'abc', 'yesterday', 'garbage')",
            [],
        )
        .unwrap();

        let outcome = locks
            .try_acquire("alice", Duration::from_secs(3600), MAIN_LOCK_KEY)
            .unwrap();
        let grant = outcome.into_grant().unwrap();
        assert_eq!(grant.stolen_from.as_deref(), Some("ghost"));
    }

    #[test]
    fn test_force_clear_targets() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let locks = manager(&dir, &clock);

        locks.try_acquire("alice", TIMEOUT, "MAIN").unwrap();
        locks.try_acquire("alice", TIMEOUT, "REPORTS").unwrap();
        assert_eq!(locks.list().unwrap().len(), 2);

        assert_eq!(locks.force_clear(&LockTarget::Key("MAIN".into())).unwrap(), 1);
        assert_eq!(locks.force_clear(&LockTarget::Key("MAIN".into())).unwrap(), 0);
        assert_eq!(locks.force_clear(&LockTarget::All).unwrap(), 1);
        assert!(locks.list().unwrap().is_empty());
    }

    #[test]
    fn test_empty_lock_key_rejected() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let locks = manager(&dir, &clock);

        let err = locks.try_acquire("alice", TIMEOUT, "  ").unwrap_err();
        assert!(matches!(err, LockError::InvalidLockKey(_)));
    }

    #[test]
    fn test_heartbeat_without_lock_table() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let locks = manager(&dir, &clock);

        Connection::open(locks.path())
            .unwrap()
            .execute("DROP TABLE app_writer_lock", [])
            .unwrap();

        assert!(!locks.heartbeat(&LockToken::mint(), MAIN_LOCK_KEY).unwrap());
        assert_eq!(locks.force_clear(&LockTarget::All).unwrap(), 0);
    }
}
