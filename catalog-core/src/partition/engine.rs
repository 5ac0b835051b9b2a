//! Legacy-to-area copy engine
//!
//! The destination store attaches the legacy file as schema `legacy` and copies each
//! area table with one `INSERT ... SELECT` over the columns both sides have in common.
//! Lock tables are never copied.

use metrics::counter;
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::error::{PartitionError, PartitionResult};
use super::report::{
    BootstrapAction, BootstrapOutcome, BootstrapReport, ResyncReport, StoreOutcome, TableCount,
    TableCounts,
};
use crate::store::schema::{area_tables, migrate, table_exists, table_exists_in, StoreLayout};
use crate::store::{Area, StorePaths};

const LEGACY_SCHEMA: &str = "legacy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyMode {
    /// Keep rows already present in the destination
    KeepExisting,
    /// Destination tables are emptied first
    Replace,
}

/// Make sure every area store exists and carries data
///
/// Stores that already hold rows are left alone. Others get their schema and, when the
/// legacy store exists, its rows (merged by primary key). One failing area does not stop
/// the others.
pub fn bootstrap(paths: &StorePaths, io_timeout: Duration) -> BootstrapReport {
    let legacy = paths.legacy.is_file().then_some(paths.legacy.as_path());
    if legacy.is_none() {
        warn!(legacy = %paths.legacy.display(), "legacy store not found, area stores get schema only");
    }

    let outcomes = Area::ALL
        .iter()
        .map(|&area| {
            let path = paths.area(area).to_path_buf();
            let result = bootstrap_area(area, &path, legacy, io_timeout);
            match &result {
                Ok(action) => info!(area = %area, store = %path.display(), ?action, "bootstrap"),
                Err(e) => error!(area = %area, store = %path.display(), error = %e, "bootstrap failed"),
            }
            BootstrapOutcome { area, path, result }
        })
        .collect();

    BootstrapReport { outcomes }
}

fn bootstrap_area(
    area: Area,
    path: &Path,
    legacy: Option<&Path>,
    io_timeout: Duration,
) -> PartitionResult<BootstrapAction> {
    let mut conn = open_destination(path, io_timeout)?;
    if is_populated(&conn, area)? {
        return Ok(BootstrapAction::AlreadyPopulated);
    }

    migrate(&conn, StoreLayout::Area(area))?;
    let Some(legacy) = legacy else {
        return Ok(BootstrapAction::SchemaOnly);
    };

    let counts = with_legacy_attached(&mut conn, legacy, |conn| {
        copy_area(conn, area, CopyMode::KeepExisting)
    })?;
    counter!("partition.rows_copied").increment(counts.total() as u64);
    Ok(BootstrapAction::Populated(counts))
}

/// Rebuild every area store from the legacy store
///
/// Each destination is replaced inside its own immediate transaction, so a failure
/// leaves that store exactly as it was. The report lists which stores succeeded.
pub fn resync(paths: &StorePaths, io_timeout: Duration) -> PartitionResult<ResyncReport> {
    if !paths.legacy.is_file() {
        return Err(PartitionError::LegacyMissing(paths.legacy.clone()));
    }

    let outcomes = Area::ALL
        .iter()
        .map(|&area| {
            let path = paths.area(area).to_path_buf();
            let started = Instant::now();
            let result = resync_area(area, &path, &paths.legacy, io_timeout);
            match &result {
                Ok(counts) => {
                    info!(
                        area = %area,
                        store = %path.display(),
                        rows = counts.total(),
                        skipped = ?counts.skipped_tables,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "resync committed"
                    );
                    counter!("partition.rows_copied").increment(counts.total() as u64);
                }
                Err(e) => {
                    error!(area = %area, store = %path.display(), error = %e, "resync rolled back");
                    counter!("partition.resync.failed").increment(1);
                }
            }
            StoreOutcome { area, path, result }
        })
        .collect();

    Ok(ResyncReport { outcomes })
}

fn resync_area(
    area: Area,
    path: &Path,
    legacy: &Path,
    io_timeout: Duration,
) -> PartitionResult<TableCounts> {
    let mut conn = open_destination(path, io_timeout)?;
    migrate(&conn, StoreLayout::Area(area))?;
    with_legacy_attached(&mut conn, legacy, |conn| copy_area(conn, area, CopyMode::Replace))
}

/// Row count per table, `None` when the file or the table does not exist
pub fn table_counts(path: &Path, tables: &[&str]) -> Vec<(String, Option<i64>)> {
    let conn = path
        .is_file()
        .then(|| Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY).ok())
        .flatten();

    tables
        .iter()
        .map(|table| {
            let count = conn.as_ref().and_then(|conn| count_rows(conn, table).ok().flatten());
            (table.to_string(), count)
        })
        .collect()
}

fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<Option<i64>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let sql = format!("SELECT COUNT(*) FROM \"{}\"", table);
    conn.query_row(&sql, [], |row| row.get(0)).map(Some)
}

fn open_destination(path: &Path, io_timeout: Duration) -> PartitionResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(io_timeout)?;
    // Rows are copied as legacy holds them, foreign keys are not re-checked.
    // Has no effect once a transaction is open.
    conn.pragma_update(None, "foreign_keys", false)?;
    Ok(conn)
}

/// All area tables exist and at least one of them has a row
fn is_populated(conn: &Connection, area: Area) -> rusqlite::Result<bool> {
    let mut any_rows = false;
    for table in area_tables(area) {
        if !table_exists(conn, table.name)? {
            return Ok(false);
        }
        if !any_rows {
            let sql = format!("SELECT EXISTS (SELECT 1 FROM \"{}\")", table.name);
            any_rows = conn.query_row(&sql, [], |row| row.get(0))?;
        }
    }
    Ok(any_rows)
}

fn with_legacy_attached<T>(
    conn: &mut Connection,
    legacy: &Path,
    body: impl FnOnce(&mut Connection) -> PartitionResult<T>,
) -> PartitionResult<T> {
    conn.execute(
        "ATTACH DATABASE ?1 AS legacy",
        params![legacy.to_string_lossy().into_owned()],
    )?;

    let result = body(conn);

    if let Err(e) = conn.execute_batch("DETACH DATABASE legacy") {
        warn!(error = %e, "failed to detach legacy store");
    }
    result
}

/// Copy one area's tables from `legacy` in a single immediate transaction
fn copy_area(conn: &mut Connection, area: Area, mode: CopyMode) -> PartitionResult<TableCounts> {
    let tables = area_tables(area);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut counts = TableCounts::default();

    let present: Vec<_> = tables
        .iter()
        .map(|t| table_exists_in(&tx, LEGACY_SCHEMA, t.name).map(|exists| (t.name, exists)))
        .collect::<rusqlite::Result<_>>()?;

    if mode == CopyMode::Replace {
        for (table, exists) in present.iter().rev() {
            if *exists {
                tx.execute(&format!("DELETE FROM main.\"{}\"", table), [])?;
            }
        }
    }

    for (table, exists) in present {
        if !exists {
            warn!(area = %area, table, "table missing from legacy store, skipped");
            counts.skipped_tables.push(table);
            continue;
        }

        let columns = shared_columns(&tx, table)?;
        if columns.is_empty() {
            counts.skipped_tables.push(table);
            continue;
        }

        let column_list = columns
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        let verb = match mode {
            CopyMode::KeepExisting => "INSERT OR IGNORE",
            CopyMode::Replace => "INSERT",
        };
        let sql = format!(
            "{verb} INTO main.\"{table}\" ({cols}) SELECT {cols} FROM {schema}.\"{table}\"",
            verb = verb,
            table = table,
            cols = column_list,
            schema = LEGACY_SCHEMA,
        );
        let rows = tx.execute(&sql, [])?;
        counts.copied.push(TableCount { table, rows });
    }

    tx.commit()?;
    Ok(counts)
}

/// Destination columns that the legacy table also has, in destination order
fn shared_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let destination = column_names(conn, "main", table)?;
    let source = column_names(conn, LEGACY_SCHEMA, table)?;
    Ok(destination
        .into_iter()
        .filter(|c| source.iter().any(|s| s.eq_ignore_ascii_case(c)))
        .collect())
}

fn column_names(conn: &Connection, schema: &str, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA \"{}\".table_info(\"{}\")", schema, table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    names.collect()
}
