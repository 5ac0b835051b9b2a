//! Store schema and migrations
//!
//! Every store carries the writer lock table plus the domain tables of its layout.
//! Migrations are versioned, applied atomically, and tracked in `catalog_schema_version`.
//! Table lists are kept in copy order: parents before children.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::area::Area;
use crate::clock::{format_timestamp, Clock, SystemClock};

/// Name of the per-store writer lock table
pub const LOCK_TABLE: &str = "app_writer_lock";

/// Current schema version for every store layout
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// A domain table and its DDL
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub ddl: &'static str,
}

pub const NORMATI_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "category",
        ddl: "CREATE TABLE IF NOT EXISTS category (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                updated_at TEXT
            )",
    },
    TableSpec {
        name: "standard",
        ddl: "CREATE TABLE IF NOT EXISTS standard (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL DEFAULT '',
                updated_at TEXT
            )",
    },
    TableSpec {
        name: "subcategory",
        ddl: "CREATE TABLE IF NOT EXISTS subcategory (
                id INTEGER PRIMARY KEY,
                category_id INTEGER NOT NULL REFERENCES category(id),
                code TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                UNIQUE (category_id, code)
            )",
    },
    TableSpec {
        name: "item",
        ddl: "CREATE TABLE IF NOT EXISTS item (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                category_id INTEGER REFERENCES category(id),
                subcategory_id INTEGER REFERENCES subcategory(id),
                standard_id INTEGER REFERENCES standard(id),
                seq INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT '',
                notes TEXT,
                updated_at TEXT
            )",
    },
    TableSpec {
        name: "manual_version",
        ddl: "CREATE TABLE IF NOT EXISTS manual_version (
                id INTEGER PRIMARY KEY,
                version TEXT NOT NULL UNIQUE,
                released_at TEXT,
                body TEXT
            )",
    },
];

pub const COMMERCIALI_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "comm_category",
        ddl: "CREATE TABLE IF NOT EXISTS comm_category (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT ''
            )",
    },
    TableSpec {
        name: "comm_subcategory",
        ddl: "CREATE TABLE IF NOT EXISTS comm_subcategory (
                id INTEGER PRIMARY KEY,
                comm_category_id INTEGER NOT NULL REFERENCES comm_category(id),
                code TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                UNIQUE (comm_category_id, code)
            )",
    },
    TableSpec {
        name: "supplier",
        ddl: "CREATE TABLE IF NOT EXISTS supplier (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                vat_number TEXT,
                contact TEXT
            )",
    },
    TableSpec {
        name: "comm_item",
        ddl: "CREATE TABLE IF NOT EXISTS comm_item (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                comm_category_id INTEGER REFERENCES comm_category(id),
                comm_subcategory_id INTEGER REFERENCES comm_subcategory(id),
                supplier_id INTEGER REFERENCES supplier(id),
                seq INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT '',
                supplier_code TEXT,
                notes TEXT
            )",
    },
];

pub const MATERIALI_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "material",
        ddl: "CREATE TABLE IF NOT EXISTS material (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                family TEXT,
                subfamily TEXT,
                description TEXT NOT NULL DEFAULT '',
                density_g_cm3 REAL
            )",
    },
    TableSpec {
        name: "material_property",
        ddl: "CREATE TABLE IF NOT EXISTS material_property (
                id INTEGER PRIMARY KEY,
                material_id INTEGER NOT NULL REFERENCES material(id),
                name TEXT NOT NULL,
                value TEXT,
                unit TEXT,
                notes TEXT,
                UNIQUE (material_id, name)
            )",
    },
    TableSpec {
        name: "semi_item",
        ddl: "CREATE TABLE IF NOT EXISTS semi_item (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                material_id INTEGER REFERENCES material(id),
                semi_type TEXT,
                semi_state TEXT,
                description TEXT NOT NULL DEFAULT ''
            )",
    },
    TableSpec {
        name: "semi_item_dimension",
        ddl: "CREATE TABLE IF NOT EXISTS semi_item_dimension (
                id INTEGER PRIMARY KEY,
                semi_item_id INTEGER NOT NULL REFERENCES semi_item(id),
                name TEXT NOT NULL,
                value REAL,
                unit TEXT
            )",
    },
];

/// Domain tables owned by an area store, in copy order
pub fn area_tables(area: Area) -> &'static [TableSpec] {
    match area {
        Area::Normati => NORMATI_TABLES,
        Area::Commerciali => COMMERCIALI_TABLES,
        Area::Materiali => MATERIALI_TABLES,
    }
}

/// Which domain tables a store file carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLayout {
    /// One area's tables only
    Area(Area),
    /// The historical monolithic store with every area's tables
    Unified,
}

impl StoreLayout {
    pub fn tables(&self) -> Vec<TableSpec> {
        match self {
            StoreLayout::Area(area) => area_tables(*area).to_vec(),
            StoreLayout::Unified => Area::ALL
                .iter()
                .flat_map(|area| area_tables(*area).iter().copied())
                .collect(),
        }
    }
}

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: String,
}

/// All migrations for a layout, in order
pub fn get_migrations(layout: StoreLayout) -> Vec<Migration> {
    let domain_sql = layout
        .tables()
        .iter()
        .map(|table| format!("{};", table.ddl))
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        Migration {
            version: 1,
            description: "Writer lock table",
            up_sql: lock_table_ddl().to_string(),
        },
        Migration {
            version: 2,
            description: "Catalog domain tables",
            up_sql: domain_sql,
        },
    ]
}

/// DDL for the lock table; one row per lock key
pub fn lock_table_ddl() -> &'static str {
    "CREATE TABLE IF NOT EXISTS app_writer_lock (
        lock_key TEXT PRIMARY KEY,
        holder TEXT NOT NULL,
        token TEXT NOT NULL,
        acquired_at TEXT NOT NULL,
        heartbeat_at TEXT NOT NULL
    );"
}

fn ensure_version_table(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS catalog_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get current schema version recorded in the store
pub fn get_current_version(conn: &Connection) -> Result<i32, rusqlite::Error> {
    ensure_version_table(conn)?;

    let version: Option<i32> = conn
        .query_row(
            "SELECT version FROM catalog_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations for the given layout
///
/// Version 2 is re-applied when any domain table has gone missing, so a store whose
/// tables were dropped by hand is repaired on the next open.
pub fn migrate(conn: &Connection, layout: StoreLayout) -> Result<(), rusqlite::Error> {
    let mut current_version = get_current_version(conn)?;
    if current_version >= 2 && !missing_tables(conn, layout)?.is_empty() {
        current_version = 1;
    }

    let pending: Vec<_> = get_migrations(layout)
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    for migration in pending {
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(&migration.up_sql)?;
        tx.execute(
            "INSERT OR REPLACE INTO catalog_schema_version (version, applied_at) VALUES (?1, ?2)",
            params![migration.version, format_timestamp(SystemClock.now())],
        )?;

        tx.commit()?;

        info!(
            version = migration.version,
            description = migration.description,
            "applied schema migration"
        );
    }

    Ok(())
}

/// Whether a table exists in the given attached schema (`main`, `legacy`, ...)
pub fn table_exists_in(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> Result<bool, rusqlite::Error> {
    let sql = format!(
        "SELECT 1 FROM \"{}\".sqlite_master WHERE type = 'table' AND name = ?1",
        schema
    );
    Ok(conn
        .query_row(&sql, params![table], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Whether a table exists in the main schema
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    table_exists_in(conn, "main", table)
}

/// Domain tables of `layout` that the store does not have
pub fn missing_tables(
    conn: &Connection,
    layout: StoreLayout,
) -> Result<Vec<&'static str>, rusqlite::Error> {
    let mut missing = Vec::new();
    for table in layout.tables() {
        if !table_exists(conn, table.name)? {
            missing.push(table.name);
        }
    }
    Ok(missing)
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations(StoreLayout::Unified)
        .iter()
        .map(|m| m.version)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_area_migration_creates_only_area_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, StoreLayout::Area(Area::Commerciali)).expect("Migration failed");

        let tables = table_names(&conn);
        assert!(tables.contains(&LOCK_TABLE.to_string()));
        assert!(tables.contains(&"supplier".to_string()));
        assert!(tables.contains(&"comm_item".to_string()));
        assert!(!tables.contains(&"item".to_string()));
        assert!(!tables.contains(&"material".to_string()));
    }

    #[test]
    fn test_unified_migration_creates_every_table() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, StoreLayout::Unified).expect("Migration failed");

        assert!(missing_tables(&conn, StoreLayout::Unified).unwrap().is_empty());
        assert_eq!(StoreLayout::Unified.tables().len(), 13);
    }

    #[test]
    fn test_migration_version_tracking() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, StoreLayout::Area(Area::Normati)).expect("Migration failed");

        assert_eq!(get_current_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(get_latest_version(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_migrations() {
        let conn = Connection::open_in_memory().unwrap();

        migrate(&conn, StoreLayout::Area(Area::Materiali)).expect("First migration failed");
        migrate(&conn, StoreLayout::Area(Area::Materiali)).expect("Second migration failed");

        assert_eq!(get_current_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_dropped_table_is_recreated() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, StoreLayout::Area(Area::Normati)).unwrap();
        conn.execute_batch("DROP TABLE manual_version;").unwrap();

        assert_eq!(
            missing_tables(&conn, StoreLayout::Area(Area::Normati)).unwrap(),
            vec!["manual_version"]
        );

        migrate(&conn, StoreLayout::Area(Area::Normati)).unwrap();
        assert!(missing_tables(&conn, StoreLayout::Area(Area::Normati))
            .unwrap()
            .is_empty());
    }
}
