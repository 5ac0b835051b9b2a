//! Store fixtures
//!
//! Builds unified legacy stores with deterministic content so copy results can be
//! checked table by table.

use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;

use crate::partition::{bootstrap, PartitionResult};
use crate::store::schema::{migrate, StoreLayout};
use crate::store::StorePaths;

/// I/O timeout used by fixtures
pub const TEST_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// How many rows to put in a seeded legacy store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacySeed {
    pub categories: usize,
    pub standards: usize,
    pub items: usize,
    pub manual_versions: usize,
    pub suppliers: usize,
    pub comm_items: usize,
    pub materials: usize,
    pub semi_items: usize,
}

impl Default for LegacySeed {
    fn default() -> Self {
        Self {
            categories: 3,
            standards: 2,
            items: 12,
            manual_versions: 2,
            suppliers: 2,
            comm_items: 8,
            materials: 4,
            semi_items: 6,
        }
    }
}

impl LegacySeed {
    /// Rows a fully copied store should hold for `table`
    pub fn expected_rows(&self, table: &str) -> usize {
        match table {
            "category" | "subcategory" | "comm_category" | "comm_subcategory" => self.categories,
            "standard" => self.standards,
            "item" => self.items,
            "manual_version" => self.manual_versions,
            "supplier" => self.suppliers,
            "comm_item" => self.comm_items,
            "material" => self.materials,
            "material_property" => self.materials * 2,
            "semi_item" => self.semi_items,
            "semi_item_dimension" => self.semi_items * 2,
            _ => 0,
        }
    }

    /// Same shape with every count scaled, for "legacy was edited" scenarios
    pub fn scaled(&self, factor: usize) -> Self {
        Self {
            categories: self.categories * factor,
            standards: self.standards * factor,
            items: self.items * factor,
            manual_versions: self.manual_versions * factor,
            suppliers: self.suppliers * factor,
            comm_items: self.comm_items * factor,
            materials: self.materials * factor,
            semi_items: self.semi_items * factor,
        }
    }
}

/// Create (or extend) a unified store at `path` with rows in every domain table
///
/// Rows use fixed primary keys, so seeding a larger shape over a smaller one adds the
/// missing rows and leaves existing ones alone.
pub fn seed_legacy_store(path: &Path, seed: &LegacySeed) -> rusqlite::Result<()> {
    let conn = Connection::open(path)?;
    migrate(&conn, StoreLayout::Unified)?;
    let tx = conn.unchecked_transaction()?;

    let categories = seed.categories.max(1);
    let standards = seed.standards.max(1);
    let suppliers = seed.suppliers.max(1);
    let materials = seed.materials.max(1);

    for i in 1..=seed.categories as i64 {
        tx.execute(
            "INSERT OR IGNORE INTO category (id, code, description) VALUES (?1, ?2, ?3)",
            params![i, format!("CAT{:02}", i), format!("Category {}", i)],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO subcategory (id, category_id, code) VALUES (?1, ?1, 'GEN')",
            params![i],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO comm_category (id, code, description) VALUES (?1, ?2, ?3)",
            params![i, format!("COM{:02}", i), format!("Commercial {}", i)],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO comm_subcategory (id, comm_category_id, code) VALUES (?1, ?1, 'GEN')",
            params![i],
        )?;
    }

    for i in 1..=seed.standards as i64 {
        tx.execute(
            "INSERT OR IGNORE INTO standard (id, code, title) VALUES (?1, ?2, ?3)",
            params![i, format!("UNI EN {}", 1000 + i), format!("Standard {}", i)],
        )?;
    }

    for i in 1..=seed.items as i64 {
        let category = (i - 1) % categories as i64 + 1;
        tx.execute(
            "INSERT OR IGNORE INTO item (id, code, category_id, subcategory_id, standard_id, seq, description)
             VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6)",
            params![
                i,
                format!("U{:05}", i),
                category,
                (i - 1) % standards as i64 + 1,
                i,
                format!("Item {}", i)
            ],
        )?;
    }

    for i in 1..=seed.manual_versions as i64 {
        tx.execute(
            "INSERT OR IGNORE INTO manual_version (id, version, body) VALUES (?1, ?2, ?3)",
            params![i, format!("1.{}", i), "release notes"],
        )?;
    }

    for i in 1..=seed.suppliers as i64 {
        tx.execute(
            "INSERT OR IGNORE INTO supplier (id, name) VALUES (?1, ?2)",
            params![i, format!("Supplier {}", i)],
        )?;
    }

    for i in 1..=seed.comm_items as i64 {
        let category = (i - 1) % categories as i64 + 1;
        tx.execute(
            "INSERT OR IGNORE INTO comm_item (id, code, comm_category_id, comm_subcategory_id, supplier_id, seq, description)
             VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6)",
            params![
                i,
                format!("C{:05}", i),
                category,
                (i - 1) % suppliers as i64 + 1,
                i,
                format!("Commercial item {}", i)
            ],
        )?;
    }

    for i in 1..=seed.materials as i64 {
        tx.execute(
            "INSERT OR IGNORE INTO material (id, code, family, description, density_g_cm3)
             VALUES (?1, ?2, 'STEEL', ?3, 7.85)",
            params![i, format!("S{}", 200 + i), format!("Material {}", i)],
        )?;
        for (offset, name) in ["yield_strength", "hardness"].iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO material_property (id, material_id, name, value)
                 VALUES (?1, ?2, ?3, ?4)",
                params![i * 2 - 1 + offset as i64, i, name, "n/a"],
            )?;
        }
    }

    for i in 1..=seed.semi_items as i64 {
        tx.execute(
            "INSERT OR IGNORE INTO semi_item (id, code, material_id, semi_type, description)
             VALUES (?1, ?2, ?3, 'BAR', ?4)",
            params![
                i,
                format!("SEMI{:04}", i),
                (i - 1) % materials as i64 + 1,
                format!("Bar {}", i)
            ],
        )?;
        for (offset, name) in ["diameter", "length"].iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO semi_item_dimension (id, semi_item_id, name, value, unit)
                 VALUES (?1, ?2, ?3, ?4, 'mm')",
                params![i * 2 - 1 + offset as i64, i, name, 10.0 * i as f64],
            )?;
        }
    }

    tx.commit()
}

/// Store paths under `dir` with a seeded legacy store and bootstrapped area stores
///
/// Fails with the first area's error if any area store could not be bootstrapped.
pub fn prepared_stores(dir: &Path, seed: &LegacySeed) -> PartitionResult<StorePaths> {
    let paths = StorePaths::in_dir(dir);
    seed_legacy_store(&paths.legacy, seed)?;

    let report = bootstrap(&paths, TEST_IO_TIMEOUT);
    if let Some(err) = report.outcomes.into_iter().find_map(|o| o.result.err()) {
        return Err(err);
    }
    Ok(paths)
}

/// Make every insert into `table` of the store at `path` fail
pub fn inject_insert_failure(path: &Path, table: &str) -> rusqlite::Result<()> {
    let conn = Connection::open(path)?;
    conn.execute_batch(&format!(
        "CREATE TRIGGER IF NOT EXISTS fail_insert_{table} BEFORE INSERT ON \"{table}\"
         BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        table = table
    ))
}

/// Row count of `table`, for assertions
pub fn row_count(path: &Path, table: &str) -> rusqlite::Result<i64> {
    let conn = Connection::open(path)?;
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| row.get(0))
}
