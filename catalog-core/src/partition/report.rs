//! Per-store results of bootstrap and resync runs

use serde::Serialize;
use std::path::PathBuf;

use super::error::PartitionError;
use crate::store::Area;

/// Rows copied into one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: usize,
}

/// Copy summary for one destination store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub copied: Vec<TableCount>,
    /// Tables absent from the legacy store; left untouched in the destination
    pub skipped_tables: Vec<&'static str>,
}

impl TableCounts {
    pub fn rows(&self, table: &str) -> Option<usize> {
        self.copied.iter().find(|c| c.table == table).map(|c| c.rows)
    }

    pub fn total(&self) -> usize {
        self.copied.iter().map(|c| c.rows).sum()
    }
}

/// What `bootstrap` did to one area store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapAction {
    /// Every area table exists and at least one holds rows
    AlreadyPopulated,
    /// Schema created and rows copied from the legacy store
    Populated(TableCounts),
    /// Schema created; there was no legacy store to copy from
    SchemaOnly,
}

#[derive(Debug)]
pub struct BootstrapOutcome {
    pub area: Area,
    pub path: PathBuf,
    pub result: Result<BootstrapAction, PartitionError>,
}

#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub outcomes: Vec<BootstrapOutcome>,
}

impl BootstrapReport {
    pub fn failed(&self) -> impl Iterator<Item = &BootstrapOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn action(&self, area: Area) -> Option<&BootstrapAction> {
        self.outcomes
            .iter()
            .find(|o| o.area == area)
            .and_then(|o| o.result.as_ref().ok())
    }
}

/// Resync result for one destination store
#[derive(Debug)]
pub struct StoreOutcome {
    pub area: Area,
    pub path: PathBuf,
    pub result: Result<TableCounts, PartitionError>,
}

#[derive(Debug, Default)]
pub struct ResyncReport {
    pub outcomes: Vec<StoreOutcome>,
}

impl ResyncReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &StoreOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &StoreOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn outcome(&self, area: Area) -> Option<&StoreOutcome> {
        self.outcomes.iter().find(|o| o.area == area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_counts_lookup() {
        let counts = TableCounts {
            copied: vec![
                TableCount { table: "material", rows: 3 },
                TableCount { table: "semi_item", rows: 2 },
            ],
            skipped_tables: vec!["semi_item_dimension"],
        };
        assert_eq!(counts.rows("material"), Some(3));
        assert_eq!(counts.rows("semi_item_dimension"), None);
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn test_resync_report_partitions_outcomes() {
        let report = ResyncReport {
            outcomes: vec![
                StoreOutcome {
                    area: Area::Normati,
                    path: PathBuf::from("n.db"),
                    result: Ok(TableCounts::default()),
                },
                StoreOutcome {
                    area: Area::Materiali,
                    path: PathBuf::from("m.db"),
                    result: Err(PartitionError::LegacyMissing(PathBuf::from("x.db"))),
                },
            ],
        };
        assert_eq!(report.succeeded().count(), 1);
        assert_eq!(report.failed().next().map(|o| o.area), Some(Area::Materiali));
    }
}
