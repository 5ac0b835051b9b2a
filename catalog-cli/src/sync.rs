//! `sync`: bootstrap or resync of the area stores

use anyhow::{Context, Result};
use catalog_core::config::Config;
use catalog_core::partition::{bootstrap, resync, table_counts, BootstrapAction};
use catalog_core::store::{area_tables, Area, StorePaths};
use std::path::PathBuf;
use tracing::warn;

/// Paths given on the command line, taking precedence over the configuration
#[derive(Debug, Default)]
pub struct PathOverrides {
    pub legacy: Option<PathBuf>,
    pub normati: Option<PathBuf>,
    pub commerciali: Option<PathBuf>,
    pub materiali: Option<PathBuf>,
}

impl PathOverrides {
    fn apply(self, mut paths: StorePaths) -> StorePaths {
        if let Some(p) = self.legacy {
            paths.legacy = p;
        }
        if let Some(p) = self.normati {
            paths.normati = p;
        }
        if let Some(p) = self.commerciali {
            paths.commerciali = p;
        }
        if let Some(p) = self.materiali {
            paths.materiali = p;
        }
        paths
    }
}

pub fn run(
    config: &Config,
    overrides: PathOverrides,
    dry_run: bool,
    bootstrap_only: bool,
) -> Result<()> {
    let paths = overrides
        .apply(config.stores.paths())
        .absolute()
        .context("cannot resolve store paths")?;

    println!("legacy:      {}", paths.legacy.display());
    println!("normati:     {}", paths.normati.display());
    println!("commerciali: {}", paths.commerciali.display());
    println!("materiali:   {}", paths.materiali.display());

    if dry_run {
        println!("Dry run, nothing copied.");
        return Ok(());
    }

    let io_timeout = config.lock.io_timeout;

    if bootstrap_only {
        let report = bootstrap(&paths, io_timeout);
        for outcome in &report.outcomes {
            match &outcome.result {
                Ok(BootstrapAction::AlreadyPopulated) => {
                    println!("{}: already populated", outcome.area)
                }
                Ok(BootstrapAction::SchemaOnly) => {
                    println!("{}: schema created, no legacy store", outcome.area)
                }
                Ok(BootstrapAction::Populated(_)) => {
                    println!("{}: populated", outcome.area);
                    print_counts(&paths, outcome.area);
                }
                Err(e) => println!("{}: FAILED ({})", outcome.area, e),
            }
        }
        return Ok(());
    }

    let report = resync(&paths, io_timeout)?;
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(counts) => {
                println!("{}: synced", outcome.area);
                print_counts(&paths, outcome.area);
                for table in &counts.skipped_tables {
                    println!("  {:<24} not in legacy store, left unchanged", table);
                }
            }
            Err(e) => println!("{}: FAILED, rolled back ({})", outcome.area, e),
        }
    }

    let failed = report.failed().count();
    if failed > 0 {
        warn!(failed, "resync finished with failed stores");
    }
    Ok(())
}

fn print_counts(paths: &StorePaths, area: Area) {
    let tables: Vec<&str> = area_tables(area).iter().map(|t| t.name).collect();
    for (table, rows) in table_counts(paths.area(area), &tables) {
        if let Some(rows) = rows {
            println!("  {:<24} {}", table, rows);
        }
    }
}
