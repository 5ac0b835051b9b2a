//! Resolved locations of the four store files

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::area::{Area, KnownStore};

/// Paths of the legacy unified store and the three area stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorePaths {
    pub legacy: PathBuf,
    pub normati: PathBuf,
    pub commerciali: PathBuf,
    pub materiali: PathBuf,
}

impl StorePaths {
    /// Default file names laid out under one directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            legacy: dir.join(default_file_name(KnownStore::Legacy)),
            normati: dir.join(default_file_name(KnownStore::Area(Area::Normati))),
            commerciali: dir.join(default_file_name(KnownStore::Area(Area::Commerciali))),
            materiali: dir.join(default_file_name(KnownStore::Area(Area::Materiali))),
        }
    }

    pub fn area(&self, area: Area) -> &Path {
        match area {
            Area::Normati => &self.normati,
            Area::Commerciali => &self.commerciali,
            Area::Materiali => &self.materiali,
        }
    }

    pub fn known(&self, store: KnownStore) -> &Path {
        match store {
            KnownStore::Legacy => &self.legacy,
            KnownStore::Area(area) => self.area(area),
        }
    }

    /// Every known store with its path, legacy first
    pub fn known_stores(&self) -> Vec<(KnownStore, PathBuf)> {
        KnownStore::ALL
            .iter()
            .map(|store| (*store, self.known(*store).to_path_buf()))
            .collect()
    }

    /// Make every path absolute against the current directory
    pub fn absolute(&self) -> std::io::Result<Self> {
        Ok(Self {
            legacy: std::path::absolute(&self.legacy)?,
            normati: std::path::absolute(&self.normati)?,
            commerciali: std::path::absolute(&self.commerciali)?,
            materiali: std::path::absolute(&self.materiali)?,
        })
    }
}

/// File name used when a store path is not configured explicitly
pub fn default_file_name(store: KnownStore) -> &'static str {
    match store {
        KnownStore::Legacy => "unificati_manager.db",
        KnownStore::Area(Area::Normati) => "unificati_normati.db",
        KnownStore::Area(Area::Commerciali) => "unificati_commerciali.db",
        KnownStore::Area(Area::Materiali) => "unificati_materiali.db",
    }
}
