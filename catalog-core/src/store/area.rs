//! Area, scope and store identities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::StoreError;

/// One of the three independently lockable catalog areas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Area {
    /// Standard parts: categories, standards, items, and the manual
    Normati,
    /// Commercial parts and suppliers
    Commerciali,
    /// Materials and semi-finished items
    Materiali,
}

impl Area {
    /// All areas in fixed order (also the multi-lock acquisition order)
    pub const ALL: [Area; 3] = [Area::Normati, Area::Commerciali, Area::Materiali];

    /// Code used in config, lock commands, and logs
    pub fn code(&self) -> &'static str {
        match self {
            Area::Normati => "NORMATI",
            Area::Commerciali => "COMMERCIALI",
            Area::Materiali => "MATERIALI",
        }
    }

    /// Human-readable label shown to operators
    pub fn label(&self) -> &'static str {
        match self {
            Area::Normati => "COMMERCIALI NORMATI",
            Area::Commerciali => "COMMERCIALI",
            Area::Materiali => "MATERIALI - SEMILAVORATI",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Area {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMATI" => Ok(Area::Normati),
            "COMMERCIALI" => Ok(Area::Commerciali),
            "MATERIALI" => Ok(Area::Materiali),
            other => Err(StoreError::UnknownArea(other.to_string())),
        }
    }
}

/// Write scope granted to an editor session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditorScope {
    /// No area restriction (unified mode)
    Main,
    /// Writes allowed on a single area only
    Area(Area),
}

impl EditorScope {
    pub fn code(&self) -> &'static str {
        match self {
            EditorScope::Main => "MAIN",
            EditorScope::Area(area) => area.code(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EditorScope::Main => "TUTTE LE AREE",
            EditorScope::Area(area) => area.label(),
        }
    }

    /// Whether a write classified under `area` is inside this scope
    pub fn permits(&self, area: Area) -> bool {
        match self {
            EditorScope::Main => true,
            EditorScope::Area(granted) => *granted == area,
        }
    }

    /// Areas whose stores this scope opens read-write
    pub fn writable_areas(&self) -> Vec<Area> {
        match self {
            EditorScope::Main => Area::ALL.to_vec(),
            EditorScope::Area(area) => vec![*area],
        }
    }
}

impl fmt::Display for EditorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<Area> for EditorScope {
    fn from(area: Area) -> Self {
        EditorScope::Area(area)
    }
}

impl FromStr for EditorScope {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.eq_ignore_ascii_case("MAIN") {
            return Ok(EditorScope::Main);
        }
        raw.parse::<Area>()
            .map(EditorScope::Area)
            .map_err(|_| StoreError::UnknownScope(raw.to_string()))
    }
}

/// Every store file the tooling knows about: the unified legacy store plus the area stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownStore {
    Legacy,
    Area(Area),
}

impl KnownStore {
    pub const ALL: [KnownStore; 4] = [
        KnownStore::Legacy,
        KnownStore::Area(Area::Normati),
        KnownStore::Area(Area::Commerciali),
        KnownStore::Area(Area::Materiali),
    ];

    pub fn code(&self) -> &'static str {
        match self {
            KnownStore::Legacy => "LEGACY",
            KnownStore::Area(area) => area.code(),
        }
    }
}

impl fmt::Display for KnownStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for KnownStore {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.eq_ignore_ascii_case("LEGACY") {
            return Ok(KnownStore::Legacy);
        }
        raw.parse::<Area>().map(KnownStore::Area)
    }
}
