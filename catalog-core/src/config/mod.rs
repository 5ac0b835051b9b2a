//! Catalog configuration
//!
//! Store locations, lock timing and logging, loaded from TOML and overridable from
//! `CATALOG_<SECTION>_<KEY>` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::logging::LogLevel;
use crate::store::{default_file_name, Area, KnownStore, StorePaths};
use crate::writer_lock::{HeartbeatSettings, MAIN_LOCK_KEY};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store file locations
    pub stores: StoreConfig,

    /// Writer lock timing
    pub lock: LockConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Store file locations
///
/// Any path left unset resolves to its default file name inside `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub legacy: Option<PathBuf>,
    pub normati: Option<PathBuf>,
    pub commerciali: Option<PathBuf>,
    pub materiali: Option<PathBuf>,
}

/// Writer lock timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lease window: a lock whose heartbeat is older than this may be taken over
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Period of the session heartbeat
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// Bound on every lock I/O: busy timeout, pool checkout, heartbeat deadline
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,

    pub lock_key: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db"),
            legacy: None,
            normati: None,
            commerciali: None,
            materiali: None,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            heartbeat_interval: Duration::from_secs(15),
            io_timeout: Duration::from_secs(3),
            lock_key: MAIN_LOCK_KEY.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl StoreConfig {
    fn configured(&self, store: KnownStore) -> Option<&PathBuf> {
        match store {
            KnownStore::Legacy => self.legacy.as_ref(),
            KnownStore::Area(Area::Normati) => self.normati.as_ref(),
            KnownStore::Area(Area::Commerciali) => self.commerciali.as_ref(),
            KnownStore::Area(Area::Materiali) => self.materiali.as_ref(),
        }
    }

    /// Path of one store, explicit or defaulted under `data_dir`
    pub fn path(&self, store: KnownStore) -> PathBuf {
        self.configured(store)
            .cloned()
            .unwrap_or_else(|| self.data_dir.join(default_file_name(store)))
    }

    /// Resolved paths of all four stores
    pub fn paths(&self) -> StorePaths {
        StorePaths {
            legacy: self.path(KnownStore::Legacy),
            normati: self.path(KnownStore::Area(Area::Normati)),
            commerciali: self.path(KnownStore::Area(Area::Commerciali)),
            materiali: self.path(KnownStore::Area(Area::Materiali)),
        }
    }
}

impl LockConfig {
    /// Heartbeat timing as used by sessions (interval clamped to the minimum)
    pub fn heartbeat_settings(&self) -> HeartbeatSettings {
        HeartbeatSettings::new(self.heartbeat_interval, self.io_timeout)
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

fn parse_env_duration(key: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(raw) => humantime_serde::re::humantime::parse_duration(raw.trim())
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: CATALOG_<SECTION>_<KEY>
    /// Example: CATALOG_LOCK_TIMEOUT=2m
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables on an already loaded configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Store config
        if let Some(dir) = parse_env::<PathBuf>("CATALOG_STORES_DATA_DIR")? {
            self.stores.data_dir = dir;
        }
        if let Some(path) = parse_env::<PathBuf>("CATALOG_STORES_LEGACY")? {
            self.stores.legacy = Some(path);
        }
        if let Some(path) = parse_env::<PathBuf>("CATALOG_STORES_NORMATI")? {
            self.stores.normati = Some(path);
        }
        if let Some(path) = parse_env::<PathBuf>("CATALOG_STORES_COMMERCIALI")? {
            self.stores.commerciali = Some(path);
        }
        if let Some(path) = parse_env::<PathBuf>("CATALOG_STORES_MATERIALI")? {
            self.stores.materiali = Some(path);
        }

        // Lock config
        if let Some(timeout) = parse_env_duration("CATALOG_LOCK_TIMEOUT")? {
            self.lock.timeout = timeout;
        }
        if let Some(interval) = parse_env_duration("CATALOG_LOCK_HEARTBEAT_INTERVAL")? {
            self.lock.heartbeat_interval = interval;
        }
        if let Some(io_timeout) = parse_env_duration("CATALOG_LOCK_IO_TIMEOUT")? {
            self.lock.io_timeout = io_timeout;
        }
        if let Some(key) = parse_env::<String>("CATALOG_LOCK_KEY")? {
            self.lock.lock_key = key;
        }

        // Logging config
        if let Some(level) = parse_env::<String>("CATALOG_LOG_LEVEL")? {
            self.logging.level = level;
        }
        if let Some(json) = parse_env::<bool>("CATALOG_LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lock = &self.lock;

        if lock.lock_key.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "lock_key must not be empty".to_string(),
            ));
        }

        if lock.io_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "io_timeout must be greater than 0".to_string(),
            ));
        }

        // Sessions beat at the clamped interval, not the configured one
        let interval = lock.heartbeat_settings().interval;

        if lock.timeout <= interval {
            return Err(ConfigError::ValidationFailed(format!(
                "lock timeout ({:?}) must be longer than the effective heartbeat interval ({:?})",
                lock.timeout, interval
            )));
        }

        if lock.io_timeout >= interval {
            return Err(ConfigError::ValidationFailed(format!(
                "io_timeout ({:?}) must be shorter than the effective heartbeat interval ({:?})",
                lock.io_timeout, interval
            )));
        }

        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock.timeout, Duration::from_secs(90));
        assert_eq!(config.lock.lock_key, "MAIN");
    }

    #[test]
    fn test_lock_timing_validation() {
        let mut config = Config::default();
        config.lock.timeout = Duration::from_secs(10);
        assert!(config.validate().is_err());

        config = Config::default();
        config.lock.io_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config = Config::default();
        config.lock.io_timeout = Duration::from_secs(20);
        assert!(config.validate().is_err());

        config = Config::default();
        config.lock.lock_key = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "WARNING".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_paths_resolution() {
        let mut stores = StoreConfig {
            data_dir: PathBuf::from("/srv/catalog"),
            ..StoreConfig::default()
        };
        stores.materiali = Some(PathBuf::from("/mnt/share/materiali.db"));

        let paths = stores.paths();
        assert_eq!(paths.legacy, PathBuf::from("/srv/catalog/unificati_manager.db"));
        assert_eq!(paths.normati, PathBuf::from("/srv/catalog/unificati_normati.db"));
        assert_eq!(paths.materiali, PathBuf::from("/mnt/share/materiali.db"));
    }

    #[test]
    fn test_heartbeat_settings_clamp() {
        let mut lock = LockConfig::default();
        lock.heartbeat_interval = Duration::from_secs(2);
        assert_eq!(lock.heartbeat_settings().interval, Duration::from_secs(5));
    }

    #[test]
    fn test_timing_checked_against_clamped_interval() {
        let mut config = Config::default();
        config.lock.timeout = Duration::from_secs(4);
        config.lock.heartbeat_interval = Duration::from_secs(3);
        config.lock.io_timeout = Duration::from_secs(1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));

        config.lock.timeout = Duration::from_secs(6);
        assert!(config.validate().is_ok());

        // Below the raw interval but not below the clamped one
        config.lock.io_timeout = Duration::from_secs(4);
        assert!(config.validate().is_ok());
        config.lock.io_timeout = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_duration_parsing() {
        env::set_var("CATALOG_TEST_DURATION_OK", " 1m 30s ");
        env::set_var("CATALOG_TEST_DURATION_BAD", "ninety");

        assert_eq!(
            parse_env_duration("CATALOG_TEST_DURATION_OK").unwrap(),
            Some(Duration::from_secs(90))
        );
        assert!(matches!(
            parse_env_duration("CATALOG_TEST_DURATION_BAD"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(parse_env_duration("CATALOG_TEST_DURATION_UNSET").unwrap(), None);

        env::remove_var("CATALOG_TEST_DURATION_OK");
        env::remove_var("CATALOG_TEST_DURATION_BAD");
    }

    #[test]
    fn test_file_round_trip_with_humantime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.toml");

        std::fs::write(
            &path,
            r#"
[stores]
data_dir = "/data"

[lock]
timeout = "2m"
heartbeat_interval = "20s"
io_timeout = "2s"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.lock.timeout, Duration::from_secs(120));
        assert_eq!(config.lock.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(config.lock.lock_key, "MAIN");
        assert_eq!(config.logging, LoggingConfig::default());

        config.save_to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_error() {
        let err = Config::from_file("/nonexistent/catalog.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
