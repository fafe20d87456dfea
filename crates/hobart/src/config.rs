//! Configuration for the store location and for installs.

use crate::error::{Error, Result};
use hobart_data::{DateRange, SqliteStore};
use hobart_features::IndustryLevel;
use std::path::{Path, PathBuf};

/// Environment variable overriding the database path.
pub const DATABASE_PATH_ENV: &str = "HOBART_DATABASE_PATH";

/// Get the default data directory.
///
/// Uses platform-specific data directories:
/// - Linux: `~/.local/share/hobart/`
/// - macOS: `~/Library/Application Support/hobart/`
/// - Windows: `%APPDATA%\hobart\`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hobart")
}

/// Get the default database path.
pub fn default_database_path() -> PathBuf {
    default_data_dir().join("hobart.db")
}

/// Location of the SQLite database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file
    pub path: PathBuf,
}

impl StoreConfig {
    /// Use the database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The database named by `HOBART_DATABASE_PATH`, or the default one.
    pub fn from_env() -> Self {
        std::env::var_os(DATABASE_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map_or_else(Self::default, Self::new)
    }

    /// Open the store, creating the directory if needed.
    pub fn open(&self) -> Result<SqliteStore> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(hobart_data::DataError::from)?;
        }

        Ok(SqliteStore::new(&self.path)?)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(default_database_path())
    }
}

/// How an install runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallConfig {
    /// Worker threads, each with its own connection
    pub workers: usize,
    /// Industry granularity used for normalization
    pub level: IndustryLevel,
    /// Minimum rows of every concept or feature an entity needs to be installed
    pub min_rows: usize,
    /// Drop and recreate the target table before installing
    pub recreate_tables: bool,
    /// Filing dates to install
    pub range: DateRange,
}

impl InstallConfig {
    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.min_rows == 0 {
            return Err(Error::Config("min_rows must be at least 1".to_string()));
        }
        if let (Some(start), Some(end)) = (self.range.start, self.range.end)
            && start > end
        {
            return Err(Error::Config(format!(
                "range starts after it ends ({} > {})",
                start, end
            )));
        }
        Ok(())
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            level: IndustryLevel::MajorGroup,
            min_rows: 1,
            recreate_tables: false,
            range: DateRange::all(),
        }
    }
}
