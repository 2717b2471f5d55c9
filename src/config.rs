//! Library configuration.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Paths and toggles the engine needs before it can open its database.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// SQLite database file path.
    pub database_path: PathBuf,

    /// Companion directory for owned thumbnails, subscription caches and
    /// playlist backups. Created on initialize.
    pub workspace_dir: PathBuf,

    /// Whether directories holding a `.nomedia` marker are still discovered.
    pub discover_no_media: bool,

    /// Whether network filesystem factories are started.
    pub network_discovery: bool,

    /// Global quota for cached subscription media, in bytes.
    pub cache_quota: u64,
}

impl LibraryConfig {
    pub fn new(database_path: impl Into<PathBuf>, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            workspace_dir: workspace_dir.into(),
            discover_no_media: false,
            network_discovery: false,
            cache_quota: 2 * 1024 * 1024 * 1024,
        }
    }

    /// Load configuration from environment variables, falling back to a
    /// `curator` directory next to the database.
    pub fn from_env() -> Result<Self> {
        let database_path = env::var("CURATOR_DB_PATH")
            .map(PathBuf::from)
            .context("CURATOR_DB_PATH is required")?;
        let workspace_dir = env::var("CURATOR_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                database_path
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join("curator")
            });
        let mut config = Self::new(database_path, workspace_dir);
        if let Ok(v) = env::var("CURATOR_NETWORK_DISCOVERY") {
            config.network_discovery = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("CURATOR_CACHE_QUOTA") {
            config.cache_quota = v.parse().context("CURATOR_CACHE_QUOTA must be bytes")?;
        }
        Ok(config)
    }

    /// Directory where library-owned thumbnails live. The library is the
    /// sole writer.
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.workspace_dir.join("thumbnails")
    }

    /// Directory for cached subscription content.
    pub fn cache_dir(&self) -> PathBuf {
        self.workspace_dir.join("cache")
    }

    /// Directory for playlist backup files.
    pub fn playlist_backup_dir(&self) -> PathBuf {
        self.workspace_dir.join("playlist_backups")
    }
}
