// src/config.rs

//! Runtime settings
//!
//! There is no config file: the command line fills a [`Config`] and the
//! library receives it explicitly wherever a setting matters.

use std::path::PathBuf;
use std::time::Duration;

/// Default location of the local package database
pub const DEFAULT_DB_PATH: &str = "/var/db/pkgcore/local.sqlite";

/// Default directory remote archives are downloaded into
pub const DEFAULT_CACHE_DIR: &str = "/var/cache/pkgcore";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    /// Stricter checks and louder diagnostics for package authors
    pub developer_mode: bool,
    pub http_timeout: Duration,
    pub fetch_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            developer_mode: false,
            http_timeout: Duration::from_secs(30),
            fetch_retries: 3,
        }
    }
}

impl Config {
    pub fn with_developer_mode(mut self, enabled: bool) -> Self {
        self.developer_mode = enabled;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }
}
