//! Typed configuration from environment variables.
//!
//! Loads once at startup. Every value has a default so a bare `handymemo`
//! invocation works; malformed numbers fail fast.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the cache database, settings files and thumbnails
    pub data_dir: PathBuf,
    /// SQLite file for the memo cache (`:memory:` is accepted)
    pub db_path: String,
    pub thumbnail_dir: PathBuf,
    /// Delay before the one-shot pass registered at startup
    pub startup_delay: Duration,
    /// Interval of the periodic pass
    pub index_interval: Duration,
    pub page_size: usize,
    pub search_debounce: Duration,
    pub retry_backoff: Duration,
    pub retry_backoff_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_data_dir(PathBuf::from(".handymemo"))
    }
}

impl Config {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("handymemo.sqlite3").to_string_lossy().to_string(),
            thumbnail_dir: data_dir.join("thumbnails"),
            data_dir,
            startup_delay: Duration::from_secs(5),
            index_interval: Duration::from_secs(15 * 60),
            page_size: 20,
            search_debounce: Duration::from_millis(300),
            retry_backoff: Duration::from_secs(30),
            retry_backoff_max: Duration::from_secs(5 * 60 * 60),
        }
    }

    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("HANDYMEMO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".handymemo"));
        let mut config = Self::with_data_dir(data_dir);

        if let Ok(db_path) = std::env::var("HANDYMEMO_DB_PATH") {
            config.db_path = db_path;
        }
        if let Ok(dir) = std::env::var("HANDYMEMO_THUMBNAIL_DIR") {
            config.thumbnail_dir = PathBuf::from(dir);
        }
        if let Some(secs) = numeric_var("HANDYMEMO_STARTUP_DELAY_SECS")? {
            config.startup_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = numeric_var("HANDYMEMO_INDEX_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(Error::Config(
                    "HANDYMEMO_INDEX_INTERVAL_SECS must be greater than zero".to_string(),
                ));
            }
            config.index_interval = Duration::from_secs(secs);
        }
        if let Some(size) = numeric_var("HANDYMEMO_PAGE_SIZE")? {
            config.page_size = size.max(1) as usize;
        }
        if let Some(ms) = numeric_var("HANDYMEMO_SEARCH_DEBOUNCE_MS")? {
            config.search_debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = numeric_var("HANDYMEMO_RETRY_BACKOFF_SECS")? {
            config.retry_backoff = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = numeric_var("HANDYMEMO_RETRY_BACKOFF_MAX_SECS")? {
            config.retry_backoff_max = Duration::from_secs(secs).max(config.retry_backoff);
        }

        Ok(config)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn widget_settings_path(&self) -> PathBuf {
        self.data_dir.join("widget_settings.json")
    }
}

fn numeric_var(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}
