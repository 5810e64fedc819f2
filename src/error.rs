//! Error types for handymemo.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tree error: {0}")]
    Tree(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("invalid year/month: {year}-{month}")]
    InvalidYearMonth { year: i32, month: u32 },

    #[error("root tree location is not configured")]
    RootNotConfigured,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("thumbnail error: {0}")]
    Thumbnail(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
