//! Market-Refresh: an incremental update crawler for app markets
//!
//! This crate walks the package identifiers already known to a catalog store,
//! probes each one against a market's download endpoint, and records the
//! redirect target (package name, version code, binary URL) as an append-only
//! download status history.

pub mod config;
pub mod crawler;
pub mod proxy;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Market-Refresh operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Malformed redirect target: {0}")]
    MalformedTarget(String),
}

/// Result type alias for Market-Refresh operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, ProbeError, ResolvedItem, RunSummary};
pub use proxy::{ProxyCache, ProxyEndpoint};
pub use storage::{DownloadFlag, DownloadStatusRecord, SqliteStorage, StatusLookup, Storage};
