//! Error types for sheetcache
//!
//! Setup-time failures (configuration, opening the SQLite store, building the
//! HTTP client) surface as `SheetCacheError`. The fetch path itself never
//! returns this type: transport and cache failures end in a `FetchOutcome`.

use thiserror::Error;

/// Result type alias for sheetcache operations
pub type Result<T> = std::result::Result<T, SheetCacheError>;

/// Error type for sheetcache setup and administration
#[derive(Error, Debug)]
pub enum SheetCacheError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown logical sheet key
    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    /// Unknown category name
    #[error("Unknown category '{0}' (expected vip, membership, funnel or velocity)")]
    UnknownCategory(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
