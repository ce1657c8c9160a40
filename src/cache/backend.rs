//! Cache backing store abstraction
//!
//! Defines the trait for pluggable byte-level key-value persistence. Freshness
//! policy lives in `CacheStore`; backends only move bytes.

use thiserror::Error;

/// Backing store errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Trait for cache backing stores
pub trait CacheBackend: Send + Sync {
    /// Read the bytes stored under `key`
    fn read(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any previous value
    fn write(&self, key: &str, bytes: &[u8]) -> BackendResult<()>;

    /// List every stored key
    fn list_keys(&self) -> BackendResult<Vec<String>>;

    /// Delete `key`; deleting a missing key is not an error
    fn delete(&self, key: &str) -> BackendResult<()>;
}
