//! Cache layer for fetched sheet data
//!
//! A TTL cache (`CacheStore`) over a pluggable byte store (`CacheBackend`).
//! SQLite persists entries across restarts; the memory backend serves tests.

mod backend;
mod memory;
mod sqlite;
mod store;

pub use backend::{BackendError, BackendResult, CacheBackend};
pub use memory::MemoryBackend;
pub use sqlite::{SqliteBackend, SqliteConfig};
pub use store::{
    CacheEntry, CacheStats, CacheStore, CachedValue, ClearScope, DEFAULT_RETENTION, DEFAULT_TTL,
};
