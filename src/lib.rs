//! sheetcache - cached, rate-limited reads of dashboard data from Google Sheets
//!
//! A fetch layer between a sales dashboard and the Sheets API. The API allows
//! 60 reads per minute per project, so every fetch goes through a TTL cache
//! first, batches all of a sheet's cell ranges into one request, waits on a
//! process-wide rate limiter, and falls back to stale cached data when the
//! remote is throttled or unreachable.
//!
//! # Architecture
//!
//! - **sheet**: Data model (LogicalSheet, Category, RangeRequest, CacheKey, FieldValue)
//! - **cache**: TTL cache over SQLite or in-memory backing stores
//! - **ratelimit**: Request spacing, exponential backoff, retry budget
//! - **planner**: One batched read per sheet per fetch
//! - **transport**: Sheets v4 `values:batchGet` client
//! - **fetcher**: Orchestration and stale fallback
//! - **scheduler**: Timed refreshes and retention sweeps
//! - **config**: YAML configuration and validation

// Core modules
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod sheet;

// Components
pub mod cache;
pub mod fetcher;
pub mod planner;
pub mod ratelimit;
pub mod scheduler;
pub mod transport;

// Re-exports
pub use error::{Result, SheetCacheError};
pub use fetcher::{FailureReason, FetchOutcome, Fetcher, FetcherConfig};
