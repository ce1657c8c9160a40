//! Rate limiting and retry policy for Sheets API calls
//!
//! The Sheets API allows 60 read requests per minute per project. The limiter
//! spaces calls at least `min_interval` apart and backs off exponentially when
//! the API pushes back; the retry policy bounds how many attempts one logical
//! fetch may spend.

mod limiter;
pub mod retry;

pub use limiter::{
    Permit, RateLimiter, RateLimiterConfig, DEFAULT_MAX_MULTIPLIER, DEFAULT_MIN_INTERVAL,
};
pub use retry::{RetryDecision, RetryPolicy, RetryableError};
