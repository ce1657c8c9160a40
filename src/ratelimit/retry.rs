//! Retry classification for transport errors
//!
//! Only throttling is worth retrying: the Sheets quota refills, a broken
//! network path or a revoked credential does not.

use std::time::Duration;

/// Retry classification for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation
    Retry,
    /// Retry after a specific duration (e.g., from Retry-After header)
    RetryAfter(Duration),
    /// Don't retry, the error is permanent
    NoRetry,
}

/// Trait for errors that can indicate whether to retry
pub trait RetryableError {
    /// Determine if this error should be retried
    fn retry_decision(&self) -> RetryDecision;
}

/// Per-fetch attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transport attempts allowed for one logical fetch
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Whether another attempt may follow `attempts_made` attempts that ended in `decision`
    pub fn allows_retry(&self, attempts_made: u32, decision: RetryDecision) -> bool {
        match decision {
            RetryDecision::NoRetry => false,
            RetryDecision::Retry | RetryDecision::RetryAfter(_) => {
                attempts_made < self.max_attempts
            }
        }
    }
}
