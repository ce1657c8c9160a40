//! Remote transport for batched range reads
//!
//! The fetcher only knows the `SheetTransport` trait. `GoogleSheetsTransport`
//! talks to the Sheets v4 REST API; tests script their own implementations.

mod http;

pub use http::{
    classify_status, qualify_range, Credentials, GoogleSheetsTransport, ACCESS_TOKEN_ENV,
    API_KEY_ENV, DEFAULT_BASE_URL,
};

use crate::ratelimit::{RetryDecision, RetryableError};
use crate::sheet::RawBlock;
use async_trait::async_trait;
use std::time::Duration;

/// Transport failure kinds
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The remote asked us to slow down
    #[error("Rate limited by remote{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Network failure, server error or malformed response
    #[error("Transport error: {0}")]
    Transport(String),

    /// Credentials rejected
    #[error("Authentication failed: {0}")]
    Auth(String),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl TransportError {
    pub fn rate_limited() -> Self {
        TransportError::RateLimited { retry_after: None }
    }

    /// Metric label for this failure
    pub fn outcome_label(&self) -> &'static str {
        match self {
            TransportError::RateLimited { .. } => "rate_limited",
            TransportError::Transport(_) => "transport",
            TransportError::Auth(_) => "auth",
        }
    }
}

impl RetryableError for TransportError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            TransportError::RateLimited {
                retry_after: Some(d),
            } => RetryDecision::RetryAfter(*d),
            TransportError::RateLimited { retry_after: None } => RetryDecision::Retry,
            TransportError::Transport(_) | TransportError::Auth(_) => RetryDecision::NoRetry,
        }
    }
}

/// One batched read of many ranges from one spreadsheet
#[async_trait]
pub trait SheetTransport: Send + Sync {
    /// Read `ranges` from `spreadsheet_id`, optionally scoped to `worksheet`.
    ///
    /// On success returns exactly one block per requested range, in request
    /// order.
    async fn batch_read(
        &self,
        spreadsheet_id: &str,
        worksheet: Option<&str>,
        ranges: &[String],
    ) -> Result<Vec<RawBlock>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_decisions() {
        assert_eq!(
            TransportError::rate_limited().retry_decision(),
            RetryDecision::Retry
        );
        assert_eq!(
            TransportError::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
            .retry_decision(),
            RetryDecision::RetryAfter(Duration::from_secs(30))
        );
        assert_eq!(
            TransportError::Transport("reset".into()).retry_decision(),
            RetryDecision::NoRetry
        );
        assert_eq!(
            TransportError::Auth("expired".into()).retry_decision(),
            RetryDecision::NoRetry
        );
    }

    #[test]
    fn test_display() {
        let err = TransportError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.to_string(), "Rate limited by remote (retry after 7s)");
        assert_eq!(TransportError::rate_limited().to_string(), "Rate limited by remote");
    }
}
