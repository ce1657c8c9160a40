//! Fetch results
//!
//! A fetch never fails with an error. It either returns data (fresh, remote,
//! or a stale fallback) or says why it has none.

use crate::sheet::FieldValues;
use crate::transport::TransportError;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Why a fetch produced no fresh data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The plan was empty or the request did not match the configured sheet
    NothingToFetch,
    /// No sheet is configured under the requested key
    UnknownSheet,
    /// Still throttled after the attempt budget ran out
    RateLimited,
    /// Network, server or response-shape failure
    Transport,
    /// Credentials rejected
    Auth,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NothingToFetch => "nothing_to_fetch",
            FailureReason::UnknownSheet => "unknown_sheet",
            FailureReason::RateLimited => "rate_limited",
            FailureReason::Transport => "transport",
            FailureReason::Auth => "auth",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TransportError> for FailureReason {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::RateLimited { .. } => FailureReason::RateLimited,
            TransportError::Transport(_) => FailureReason::Transport,
            TransportError::Auth(_) => FailureReason::Auth,
        }
    }
}

/// Where returned values came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// A fresh cache entry; no remote call was made
    Cache,
    /// Just read from the remote
    Remote,
    /// A stale cache entry served because the remote read failed
    Fallback,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Values returned by a fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedData {
    pub values: FieldValues,
    /// True when the values are a fallback, not a fresh read
    pub stale: bool,
    #[serde(rename = "age_secs", serialize_with = "serialize_secs")]
    pub age: Duration,
    pub cached_at: DateTime<Utc>,
    pub source: ValueSource,
    /// Why the remote read failed, for fallbacks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FailureReason>,
}

/// Result of one fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Fetched(FetchedData),
    NoData { reason: FailureReason },
}

impl FetchOutcome {
    pub fn no_data(reason: FailureReason) -> Self {
        FetchOutcome::NoData { reason }
    }

    pub fn data(&self) -> Option<&FetchedData> {
        match self {
            FetchOutcome::Fetched(data) => Some(data),
            FetchOutcome::NoData { .. } => None,
        }
    }

    pub fn values(&self) -> Option<&FieldValues> {
        self.data().map(|d| &d.values)
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }

    pub fn is_stale(&self) -> bool {
        self.data().is_some_and(|d| d.stale)
    }

    /// The failure behind this outcome: the no-data reason, or the reason a
    /// fallback was served
    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            FetchOutcome::Fetched(data) => data.fallback_reason,
            FetchOutcome::NoData { reason } => Some(*reason),
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Fetched(data) => match data.source {
                ValueSource::Cache => "cache",
                ValueSource::Remote => "remote",
                ValueSource::Fallback => "fallback",
            },
            FetchOutcome::NoData { .. } => "no_data",
        }
    }
}
