//! Fetch orchestration
//!
//! Ties the cache, the batch planner, the shared rate limiter and the
//! transport together. Per fetch:
//!
//! 1. **CheckCache** - a fresh entry is returned without touching the remote
//! 2. **Plan** - one batched read for all of the sheet's ranges
//! 3. **Throttle** - wait for the process-wide limiter
//! 4. **Transport** - on success decode, record, write back and return;
//!    throttling retries while the attempt budget lasts
//! 5. **Fallback** - serve the stale entry if one exists, else report why not
//!
//! Nothing on this path returns an error. Cache I/O never waits on the limiter.

mod outcome;

pub use outcome::{FailureReason, FetchOutcome, FetchedData, ValueSource};

use crate::cache::{CacheStats, CacheStore, ClearScope, DEFAULT_RETENTION};
use crate::config::SheetCacheConfig;
use crate::metrics;
use crate::planner::BatchPlanner;
use crate::ratelimit::{RateLimiter, RetryDecision, RetryPolicy, RetryableError};
use crate::sheet::{default_category_ranges, CacheKey, Category, FieldValues, LogicalSheet};
use crate::transport::SheetTransport;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Range read by `check_connection`
const PROBE_RANGE: &str = "A1";

/// What the fetcher knows about the configured sheets
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Logical sheets, in configuration order
    pub sheets: Vec<LogicalSheet>,

    /// Category → field → range templates
    pub templates: BTreeMap<Category, BTreeMap<String, String>>,

    /// Attempt budget per fetch
    pub retry: RetryPolicy,

    /// Sweep retention ceiling
    pub retention: Duration,
}

impl FetcherConfig {
    pub fn new(sheets: Vec<LogicalSheet>) -> Self {
        Self {
            sheets,
            templates: default_category_ranges(),
            retry: RetryPolicy::default(),
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_template(mut self, category: Category, ranges: BTreeMap<String, String>) -> Self {
        self.templates.insert(category, ranges);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

impl From<&SheetCacheConfig> for FetcherConfig {
    fn from(config: &SheetCacheConfig) -> Self {
        Self {
            sheets: config.sheets.clone(),
            templates: config.category_templates(),
            retry: config.rate_limit.retry_policy(),
            retention: config.cache.retention(),
        }
    }
}

/// Result of probing one sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionCheck {
    pub sheet: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fetcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct FetcherStats {
    pub sheets: usize,
    pub cache: CacheStats,
    pub backoff_multiplier: u32,
    pub current_interval_ms: u64,
}

/// The fetch orchestrator
pub struct Fetcher {
    sheets: Vec<LogicalSheet>,
    templates: BTreeMap<Category, BTreeMap<String, String>>,
    retry: RetryPolicy,
    retention: Duration,
    planner: BatchPlanner,
    cache: Arc<CacheStore>,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn SheetTransport>,
}

impl Fetcher {
    pub fn new(
        config: FetcherConfig,
        cache: Arc<CacheStore>,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn SheetTransport>,
    ) -> Self {
        Self {
            sheets: config.sheets,
            templates: config.templates,
            retry: config.retry,
            retention: config.retention,
            planner: BatchPlanner::new(),
            cache,
            limiter,
            transport,
        }
    }

    pub fn sheets(&self) -> &[LogicalSheet] {
        &self.sheets
    }

    pub fn sheet(&self, key: &str) -> Option<&LogicalSheet> {
        self.sheets.iter().find(|s| s.key == key)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fetch a sheet's values, from cache when fresh
    pub async fn fetch(&self, sheet: &str, category: Category) -> FetchOutcome {
        self.run(sheet, category, false).await
    }

    /// Fetch bypassing the freshness check. Still throttled.
    pub async fn force_refresh(&self, sheet: &str, category: Category) -> FetchOutcome {
        self.run(sheet, category, true).await
    }

    /// Fetch every configured sheet concurrently. All calls share the limiter,
    /// so this is as quota-friendly as fetching them one by one.
    pub async fn fetch_all(&self) -> Vec<(String, FetchOutcome)> {
        self.run_all(false).await
    }

    /// Force-refresh every configured sheet
    pub async fn refresh_all(&self) -> Vec<(String, FetchOutcome)> {
        self.run_all(true).await
    }

    async fn run_all(&self, refresh: bool) -> Vec<(String, FetchOutcome)> {
        let fetches = self.sheets.iter().map(|sheet| async move {
            let outcome = self.run(&sheet.key, sheet.category, refresh).await;
            (sheet.key.clone(), outcome)
        });
        let results = join_all(fetches).await;

        let fetched = results.iter().filter(|(_, o)| o.is_fetched()).count();
        info!(
            sheets = results.len(),
            fetched,
            refresh,
            "Fetched all sheets"
        );
        results
    }

    async fn run(&self, sheet_key: &str, category: Category, refresh: bool) -> FetchOutcome {
        let started = Instant::now();
        let outcome = self.fetch_inner(sheet_key, category, refresh).await;
        metrics::record_fetch_duration(outcome.label(), started.elapsed().as_secs_f64());
        outcome
    }

    async fn fetch_inner(&self, sheet_key: &str, category: Category, refresh: bool) -> FetchOutcome {
        let Some(sheet) = self.sheet(sheet_key) else {
            warn!(sheet = sheet_key, "Unknown sheet requested");
            return FetchOutcome::no_data(FailureReason::UnknownSheet);
        };

        if sheet.category != category {
            warn!(
                sheet = sheet_key,
                requested = %category,
                configured = %sheet.category,
                "Category does not match sheet configuration"
            );
            return FetchOutcome::no_data(FailureReason::NothingToFetch);
        }

        let key = sheet.cache_key();

        // CheckCache
        if !refresh {
            if let Some(cached) = self.cache.get(&key) {
                if cached.fresh {
                    debug!(key = %key, age_secs = cached.age.as_secs(), "Cache hit");
                    metrics::record_cache_hit();
                    return FetchOutcome::Fetched(FetchedData {
                        values: cached.values,
                        stale: false,
                        age: cached.age,
                        cached_at: cached.cached_at,
                        source: ValueSource::Cache,
                        fallback_reason: None,
                    });
                }
            }
            metrics::record_cache_miss();
        }

        // Plan
        let template = self.templates.get(&category).cloned().unwrap_or_default();
        let plan = self.planner.plan(sheet, sheet.range_requests(&template));
        if plan.is_empty() {
            debug!(key = %key, "Nothing to fetch");
            return FetchOutcome::no_data(FailureReason::NothingToFetch);
        }
        let ranges = plan.ranges();

        // Throttle-gate → Transport, retrying throttled attempts
        let mut attempts = 0;
        let reason = loop {
            let permit = self.limiter.acquire().await;
            attempts += 1;

            let error = match self
                .transport
                .batch_read(plan.spreadsheet_id(), plan.worksheet(), &ranges)
                .await
            {
                Ok(blocks) => match plan.decode(&blocks, category) {
                    Ok(values) => {
                        permit.succeeded().await;
                        metrics::record_transport_call("ok");
                        return self.store_fresh(&key, values, attempts);
                    }
                    Err(message) => {
                        // The call went through; only the payload is wrong.
                        permit.succeeded().await;
                        metrics::record_transport_call("malformed");
                        warn!(key = %key, error = %message, "Malformed transport response");
                        break FailureReason::Transport;
                    }
                },
                Err(e) => e,
            };

            metrics::record_transport_call(error.outcome_label());
            let decision = error.retry_decision();
            match decision {
                RetryDecision::RetryAfter(hint) => permit.throttled_for(hint).await,
                RetryDecision::Retry => permit.throttled().await,
                RetryDecision::NoRetry => drop(permit),
            }

            let reason = FailureReason::from(&error);
            if self.retry.allows_retry(attempts, decision) {
                debug!(key = %key, attempt = attempts, error = %error, "Retrying after throttle");
                continue;
            }

            match reason {
                FailureReason::Auth => {
                    error!(key = %key, attempts, error = %error, "Authentication failed")
                }
                _ => warn!(key = %key, attempts, error = %error, "Remote read failed"),
            }
            break reason;
        };

        self.fall_back(&key, reason)
    }

    fn store_fresh(
        &self,
        key: &CacheKey,
        values: FieldValues,
        attempts: u32,
    ) -> FetchOutcome {
        let cached_at = self.cache.now();
        // A failed write is logged inside the store; the caller still gets data.
        self.cache.put(key, &values);
        debug!(key = %key, attempts, fields = values.len(), "Fetched from remote");
        FetchOutcome::Fetched(FetchedData {
            values,
            stale: false,
            age: Duration::ZERO,
            cached_at,
            source: ValueSource::Remote,
            fallback_reason: None,
        })
    }

    fn fall_back(&self, key: &CacheKey, reason: FailureReason) -> FetchOutcome {
        match self.cache.get(key) {
            Some(cached) => {
                info!(
                    key = %key,
                    age_secs = cached.age.as_secs(),
                    reason = %reason,
                    "Serving stale cache entry"
                );
                metrics::record_stale_fallback();
                FetchOutcome::Fetched(FetchedData {
                    values: cached.values,
                    stale: true,
                    age: cached.age,
                    cached_at: cached.cached_at,
                    source: ValueSource::Fallback,
                    fallback_reason: Some(reason),
                })
            }
            None => FetchOutcome::no_data(reason),
        }
    }

    /// Remove cache entries now
    pub fn clear_cache(&self, scope: &ClearScope) -> usize {
        self.cache.clear(scope)
    }

    /// Remove entries older than the retention ceiling
    pub fn sweep(&self) -> usize {
        self.cache.sweep(self.retention)
    }

    /// Read one cell of a sheet through the limiter to confirm it is reachable
    pub async fn check_connection(&self, sheet_key: &str) -> ConnectionCheck {
        let Some(sheet) = self.sheet(sheet_key) else {
            return ConnectionCheck {
                sheet: sheet_key.to_string(),
                ok: false,
                reason: Some(FailureReason::UnknownSheet),
                error: None,
            };
        };

        let permit = self.limiter.acquire().await;
        let result = self
            .transport
            .batch_read(
                &sheet.spreadsheet_id,
                sheet.worksheet.as_deref(),
                &[PROBE_RANGE.to_string()],
            )
            .await;

        match result {
            Ok(_) => {
                permit.succeeded().await;
                metrics::record_transport_call("ok");
                info!(sheet = sheet_key, "Connection check passed");
                ConnectionCheck {
                    sheet: sheet_key.to_string(),
                    ok: true,
                    reason: None,
                    error: None,
                }
            }
            Err(e) => {
                match e.retry_decision() {
                    RetryDecision::RetryAfter(hint) => permit.throttled_for(hint).await,
                    RetryDecision::Retry => permit.throttled().await,
                    RetryDecision::NoRetry => drop(permit),
                }
                metrics::record_transport_call(e.outcome_label());
                warn!(sheet = sheet_key, error = %e, "Connection check failed");
                ConnectionCheck {
                    sheet: sheet_key.to_string(),
                    ok: false,
                    reason: Some(FailureReason::from(&e)),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Probe every configured sheet
    pub async fn check_all_connections(&self) -> Vec<ConnectionCheck> {
        join_all(self.sheets.iter().map(|s| self.check_connection(&s.key))).await
    }

    pub async fn stats(&self) -> FetcherStats {
        FetcherStats {
            sheets: self.sheets.len(),
            cache: self.cache.stats(),
            backoff_multiplier: self.limiter.multiplier().await,
            current_interval_ms: self.limiter.current_interval().await.as_millis() as u64,
        }
    }
}
