//! Process-wide request spacing with exponential backoff
//!
//! One `RateLimiter` is shared by every fetch in the process because the
//! Sheets quota is per project, not per sheet. Callers take turns through a
//! FIFO turn lock. The spacing state sits behind its own short-lived lock,
//! which is never held across a sleep, so throttle and success reports land
//! immediately and the caller currently waiting recomputes its wait.

use crate::metrics;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Default minimum spacing between transport calls
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Default backoff multiplier ceiling
pub const DEFAULT_MAX_MULTIPLIER: u32 = 16;

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Minimum spacing between calls; a floor regardless of backoff
    pub min_interval: Duration,

    /// Ceiling for the backoff multiplier
    pub max_multiplier: u32,

    /// Consecutive successes needed before the multiplier resets
    pub success_streak: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            max_multiplier: DEFAULT_MAX_MULTIPLIER,
            success_streak: 1,
        }
    }
}

impl RateLimiterConfig {
    /// Longest spacing the limiter will ever impose
    pub fn max_interval(&self) -> Duration {
        self.min_interval.saturating_mul(self.max_multiplier.max(1))
    }
}

#[derive(Debug)]
struct RateLimiterState {
    last_call: Option<Instant>,
    multiplier: u32,
    successes: u32,
    /// Server-requested earliest time for the next call
    not_before: Option<Instant>,
}

impl RateLimiterState {
    fn new() -> Self {
        Self {
            last_call: None,
            multiplier: 1,
            successes: 0,
            not_before: None,
        }
    }

    fn interval(&self, config: &RateLimiterConfig) -> Duration {
        config.min_interval.saturating_mul(self.multiplier)
    }

    fn wait_at(&self, now: Instant, config: &RateLimiterConfig) -> Duration {
        let spacing_due = self.last_call.map(|last| last + self.interval(config));
        let due = match (spacing_due, self.not_before) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        due.map(|due| due.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

/// Shared rate limiter for all transport calls
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<RateLimiterState>,
    /// Held by the caller currently waiting for its slot
    turn: Mutex<()>,
    /// Signalled when a report changes the schedule
    changed: Notify,
}

/// Proof that a caller waited its turn. Report the call's outcome through it.
#[must_use = "report the transport outcome through the permit"]
#[derive(Debug)]
pub struct Permit<'a> {
    limiter: &'a RateLimiter,
    waited: Duration,
}

impl Permit<'_> {
    /// How long `acquire` waited before issuing this permit
    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub async fn succeeded(self) {
        self.limiter.on_success().await;
    }

    pub async fn throttled(self) {
        self.limiter.on_throttled().await;
    }

    pub async fn throttled_for(self, retry_after: Duration) {
        self.limiter.on_throttled_for(retry_after).await;
    }
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let config = RateLimiterConfig {
            max_multiplier: config.max_multiplier.max(1),
            success_streak: config.success_streak.max(1),
            ..config
        };
        Self {
            config,
            state: Mutex::new(RateLimiterState::new()),
            turn: Mutex::new(()),
            changed: Notify::new(),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Wait until the next call is allowed, then record the call.
    ///
    /// A throttle or success report that arrives while the caller sleeps
    /// wakes it, and the wait is recomputed from the new multiplier.
    pub async fn acquire(&self) -> Permit<'_> {
        let _turn = self.turn.lock().await;
        let started = Instant::now();

        loop {
            // Registered before reading state so no report slips between.
            let changed = self.changed.notified();

            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let wait = state.wait_at(now, &self.config);
                if wait.is_zero() {
                    state.last_call = Some(now);
                    state.not_before = None;
                    break;
                }
                debug!(
                    wait_ms = wait.as_millis() as u64,
                    multiplier = state.multiplier,
                    "Waiting for rate limiter"
                );
                wait
            };

            tokio::select! {
                _ = sleep(wait) => {}
                _ = changed => debug!("Rate limiter schedule changed, recomputing wait"),
            }
        }

        Permit {
            limiter: self,
            waited: started.elapsed(),
        }
    }

    /// Non-blocking: how long `acquire` would wait right now
    pub async fn next_wait(&self) -> Duration {
        let state = self.state.lock().await;
        state.wait_at(Instant::now(), &self.config)
    }

    /// The last transport attempt was throttled: double the multiplier (capped)
    pub async fn on_throttled(&self) {
        let mut state = self.state.lock().await;
        self.throttle(&mut state);
        drop(state);
        self.changed.notify_waiters();
    }

    /// Throttled with a server-supplied retry-after hint, capped at the longest
    /// interval the limiter would impose on its own
    pub async fn on_throttled_for(&self, retry_after: Duration) {
        let mut state = self.state.lock().await;
        self.throttle(&mut state);
        let hint = retry_after.min(self.config.max_interval());
        state.not_before = Some(Instant::now() + hint);
        drop(state);
        self.changed.notify_waiters();
    }

    fn throttle(&self, state: &mut RateLimiterState) {
        state.multiplier = state
            .multiplier
            .saturating_mul(2)
            .min(self.config.max_multiplier);
        state.successes = 0;
        metrics::set_backoff_multiplier(state.multiplier);
        warn!(
            multiplier = state.multiplier,
            interval_ms = state.interval(&self.config).as_millis() as u64,
            "Throttled by remote, backing off"
        );
    }

    /// The last transport attempt succeeded
    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;
        state.successes = state.successes.saturating_add(1);
        if state.successes >= self.config.success_streak {
            let reset = state.multiplier != 1;
            if reset {
                debug!(previous = state.multiplier, "Backoff reset");
            }
            state.multiplier = 1;
            state.successes = 0;
            metrics::set_backoff_multiplier(1);
            drop(state);
            if reset {
                self.changed.notify_waiters();
            }
        }
    }

    pub async fn multiplier(&self) -> u32 {
        self.state.lock().await.multiplier
    }

    /// Current effective spacing: `min_interval * multiplier`
    pub async fn current_interval(&self) -> Duration {
        self.state.lock().await.interval(&self.config)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
