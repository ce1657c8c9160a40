//! Background refresh scheduler
//!
//! Force-refreshes every configured sheet at fixed local wall-clock times
//! (10:00 and 16:00 in the dashboard's timezone by default) and sweeps
//! entries past the retention ceiling on an interval. Runs as a tokio event
//! loop until told to stop by command or signal.

use crate::clock::Clock;
use crate::config::SheetCacheConfig;
use crate::fetcher::Fetcher;
use crate::Result;
use chrono::{DateTime, Days, FixedOffset, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Default sweep interval (1 hour)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Default event channel capacity
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 100;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Local refresh times
    pub refresh_times: Vec<NaiveTime>,

    /// Offset `refresh_times` are expressed in
    pub offset: FixedOffset,

    /// Run scheduled refreshes at all
    pub refresh_enabled: bool,

    /// Interval between retention sweeps
    pub sweep_interval: Duration,

    /// Stop on SIGTERM/SIGINT
    pub handle_signals: bool,

    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,
}

impl SchedulerConfig {
    pub fn new(refresh_times: Vec<NaiveTime>, offset: FixedOffset) -> Self {
        Self {
            refresh_times,
            offset,
            refresh_enabled: true,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            handle_signals: true,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    /// Build from the `schedule` and `cache` sections of the configuration
    pub fn from_config(config: &SheetCacheConfig) -> Result<Self> {
        Ok(Self::new(config.schedule.times()?, config.schedule.offset()?)
            .with_refresh_enabled(config.schedule.enabled)
            .with_sweep_interval(config.cache.sweep_interval()))
    }

    pub fn with_refresh_enabled(mut self, enabled: bool) -> Self {
        self.refresh_enabled = enabled;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_signals(mut self, handle_signals: bool) -> Self {
        self.handle_signals = handle_signals;
        self
    }
}

/// Events emitted by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    Started,
    Stopped,

    /// A refresh cycle began
    RefreshStarted,

    /// A refresh cycle finished
    RefreshCompleted {
        /// Sheets attempted
        sheets: usize,
        /// Sheets that got fresh remote data
        refreshed: usize,
        /// Sheets served from a stale entry
        stale: usize,
        /// Sheets with no data at all
        failed: usize,
    },

    /// A retention sweep finished
    SweepCompleted { removed: usize },
}

/// Commands that can be sent to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Refresh every sheet now
    RefreshNow,

    /// Sweep now
    SweepNow,

    /// Stop the scheduler
    Shutdown,
}

/// The earliest configured refresh time strictly after `after`
pub fn next_refresh_after(
    after: DateTime<Utc>,
    times: &[NaiveTime],
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let today = after.with_timezone(&offset).date_naive();
    let mut sorted = times.to_vec();
    sorted.sort();

    [Some(today), today.checked_add_days(Days::new(1))]
        .into_iter()
        .flatten()
        .flat_map(|date| sorted.iter().map(move |t| date.and_time(*t)))
        .filter_map(|local| offset.from_local_datetime(&local).single())
        .map(|dt| dt.with_timezone(&Utc))
        .find(|candidate| *candidate > after)
}

#[cfg(unix)]
struct Signals {
    term: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        let term = signal(SignalKind::terminate()).map_err(|e| {
            crate::SheetCacheError::Other(format!("Failed to set up SIGTERM handler: {}", e))
        })?;
        let int = signal(SignalKind::interrupt()).map_err(|e| {
            crate::SheetCacheError::Other(format!("Failed to set up SIGINT handler: {}", e))
        })?;
        Ok(Self { term, int })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.int.recv() => "SIGINT",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}

/// Refresh scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    fetcher: Arc<Fetcher>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<SchedulerEvent>,
    command_rx: Option<mpsc::Receiver<SchedulerCommand>>,
    command_tx: mpsc::Sender<SchedulerCommand>,
    /// Next scheduled refresh
    next_due: Option<DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, fetcher: Arc<Fetcher>, clock: Arc<dyn Clock>) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(10);
        Self {
            config,
            fetcher,
            clock,
            event_tx,
            command_rx: Some(command_rx),
            command_tx,
            next_due: None,
        }
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Get a command sender for controlling the scheduler
    pub fn command_sender(&self) -> mpsc::Sender<SchedulerCommand> {
        self.command_tx.clone()
    }

    /// Next scheduled refresh, if any
    pub fn next_refresh(&self) -> Option<DateTime<Utc>> {
        if !self.config.refresh_enabled {
            return None;
        }
        self.next_due
            .or_else(|| next_refresh_after(self.clock.now(), &self.config.refresh_times, self.config.offset))
    }

    fn send_event(&self, event: SchedulerEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Run until shutdown
    pub async fn run(&mut self) -> Result<()> {
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| crate::SheetCacheError::Config("Scheduler already running".to_string()))?;
        let mut signals = if self.config.handle_signals {
            Some(Signals::new()?)
        } else {
            None
        };

        let mut sweep_interval = tokio::time::interval(self.config.sweep_interval.max(Duration::from_secs(1)));
        sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.next_due = self.next_refresh();
        tracing::info!(
            next_refresh = ?self.next_due,
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            "Scheduler started"
        );
        self.send_event(SchedulerEvent::Started);

        loop {
            let refresh_wait = self.next_due.map(|due| {
                due.signed_duration_since(self.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            });

            tokio::select! {
                _ = tokio::time::sleep(refresh_wait.unwrap_or_default()), if refresh_wait.is_some() => {
                    self.refresh_cycle().await;
                    let fired = self.next_due.unwrap_or_else(|| self.clock.now());
                    self.next_due = next_refresh_after(
                        fired.max(self.clock.now()),
                        &self.config.refresh_times,
                        self.config.offset,
                    );
                    tracing::debug!(next_refresh = ?self.next_due, "Next refresh scheduled");
                }
                _ = sweep_interval.tick() => {
                    self.sweep();
                }
                Some(cmd) = command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::RefreshNow => self.refresh_cycle().await,
                        SchedulerCommand::SweepNow => self.sweep(),
                        SchedulerCommand::Shutdown => {
                            tracing::info!("Received shutdown command");
                            break;
                        }
                    }
                }
                name = async {
                    match signals.as_mut() {
                        Some(signals) => signals.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    tracing::info!(signal = name, "Received signal, initiating graceful shutdown");
                    break;
                }
            }
        }

        tracing::info!("Scheduler stopped");
        self.send_event(SchedulerEvent::Stopped);
        Ok(())
    }

    async fn refresh_cycle(&self) {
        self.send_event(SchedulerEvent::RefreshStarted);
        tracing::info!(sheets = self.fetcher.sheets().len(), "Scheduled refresh started");

        let results = self.fetcher.refresh_all().await;
        let sheets = results.len();
        let stale = results.iter().filter(|(_, o)| o.is_stale()).count();
        let failed = results.iter().filter(|(_, o)| !o.is_fetched()).count();
        let refreshed = sheets - stale - failed;

        tracing::info!(sheets, refreshed, stale, failed, "Scheduled refresh completed");
        self.send_event(SchedulerEvent::RefreshCompleted {
            sheets,
            refreshed,
            stale,
            failed,
        });
    }

    fn sweep(&self) {
        let removed = self.fetcher.sweep();
        self.send_event(SchedulerEvent::SweepCompleted { removed });
    }
}
