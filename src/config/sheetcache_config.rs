//! sheetcache configuration file handling
//!
//! Loads and manages the ~/.config/sheetcache/config.yaml file.

use crate::cache::SqliteConfig;
use crate::ratelimit::{RateLimiterConfig, RetryPolicy};
use crate::sheet::{Category, LogicalSheet};
use crate::transport::DEFAULT_BASE_URL;
use crate::Result;
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// SQLite database path
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Freshness TTL in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Entries older than this are removed by sweeps
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Seconds between background sweeps in `serve`
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_cache_path() -> PathBuf {
    SqliteConfig::default().path
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_retention_secs() -> u64 {
    24 * 3600
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            ttl_secs: default_ttl_secs(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sqlite_config(&self) -> SqliteConfig {
        SqliteConfig {
            path: self.path.clone(),
            ..Default::default()
        }
    }
}

/// Rate limiting and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Minimum spacing between Sheets API calls in milliseconds
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Total transport attempts per fetch
    #[serde(default = "default_max_attempts", alias = "max_retries")]
    pub max_attempts: u32,

    /// Backoff multiplier ceiling
    #[serde(default = "default_backoff_ceiling")]
    pub backoff_ceiling: u32,

    /// Consecutive successes before backoff resets
    #[serde(default = "default_success_streak")]
    pub success_streak: u32,
}

fn default_min_interval_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    2
}

fn default_backoff_ceiling() -> u32 {
    16
}

fn default_success_streak() -> u32 {
    1
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff_ceiling: default_backoff_ceiling(),
            success_streak: default_success_streak(),
        }
    }
}

impl RateLimitSettings {
    pub fn limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            min_interval: Duration::from_millis(self.min_interval_ms),
            max_multiplier: self.backoff_ceiling,
            success_streak: self.success_streak,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
    }
}

/// Scheduled refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Run forced refreshes at `refresh_times` while serving
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,

    /// Local wall-clock times, `HH:MM`
    #[serde(default = "default_refresh_times")]
    pub refresh_times: Vec<String>,

    /// Offset the refresh times are expressed in, e.g. `+08:00`
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

fn default_schedule_enabled() -> bool {
    true
}

fn default_refresh_times() -> Vec<String> {
    vec!["10:00".to_string(), "16:00".to_string()]
}

fn default_utc_offset() -> String {
    // Asia/Kuala_Lumpur has no DST
    "+08:00".to_string()
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: default_schedule_enabled(),
            refresh_times: default_refresh_times(),
            utc_offset: default_utc_offset(),
        }
    }
}

/// Parse one `HH:MM` refresh time
pub fn parse_refresh_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| {
        crate::SheetCacheError::Config(format!("Invalid refresh time '{}': {}", raw, e))
    })
}

/// Parse a `+HH:MM` / `-HH:MM` UTC offset
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    raw.trim().parse::<FixedOffset>().map_err(|e| {
        crate::SheetCacheError::Config(format!("Invalid UTC offset '{}': {}", raw, e))
    })
}

impl ScheduleSettings {
    /// Parsed refresh times, sorted and deduplicated
    pub fn times(&self) -> Result<Vec<NaiveTime>> {
        let mut times = self
            .refresh_times
            .iter()
            .map(|raw| parse_refresh_time(raw))
            .collect::<Result<Vec<_>>>()?;
        times.sort();
        times.dedup();
        Ok(times)
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.utc_offset)
    }
}

/// Sheets API transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// sheetcache configuration
///
/// Represents the complete ~/.config/sheetcache/config.yaml file: the logical
/// sheets the dashboard reads, per-category range templates, and the cache,
/// rate limit, schedule and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetCacheConfig {
    /// Logical sheets, addressed by key
    #[serde(default)]
    pub sheets: Vec<LogicalSheet>,

    /// Per-category range templates; categories not listed use the built-in
    /// template. An empty template means the category has nothing to fetch.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<Category, BTreeMap<String, String>>,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub transport: TransportSettings,
}

impl SheetCacheConfig {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self {
            sheets: Vec::new(),
            categories: BTreeMap::new(),
            cache: CacheSettings::default(),
            rate_limit: RateLimitSettings::default(),
            schedule: ScheduleSettings::default(),
            transport: TransportSettings::default(),
        }
    }

    /// Starter configuration written by `sheetcache init`: the regional
    /// dashboard layout with placeholder spreadsheet ids.
    pub fn sample() -> Self {
        const VIP_MEMBERSHIP_ID: &str = "REPLACE-WITH-VIP-MEMBERSHIP-SPREADSHEET-ID";
        const FUNNEL_ID: &str = "REPLACE-WITH-FUNNEL-SPREADSHEET-ID";
        const VELOCITY_ID: &str = "REPLACE-WITH-VELOCITY-SPREADSHEET-ID";

        let regions = [("my", "Malaysia"), ("ph", "Philippines"), ("th", "Thailand")];
        let mut sheets = Vec::new();

        for (code, country) in regions {
            let tab = code.to_ascii_uppercase();
            sheets.push(
                LogicalSheet::new(format!("vip_{}", code), VIP_MEMBERSHIP_ID, Some(tab.as_str()), Category::Vip)
                    .with_name(format!("{} VIP Data", country)),
            );
        }

        for (code, country) in regions {
            let tab = code.to_ascii_uppercase();
            let mut sheet = LogicalSheet::new(
                format!("membership_{}", code),
                VIP_MEMBERSHIP_ID,
                Some(tab.as_str()),
                Category::Membership,
            )
            .with_name(format!("{} Membership Data", country));
            if code == "th" {
                sheet = sheet
                    .with_range("membership_1", "V30")
                    .with_range("membership_2", "V31");
            }
            sheets.push(sheet);
        }

        let funnel_overrides: [(&str, &[(&str, &str)]); 3] = [
            ("my", &[]),
            (
                "ph",
                &[
                    ("leads", "BD84"),
                    ("qualified_leads", "BE84"),
                    ("opportunities", "BF84"),
                    ("proposals", "BG84"),
                    ("negotiations", "BH84"),
                    ("closed_won", "BI84"),
                    ("closed_lost", "BJ84"),
                ],
            ),
            (
                "th",
                &[
                    ("leads", "BH78"),
                    ("qualified_leads", "BI78"),
                    ("opportunities", "BJ78"),
                    ("proposals", "BK78"),
                    ("negotiations", "BL78"),
                    ("closed_won", "BM78"),
                    ("closed_lost", "BN78"),
                ],
            ),
        ];
        for ((code, country), (_, overrides)) in regions.iter().zip(funnel_overrides) {
            let tab = format!("{} (IB)", code.to_ascii_uppercase());
            let mut sheet =
                LogicalSheet::new(format!("funnel_{}", code), FUNNEL_ID, Some(tab.as_str()), Category::Funnel)
                    .with_name(format!("{} Sales Funnel", country));
            for (field, range) in overrides {
                sheet = sheet.with_range(*field, *range);
            }
            sheets.push(sheet);
        }

        sheets.push(
            LogicalSheet::new("velocity_my", VELOCITY_ID, None, Category::Velocity)
                .with_name("Malaysia Sales Velocity"),
        );

        Self {
            sheets,
            categories: crate::sheet::default_category_ranges(),
            ..Self::new()
        }
    }

    /// Load configuration from the default path (~/.config/sheetcache/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::SheetCacheError::Config(format!(
                "Config file not found: {} (run `sheetcache init` to create one)",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading sheetcache configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            sheets = config.sheets.len(),
            ttl_secs = config.cache.ttl_secs,
            min_interval_ms = config.rate_limit.min_interval_ms,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "Saving sheetcache configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/sheetcache/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("sheetcache");
        path.push("config.yaml");
        path
    }

    /// Get a sheet by key
    pub fn get_sheet(&self, key: &str) -> Option<&LogicalSheet> {
        self.sheets.iter().find(|s| s.key == key)
    }

    pub fn add_sheet(&mut self, sheet: LogicalSheet) {
        self.sheets.push(sheet);
    }

    pub fn sheet_keys(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.key.as_str()).collect()
    }

    /// Range template for a category: the configured one, else the built-in
    pub fn ranges_for(&self, category: Category) -> BTreeMap<String, String> {
        self.categories
            .get(&category)
            .cloned()
            .unwrap_or_else(|| category.default_ranges())
    }

    /// Every category → template mapping in effect
    pub fn category_templates(&self) -> BTreeMap<Category, BTreeMap<String, String>> {
        Category::ALL
            .iter()
            .map(|c| (*c, self.ranges_for(*c)))
            .collect()
    }
}

impl Default for SheetCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}
