//! Configuration system
//!
//! Loads ~/.config/sheetcache/config.yaml with support for:
//! - Logical sheets (spreadsheet id, worksheet, category, range overrides)
//! - Per-category range templates
//! - Cache TTL and retention
//! - Rate limiting and retry budget
//! - Scheduled refresh times

mod sheetcache_config;
pub mod validation;

pub use sheetcache_config::{
    parse_refresh_time, parse_utc_offset, CacheSettings, RateLimitSettings, ScheduleSettings,
    SheetCacheConfig, TransportSettings,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
