//! Configuration validation
//!
//! Validates sheetcache configuration for correctness:
//! - No duplicate or empty sheet keys
//! - Every sheet names a spreadsheet
//! - Range overrides refer to fields the category template knows
//! - Cache retention outlives the freshness TTL
//! - Rate limit and schedule settings are usable

use super::sheetcache_config::{parse_refresh_time, parse_utc_offset, SheetCacheConfig};
use crate::sheet::LogicalSheet;
use crate::SheetCacheError;
use std::collections::{BTreeMap, HashSet};

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Sheet key the problem belongs to, if any
    pub context: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref ctx) = self.context {
            write!(f, "[{}] {}: {}", ctx, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a sheetcache configuration, reporting every problem found
pub fn validate_config(config: &SheetCacheConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.sheets.is_empty() {
        errors.push(ValidationError::new(
            "sheets",
            "At least one sheet must be defined",
        ));
    }

    let mut seen_keys = HashSet::new();
    for sheet in &config.sheets {
        if !sheet.key.is_empty() && !seen_keys.insert(&sheet.key) {
            errors.push(ValidationError::new(
                "sheets",
                format!("Duplicate sheet key: {}", sheet.key),
            ));
        }
    }

    for sheet in &config.sheets {
        let template = config.ranges_for(sheet.category);
        if let Err(mut sheet_errors) = validate_sheet(sheet, &template) {
            errors.append(&mut sheet_errors);
        }
    }

    for (category, template) in &config.categories {
        for (field, range) in template {
            if range.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("categories.{}.{}", category, field),
                    "Range cannot be empty",
                ));
            }
        }
    }

    // Cache
    if config.cache.ttl_secs == 0 {
        errors.push(ValidationError::new(
            "cache.ttl_secs",
            "TTL must be greater than 0",
        ));
    }
    if config.cache.retention_secs <= config.cache.ttl_secs {
        errors.push(ValidationError::new(
            "cache.retention_secs",
            format!(
                "Retention ({}s) must be longer than the TTL ({}s) or stale fallback never has data",
                config.cache.retention_secs, config.cache.ttl_secs
            ),
        ));
    }
    if config.cache.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "cache.sweep_interval_secs",
            "Sweep interval must be greater than 0",
        ));
    }

    // Rate limiting
    if config.rate_limit.min_interval_ms == 0 {
        errors.push(ValidationError::new(
            "rate_limit.min_interval_ms",
            "Minimum interval must be greater than 0",
        ));
    }
    if config.rate_limit.max_attempts == 0 {
        errors.push(ValidationError::new(
            "rate_limit.max_attempts",
            "At least one attempt is required",
        ));
    }
    if config.rate_limit.backoff_ceiling == 0 {
        errors.push(ValidationError::new(
            "rate_limit.backoff_ceiling",
            "Backoff ceiling must be at least 1",
        ));
    }
    if config.rate_limit.success_streak == 0 {
        errors.push(ValidationError::new(
            "rate_limit.success_streak",
            "Success streak must be at least 1",
        ));
    }

    // Schedule
    for raw in &config.schedule.refresh_times {
        if let Err(e) = parse_refresh_time(raw) {
            errors.push(ValidationError::new("schedule.refresh_times", e.to_string()));
        }
    }
    if let Err(e) = parse_utc_offset(&config.schedule.utc_offset) {
        errors.push(ValidationError::new("schedule.utc_offset", e.to_string()));
    }

    // Transport
    if !config.transport.base_url.starts_with("https://")
        && !config.transport.base_url.starts_with("http://")
    {
        errors.push(ValidationError::new(
            "transport.base_url",
            format!("Invalid URL: {}", config.transport.base_url),
        ));
    }
    if config.transport.timeout_secs == 0 {
        errors.push(ValidationError::new(
            "transport.timeout_secs",
            "Timeout must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a single logical sheet against its category template
fn validate_sheet(sheet: &LogicalSheet, template: &BTreeMap<String, String>) -> ValidationResult {
    let mut errors = Vec::new();
    let context = if sheet.key.is_empty() {
        "<unnamed>"
    } else {
        sheet.key.as_str()
    };

    if sheet.key.trim().is_empty() {
        errors.push(
            ValidationError::new("key", "Sheet key cannot be empty").with_context(context),
        );
    }

    if sheet.spreadsheet_id.trim().is_empty() {
        errors.push(
            ValidationError::new("spreadsheet_id", "Spreadsheet id cannot be empty")
                .with_context(context),
        );
    }

    if let Some(worksheet) = &sheet.worksheet {
        if worksheet.trim().is_empty() {
            errors.push(
                ValidationError::new(
                    "worksheet",
                    "Worksheet name cannot be blank (omit it to use the first worksheet)",
                )
                .with_context(context),
            );
        }
    }

    for (field, range) in &sheet.ranges {
        if !template.contains_key(field) {
            errors.push(
                ValidationError::new(
                    format!("ranges.{}", field),
                    format!(
                        "Unknown field for category '{}' (known: {})",
                        sheet.category,
                        template.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                )
                .with_context(context),
            );
        } else if range.trim().is_empty() {
            errors.push(
                ValidationError::new(format!("ranges.{}", field), "Range cannot be empty")
                    .with_context(context),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and convert to a `SheetCacheError` if invalid
pub fn validate_config_result(config: &SheetCacheConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        SheetCacheError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::Category;

    fn valid_config() -> SheetCacheConfig {
        let mut config = SheetCacheConfig::new();
        config.add_sheet(LogicalSheet::new("vip_my", "sheet-1", Some("MY"), Category::Vip));
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
        assert!(validate_config(&SheetCacheConfig::sample()).is_ok());
    }

    #[test]
    fn test_empty_sheets() {
        let config = SheetCacheConfig::new();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("At least one sheet"));
    }

    #[test]
    fn test_duplicate_sheet_keys() {
        let mut config = valid_config();
        config.add_sheet(LogicalSheet::new("vip_my", "sheet-2", None, Category::Vip));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Duplicate sheet key"));
    }

    #[test]
    fn test_empty_spreadsheet_id() {
        let mut config = SheetCacheConfig::new();
        config.add_sheet(LogicalSheet::new("vip_my", "  ", None, Category::Vip));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "spreadsheet_id");
        assert_eq!(errors[0].context.as_deref(), Some("vip_my"));
    }

    #[test]
    fn test_unknown_override_field() {
        let mut config = SheetCacheConfig::new();
        config.add_sheet(
            LogicalSheet::new("vip_my", "sheet-1", None, Category::Vip).with_range("revenue", "Z9"),
        );

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "ranges.revenue");
        assert!(errors[0].to_string().starts_with("[vip_my]"));
    }

    #[test]
    fn test_retention_must_exceed_ttl() {
        let mut config = valid_config();
        config.cache.retention_secs = config.cache.ttl_secs;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "cache.retention_secs");
    }

    #[test]
    fn test_rate_limit_and_schedule_problems_reported_together() {
        let mut config = valid_config();
        config.rate_limit.min_interval_ms = 0;
        config.rate_limit.max_attempts = 0;
        config.schedule.refresh_times = vec!["10:00".into(), "4pm".into()];
        config.schedule.utc_offset = "MYT".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "rate_limit.min_interval_ms",
                "rate_limit.max_attempts",
                "schedule.refresh_times",
                "schedule.utc_offset"
            ]
        );
    }

    #[test]
    fn test_validate_config_result() {
        let err = validate_config_result(&SheetCacheConfig::new()).unwrap_err();
        assert!(err.to_string().contains("Configuration validation failed"));
    }
}
