//! Sheet data model
//!
//! - **LogicalSheet**: one configured spreadsheet + worksheet the dashboard reads
//! - **RangeRequest**: one named cell range needed from a logical sheet
//! - **CacheKey**: (logical sheet, category) identity of a cache entry
//! - **FieldValue**: decoded content of a range

mod category;
mod value;

pub use category::{default_category_ranges, Category, CategorySpec, DecodeFn};
pub use value::{decode_block, decode_first_cell, FieldValue, FieldValues, RawBlock};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One remote spreadsheet + worksheet pair the dashboard depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalSheet {
    /// Logical key used by consumers (e.g. `vip_my`)
    pub key: String,

    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Google spreadsheet id
    pub spreadsheet_id: String,

    /// Worksheet (tab) name; the first worksheet when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worksheet: Option<String>,

    /// Category of data this sheet provides
    pub category: Category,

    /// Per-field range overrides on top of the category template
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ranges: BTreeMap<String, String>,
}

impl LogicalSheet {
    pub fn new(
        key: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        worksheet: Option<&str>,
        category: Category,
    ) -> Self {
        Self {
            key: key.into(),
            name: None,
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.map(str::to_string),
            category,
            ranges: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the range of one field
    pub fn with_range(mut self, field: impl Into<String>, range: impl Into<String>) -> Self {
        self.ranges.insert(field.into(), range.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.key, self.category)
    }

    /// Range requests for this sheet: the category template with this sheet's
    /// overrides applied. Overrides for fields the template does not know are
    /// ignored (config validation reports them).
    pub fn range_requests(&self, template: &BTreeMap<String, String>) -> Vec<RangeRequest> {
        template
            .iter()
            .map(|(field, default_range)| {
                let range = self.ranges.get(field).unwrap_or(default_range);
                RangeRequest::new(field.clone(), range.clone())
            })
            .collect()
    }
}

/// A named cell range tagged with the logical field it represents
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RangeRequest {
    pub field: String,
    pub range: String,
}

impl RangeRequest {
    pub fn new(field: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            range: range.into(),
        }
    }
}

/// Identity of a cache entry: (logical sheet key, category)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub sheet: String,
    pub category: Category,
}

impl CacheKey {
    const SEPARATOR: &'static str = "::";

    pub fn new(sheet: impl Into<String>, category: Category) -> Self {
        Self {
            sheet: sheet.into(),
            category,
        }
    }

    /// Key string used by the backing store
    pub fn storage_key(&self) -> String {
        format!("{}{}{}", self.sheet, Self::SEPARATOR, self.category)
    }

    /// Parse a backing-store key; `None` for keys this crate did not write
    pub fn parse(raw: &str) -> Option<Self> {
        let (sheet, category) = raw.rsplit_once(Self::SEPARATOR)?;
        if sheet.is_empty() {
            return None;
        }
        Some(Self::new(sheet, category.parse().ok()?))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sheet, self.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_requests_apply_overrides() {
        let sheet = LogicalSheet::new("membership_th", "sheet-1", Some("TH"), Category::Membership)
            .with_range("membership_1", "V30")
            .with_range("membership_2", "V31")
            .with_range("not_a_field", "Z1");

        let requests = sheet.range_requests(&Category::Membership.default_ranges());
        assert_eq!(requests.len(), 3);
        assert!(requests.contains(&RangeRequest::new("total_deals", "V2")));
        assert!(requests.contains(&RangeRequest::new("membership_1", "V30")));
        assert!(requests.contains(&RangeRequest::new("membership_2", "V31")));
    }

    #[test]
    fn test_cache_key_storage_round_trip() {
        let key = CacheKey::new("vip_my", Category::Vip);
        assert_eq!(key.storage_key(), "vip_my::vip");
        assert_eq!(CacheKey::parse("vip_my::vip"), Some(key));

        // Sheet keys may themselves contain the separator
        let odd = CacheKey::new("a::b", Category::Funnel);
        assert_eq!(CacheKey::parse(&odd.storage_key()), Some(odd));
    }

    #[test]
    fn test_cache_key_parse_rejects_foreign_keys() {
        assert_eq!(CacheKey::parse("something-else"), None);
        assert_eq!(CacheKey::parse("vip_my::revenue"), None);
        assert_eq!(CacheKey::parse("::vip"), None);
    }

    #[test]
    fn test_display_name_falls_back_to_key() {
        let sheet = LogicalSheet::new("velocity_my", "sheet-2", None, Category::Velocity);
        assert_eq!(sheet.display_name(), "velocity_my");
        assert_eq!(sheet.with_name("Malaysia Sales Velocity").display_name(), "Malaysia Sales Velocity");
    }
}
