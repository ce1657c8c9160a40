//! Dashboard data categories
//!
//! Each category carries a default set of named ranges and the decode function
//! applied to every range it reads. Dispatch goes through `CATEGORY_TABLE`, so
//! adding a category means adding one enum variant and one table row.

use super::value::{decode_block, decode_first_cell, FieldValue, RawBlock};
use crate::SheetCacheError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Category of data a logical sheet provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Vip,
    Membership,
    Funnel,
    Velocity,
}

/// Decode function applied to one raw block
pub type DecodeFn = fn(&RawBlock) -> FieldValue;

/// Static description of a category
#[derive(Debug)]
pub struct CategorySpec {
    pub category: Category,
    /// Default field → range template
    pub default_ranges: &'static [(&'static str, &'static str)],
    pub decode: DecodeFn,
}

static CATEGORY_TABLE: [CategorySpec; 4] = [
    CategorySpec {
        category: Category::Vip,
        default_ranges: &[
            ("total_deals", "V2"),
            ("onsite_vip", "V28"),
            ("remote_vip", "V30"),
        ],
        decode: decode_first_cell,
    },
    CategorySpec {
        category: Category::Membership,
        default_ranges: &[
            ("total_deals", "V2"),
            ("membership_1", "V43"),
            ("membership_2", "V44"),
        ],
        decode: decode_first_cell,
    },
    CategorySpec {
        category: Category::Funnel,
        default_ranges: &[
            ("leads", "BE94"),
            ("qualified_leads", "BE95"),
            ("opportunities", "BE96"),
            ("proposals", "BE97"),
            ("negotiations", "BE98"),
            ("closed_won", "BE99"),
            ("closed_lost", "BE100"),
        ],
        decode: decode_first_cell,
    },
    CategorySpec {
        // The whole worksheet is one block; weekly rows are parsed downstream.
        category: Category::Velocity,
        default_ranges: &[("weekly_data", "A:Z")],
        decode: decode_block,
    },
];

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Vip,
        Category::Membership,
        Category::Funnel,
        Category::Velocity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Vip => "vip",
            Category::Membership => "membership",
            Category::Funnel => "funnel",
            Category::Velocity => "velocity",
        }
    }

    pub fn spec(&self) -> &'static CategorySpec {
        let index = match self {
            Category::Vip => 0,
            Category::Membership => 1,
            Category::Funnel => 2,
            Category::Velocity => 3,
        };
        &CATEGORY_TABLE[index]
    }

    /// The built-in field → range template as an owned map
    pub fn default_ranges(&self) -> BTreeMap<String, String> {
        self.spec()
            .default_ranges
            .iter()
            .map(|(field, range)| (field.to_string(), range.to_string()))
            .collect()
    }

    pub fn decode(&self, block: &RawBlock) -> FieldValue {
        (self.spec().decode)(block)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SheetCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vip" => Ok(Category::Vip),
            "membership" => Ok(Category::Membership),
            "funnel" => Ok(Category::Funnel),
            "velocity" => Ok(Category::Velocity),
            other => Err(SheetCacheError::UnknownCategory(other.to_string())),
        }
    }
}

/// Default category → ranges mapping used when configuration does not override it
pub fn default_category_ranges() -> BTreeMap<Category, BTreeMap<String, String>> {
    Category::ALL
        .iter()
        .map(|c| (*c, c.default_ranges()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_rows_match_variants() {
        for category in Category::ALL {
            assert_eq!(category.spec().category, category);
            assert!(!category.spec().default_ranges.is_empty());
        }
    }

    #[test]
    fn test_from_str_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!(" VIP ".parse::<Category>().unwrap(), Category::Vip);
        assert!("revenue".parse::<Category>().is_err());
    }

    #[test]
    fn test_decode_dispatch() {
        let block = vec![vec!["12".to_string()], vec!["13".to_string()]];
        assert_eq!(Category::Vip.decode(&block), FieldValue::Number(12.0));
        assert!(matches!(Category::Velocity.decode(&block), FieldValue::Table(rows) if rows.len() == 2));
    }

    #[test]
    fn test_default_ranges() {
        let funnel = Category::Funnel.default_ranges();
        assert_eq!(funnel.len(), 7);
        assert_eq!(funnel["closed_lost"], "BE100");
        assert_eq!(default_category_ranges().len(), 4);
    }
}
