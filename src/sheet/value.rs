//! Decoded cell values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A raw block of cells as returned by the transport, row-major.
pub type RawBlock = Vec<Vec<String>>;

/// Decoded field → value mapping for one logical sheet
pub type FieldValues = BTreeMap<String, FieldValue>;

/// The decoded content of one named range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// A numeric cell (thousands separators stripped)
    Number(f64),
    /// A non-numeric cell
    Text(String),
    /// The range came back with no data
    Empty,
    /// A multi-cell block kept as rows
    Table(RawBlock),
}

impl FieldValue {
    /// Parse a single formatted cell.
    ///
    /// `"1,234"` becomes `Number(1234.0)`, blank cells become `Empty`, and
    /// anything else is kept verbatim as `Text`.
    pub fn parse_cell(cell: &str) -> Self {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return FieldValue::Empty;
        }

        let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
        match cleaned.parse::<f64>() {
            Ok(n) if n.is_finite() => FieldValue::Number(n),
            _ => FieldValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&RawBlock> {
        match self {
            FieldValue::Table(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Table(rows) => rows.iter().all(|r| r.is_empty()),
            _ => false,
        }
    }
}

/// Decode the top-left cell of a block.
pub fn decode_first_cell(block: &RawBlock) -> FieldValue {
    match block.first().and_then(|row| row.first()) {
        Some(cell) => FieldValue::parse_cell(cell),
        None => FieldValue::Empty,
    }
}

/// Keep the whole block, dropping trailing rows that are entirely blank.
pub fn decode_block(block: &RawBlock) -> FieldValue {
    let mut rows = block.clone();
    while rows
        .last()
        .is_some_and(|row| row.iter().all(|cell| cell.trim().is_empty()))
    {
        rows.pop();
    }

    if rows.is_empty() {
        FieldValue::Empty
    } else {
        FieldValue::Table(rows)
    }
}
