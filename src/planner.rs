//! Batch planning
//!
//! Turns the named ranges a logical sheet needs into a single batched read.
//! One plan per sheet per fetch cycle, one transport call per plan.

use crate::sheet::{Category, FieldValues, LogicalSheet, RangeRequest, RawBlock};
use std::collections::BTreeMap;

/// All ranges of one logical sheet, retrieved by one transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    sheet: String,
    spreadsheet_id: String,
    worksheet: Option<String>,
    requests: Vec<RangeRequest>,
}

impl BatchPlan {
    /// Logical key of the sheet this plan belongs to
    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn worksheet(&self) -> Option<&str> {
        self.worksheet.as_deref()
    }

    pub fn requests(&self) -> &[RangeRequest] {
        &self.requests
    }

    /// Range addresses in plan order, as sent to the transport
    pub fn ranges(&self) -> Vec<String> {
        self.requests.iter().map(|r| r.range.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Pair the transport's blocks with the plan's fields and decode them.
    ///
    /// The transport must answer with one block per planned range, in plan
    /// order. Anything else is a malformed response.
    pub fn decode(&self, blocks: &[RawBlock], category: Category) -> Result<FieldValues, String> {
        if blocks.len() != self.requests.len() {
            return Err(format!(
                "expected {} ranges in response, got {}",
                self.requests.len(),
                blocks.len()
            ));
        }

        Ok(self
            .requests
            .iter()
            .zip(blocks)
            .map(|(request, block)| (request.field.clone(), category.decode(block)))
            .collect())
    }
}

/// Builds batch plans
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchPlanner;

impl BatchPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Plan one batched read for `sheet`.
    ///
    /// Requests are ordered by field name so the plan does not depend on the
    /// order they were supplied in. A field named twice keeps its last range.
    /// Overlapping addresses stay separate entries.
    pub fn plan(
        &self,
        sheet: &LogicalSheet,
        requests: impl IntoIterator<Item = RangeRequest>,
    ) -> BatchPlan {
        let mut by_field: BTreeMap<String, RangeRequest> = BTreeMap::new();
        for request in requests {
            if let Some(previous) = by_field.insert(request.field.clone(), request) {
                tracing::warn!(
                    sheet = %sheet.key,
                    field = %previous.field,
                    dropped = %previous.range,
                    kept = %by_field[&previous.field].range,
                    "Field requested twice, keeping the last range"
                );
            }
        }

        let plan = BatchPlan {
            sheet: sheet.key.clone(),
            spreadsheet_id: sheet.spreadsheet_id.clone(),
            worksheet: sheet.worksheet.clone(),
            requests: by_field.into_values().collect(),
        };
        tracing::trace!(sheet = %sheet.key, ranges = plan.len(), "Planned batch read");
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::FieldValue;

    fn sheet() -> LogicalSheet {
        LogicalSheet::new("funnel_my", "sheet-1", Some("MY"), Category::Funnel)
    }

    fn cell(s: &str) -> RawBlock {
        vec![vec![s.to_string()]]
    }

    #[test]
    fn test_every_request_appears_exactly_once() {
        let requests = sheet().range_requests(&Category::Funnel.default_ranges());
        let plan = BatchPlanner::new().plan(&sheet(), requests.clone());

        assert_eq!(plan.len(), requests.len());
        for request in &requests {
            assert_eq!(plan.requests().iter().filter(|r| *r == request).count(), 1);
        }
        assert_eq!(plan.sheet(), "funnel_my");
        assert_eq!(plan.worksheet(), Some("MY"));
    }

    #[test]
    fn test_plan_independent_of_input_order() {
        let requests = vec![
            RangeRequest::new("b", "B1"),
            RangeRequest::new("c", "C1"),
            RangeRequest::new("a", "A1"),
        ];
        let mut reversed = requests.clone();
        reversed.reverse();

        let planner = BatchPlanner::new();
        let first = planner.plan(&sheet(), requests);
        let second = planner.plan(&sheet(), reversed);
        assert_eq!(first, second);
        assert_eq!(first.ranges(), vec!["A1", "B1", "C1"]);
    }

    #[test]
    fn test_overlapping_ranges_stay_independent() {
        let plan = BatchPlanner::new().plan(
            &sheet(),
            vec![
                RangeRequest::new("block", "A1:B2"),
                RangeRequest::new("corner", "A1"),
            ],
        );
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_duplicate_field_last_wins() {
        crate::logging::init_test();
        let plan = BatchPlanner::new().plan(
            &sheet(),
            vec![RangeRequest::new("x", "A1"), RangeRequest::new("x", "B1")],
        );
        assert_eq!(plan.requests(), &[RangeRequest::new("x", "B1")]);
    }

    #[test]
    fn test_empty_plan() {
        let plan = BatchPlanner::new().plan(&sheet(), Vec::new());
        assert!(plan.is_empty());
        assert!(plan.ranges().is_empty());
    }

    #[test]
    fn test_decode_pairs_fields_with_blocks() {
        let plan = BatchPlanner::new().plan(
            &sheet(),
            vec![RangeRequest::new("leads", "BE94"), RangeRequest::new("closed_won", "BE99")],
        );
        // plan order: closed_won, leads
        let values = plan
            .decode(&[cell("12"), cell("1,500")], Category::Funnel)
            .unwrap();
        assert_eq!(values["closed_won"], FieldValue::Number(12.0));
        assert_eq!(values["leads"], FieldValue::Number(1500.0));
    }

    #[test]
    fn test_decode_rejects_wrong_block_count() {
        let plan = BatchPlanner::new().plan(&sheet(), vec![RangeRequest::new("leads", "BE94")]);
        assert!(plan.decode(&[], Category::Funnel).is_err());
        assert!(plan.decode(&[cell("1"), cell("2")], Category::Funnel).is_err());
    }
}
