//! Maps a composite RFM score to a customer segment label.
//!
//! Rules are evaluated top-down and the first rule whose `min_score` the
//! score reaches wins. The default table is the standard five-tier split;
//! `rfm.toml` can replace it with its own `[[segments]]`.

use crate::error::{Result, RfmError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MIN_RFM_SCORE: u8 = 3;
pub const MAX_RFM_SCORE: u8 = 12;

pub const BEST_CUSTOMERS: &str = "Best Customers";
pub const LOYAL_CUSTOMERS: &str = "Loyal Customers";
pub const POTENTIAL_LOYALIST: &str = "Potential Loyalist";
pub const AT_RISK: &str = "At Risk";
pub const LOST_CUSTOMERS: &str = "Lost Customers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRule {
    pub min_score: u8,
    pub label: String,
}

impl SegmentRule {
    pub fn new(min_score: u8, label: impl Into<String>) -> Self {
        Self {
            min_score,
            label: label.into(),
        }
    }
}

/// Validated, ordered threshold table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTable {
    rules: Vec<SegmentRule>,
}

impl Default for SegmentTable {
    fn default() -> Self {
        Self {
            rules: vec![
                SegmentRule::new(10, BEST_CUSTOMERS),
                SegmentRule::new(8, LOYAL_CUSTOMERS),
                SegmentRule::new(6, POTENTIAL_LOYALIST),
                SegmentRule::new(4, AT_RISK),
                SegmentRule::new(MIN_RFM_SCORE, LOST_CUSTOMERS),
            ],
        }
    }
}

impl SegmentTable {
    /// Build a table, checking that it covers every score from
    /// `MIN_RFM_SCORE` upward without overlapping rules.
    pub fn new(rules: Vec<SegmentRule>) -> Result<Self> {
        let Some(last) = rules.last() else {
            return Err(RfmError::Config("segment table is empty".to_string()));
        };
        if last.min_score > MIN_RFM_SCORE {
            return Err(RfmError::Config(format!(
                "last segment `{}` starts at {} but scores go down to {}",
                last.label, last.min_score, MIN_RFM_SCORE
            )));
        }
        for pair in rules.windows(2) {
            if pair[0].min_score <= pair[1].min_score {
                return Err(RfmError::Config(format!(
                    "segment thresholds must strictly decrease (`{}` = {}, `{}` = {})",
                    pair[0].label, pair[0].min_score, pair[1].label, pair[1].min_score
                )));
            }
        }
        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.label.trim().is_empty() {
                return Err(RfmError::Config("segment label is empty".to_string()));
            }
            if !seen.insert(rule.label.as_str()) {
                return Err(RfmError::Config(format!(
                    "duplicate segment label `{}`",
                    rule.label
                )));
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[SegmentRule] {
        &self.rules
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.label.as_str())
    }

    pub fn label_for(&self, score: u8) -> &str {
        self.rules
            .iter()
            .find(|r| score >= r.min_score)
            .or(self.rules.last())
            .map(|r| r.label.as_str())
            .unwrap_or(LOST_CUSTOMERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundaries() {
        let table = SegmentTable::default();
        assert_eq!(table.label_for(12), BEST_CUSTOMERS);
        assert_eq!(table.label_for(10), BEST_CUSTOMERS);
        assert_eq!(table.label_for(9), LOYAL_CUSTOMERS);
        assert_eq!(table.label_for(8), LOYAL_CUSTOMERS);
        assert_eq!(table.label_for(7), POTENTIAL_LOYALIST);
        assert_eq!(table.label_for(6), POTENTIAL_LOYALIST);
        assert_eq!(table.label_for(5), AT_RISK);
        assert_eq!(table.label_for(4), AT_RISK);
        assert_eq!(table.label_for(3), LOST_CUSTOMERS);
    }

    #[test]
    fn every_label_is_reachable() {
        let table = SegmentTable::default();
        let hit: HashSet<&str> = (MIN_RFM_SCORE..=MAX_RFM_SCORE)
            .map(|s| table.label_for(s))
            .collect();
        assert_eq!(hit.len(), 5);
    }

    #[test]
    fn rejects_gap_at_bottom() {
        let rules = vec![SegmentRule::new(10, "Top"), SegmentRule::new(4, "Rest")];
        assert!(SegmentTable::new(rules).is_err());
    }

    #[test]
    fn rejects_unsorted_and_duplicates() {
        let unsorted = vec![SegmentRule::new(4, "A"), SegmentRule::new(8, "B")];
        assert!(SegmentTable::new(unsorted).is_err());
        let dup = vec![SegmentRule::new(8, "A"), SegmentRule::new(3, "A")];
        assert!(SegmentTable::new(dup).is_err());
        assert!(SegmentTable::new(Vec::new()).is_err());
    }

    #[test]
    fn custom_table_moves_boundaries() {
        let table = SegmentTable::new(vec![
            SegmentRule::new(11, "VIP"),
            SegmentRule::new(0, "Regular"),
        ])
        .unwrap();
        assert_eq!(table.label_for(11), "VIP");
        assert_eq!(table.label_for(10), "Regular");
        assert_eq!(table.label_for(3), "Regular");
    }

    proptest! {
        #[test]
        fn default_table_is_total_and_monotone(score in MIN_RFM_SCORE..=MAX_RFM_SCORE) {
            let table = SegmentTable::default();
            let label = table.label_for(score);
            let matching: Vec<&SegmentRule> = table
                .rules()
                .iter()
                .filter(|r| r.label == label)
                .collect();
            prop_assert_eq!(matching.len(), 1);
            prop_assert!(score >= matching[0].min_score);
            // no higher rule also matches
            for rule in table.rules().iter().take_while(|r| r.label != label) {
                prop_assert!(score < rule.min_score);
            }
        }
    }
}
