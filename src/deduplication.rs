// 🔍 Deduplication Engine - Detect repeated emission rows
// Exact match only: same period, same entity, same measure

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::loader::EmissionRecord;

// ============================================================================
// DUPLICATE MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    /// Index of the first occurrence (kept)
    pub original_index: usize,

    /// Index of the repeated row (dropped)
    pub duplicate_index: usize,

    /// Human-readable reason
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct DeduplicationOutcome {
    pub records: Vec<EmissionRecord>,
    pub matches: Vec<DuplicateMatch>,
}

impl DeduplicationOutcome {
    pub fn removed(&self) -> usize {
        self.matches.len()
    }
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

/// Key compared for an exact match. The measure is compared bit-for-bit so
/// two missing cells match each other and 0.0 never matches -0.0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey<'a> {
    period: NaiveDate,
    entity: &'a str,
    emissions: Option<u64>,
}

impl<'a> RecordKey<'a> {
    fn of(record: &'a EmissionRecord) -> Self {
        RecordKey {
            period: record.period,
            entity: &record.entity,
            emissions: record.emissions.map(f64::to_bits),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeduplicationEngine;

impl DeduplicationEngine {
    pub fn new() -> Self {
        DeduplicationEngine
    }

    /// Every repeated row, paired with the first row it repeats
    pub fn find_duplicates(&self, records: &[EmissionRecord]) -> Vec<DuplicateMatch> {
        let mut first_seen: HashMap<RecordKey<'_>, usize> = HashMap::with_capacity(records.len());
        let mut matches = Vec::new();

        for (idx, record) in records.iter().enumerate() {
            let key = RecordKey::of(record);
            match first_seen.get(&key) {
                Some(&original_index) => matches.push(DuplicateMatch {
                    original_index,
                    duplicate_index: idx,
                    reason: format!(
                        "Exact match: {} | {} | {}",
                        record.year(),
                        record.entity,
                        record
                            .emissions
                            .map(|v| format!("{:.4}", v))
                            .unwrap_or_else(|| "missing".to_string())
                    ),
                }),
                None => {
                    first_seen.insert(key, idx);
                }
            }
        }

        matches
    }

    /// Drop repeated rows, keeping the first occurrence and the original order
    pub fn deduplicate(&self, records: Vec<EmissionRecord>) -> DeduplicationOutcome {
        let matches = self.find_duplicates(&records);
        if matches.is_empty() {
            return DeduplicationOutcome { records, matches };
        }

        let mut drop = vec![false; records.len()];
        for m in &matches {
            drop[m.duplicate_index] = true;
        }

        let kept = records
            .into_iter()
            .zip(drop)
            .filter(|(_, dropped)| !dropped)
            .map(|(record, _)| record)
            .collect();

        DeduplicationOutcome {
            records: kept,
            matches,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let engine = DeduplicationEngine::new();
        let records = vec![
            EmissionRecord::new(2000, "Chevron", Some(45.5)),
            EmissionRecord::new(2000, "Chevron", Some(45.5)),
        ];

        let matches = engine.find_duplicates(&records);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].original_index, 0);
        assert_eq!(matches[0].duplicate_index, 1);
        assert!(matches[0].reason.contains("Chevron"));
    }

    #[test]
    fn test_different_value_or_year_is_not_duplicate() {
        let engine = DeduplicationEngine::new();
        let records = vec![
            EmissionRecord::new(2000, "Chevron", Some(45.5)),
            EmissionRecord::new(2000, "Chevron", Some(45.6)),
            EmissionRecord::new(2001, "Chevron", Some(45.5)),
            EmissionRecord::new(2000, "BP", Some(45.5)),
        ];

        assert!(engine.find_duplicates(&records).is_empty());
    }

    #[test]
    fn test_missing_values_match_each_other() {
        let engine = DeduplicationEngine::new();
        let records = vec![
            EmissionRecord::new(2000, "Shell", None),
            EmissionRecord::new(2000, "Shell", None),
        ];

        assert_eq!(engine.find_duplicates(&records).len(), 1);
    }

    #[test]
    fn test_deduplicate_keeps_first_and_order() {
        let engine = DeduplicationEngine::new();
        let records = vec![
            EmissionRecord::new(2000, "A", Some(1.0)),
            EmissionRecord::new(2000, "B", Some(2.0)),
            EmissionRecord::new(2000, "A", Some(1.0)),
            EmissionRecord::new(2001, "C", Some(3.0)),
            EmissionRecord::new(2000, "A", Some(1.0)),
        ];

        let outcome = engine.deduplicate(records);

        assert_eq!(outcome.removed(), 2);
        let entities: Vec<&str> = outcome.records.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(entities, vec!["A", "B", "C"]);
    }
}
