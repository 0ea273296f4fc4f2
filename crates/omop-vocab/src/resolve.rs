//! Temporal resolution of clinical events against the mapping table.

use std::collections::HashMap;

use omop_model::UnmappedConcept;

use crate::model::{ClinicalEvent, LocalCodeMapping};

/// Mapping rows indexed by `(local_code, hospital_id)`.
///
/// Intervals under one key are ordered by
/// `(valid_from, vocabulary_priority, concept_id)`; the first interval that
/// covers an event's date is the resolution.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    index: HashMap<(String, String), Vec<LocalCodeMapping>>,
    len: usize,
}

impl MappingTable {
    pub fn new(mappings: Vec<LocalCodeMapping>) -> Self {
        let len = mappings.len();
        let mut index: HashMap<(String, String), Vec<LocalCodeMapping>> = HashMap::new();
        for mapping in mappings {
            index
                .entry((mapping.local_code.clone(), mapping.hospital_id.clone()))
                .or_default()
                .push(mapping);
        }
        for intervals in index.values_mut() {
            intervals.sort_by_key(|m| (m.valid_from, m.priority_key(), m.concept_id));
        }
        Self { index, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn intervals(&self, local_code: &str, hospital_id: &str) -> &[LocalCodeMapping] {
        self.index
            .get(&(local_code.to_string(), hospital_id.to_string()))
            .map_or(&[], Vec::as_slice)
    }
}

/// Outcome of resolving one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Exactly one interval covers the event date.
    Matched(&'a LocalCodeMapping),
    /// Several intervals overlap on the event date; the first in
    /// `(valid_from, vocabulary_priority, concept_id)` order was taken.
    Ambiguous {
        chosen: &'a LocalCodeMapping,
        candidates: usize,
    },
    /// No interval covers the event date.
    Unmapped,
}

impl<'a> Resolution<'a> {
    pub fn mapping(&self) -> Option<&'a LocalCodeMapping> {
        match *self {
            Resolution::Matched(mapping) | Resolution::Ambiguous { chosen: mapping, .. } => {
                Some(mapping)
            }
            Resolution::Unmapped => None,
        }
    }

    /// The concept to write; never absent.
    pub fn concept_id(&self, unmapped: &UnmappedConcept) -> i64 {
        self.mapping()
            .map_or(unmapped.concept_id, |mapping| mapping.concept_id)
    }
}

/// Resolves an event to the mapping active on its date.
pub fn resolve_event<'a>(event: &ClinicalEvent<'_>, table: &'a MappingTable) -> Resolution<'a> {
    let intervals = table.intervals(event.local_code.trim(), event.hospital_id.trim());
    // Intervals starting after the event date cannot cover it.
    let started = intervals.partition_point(|m| m.valid_from <= event.event_date);
    let mut covering = intervals[..started]
        .iter()
        .filter(|m| event.event_date <= m.valid_to);
    let Some(first) = covering.next() else {
        return Resolution::Unmapped;
    };
    let others = covering.count();
    if others == 0 {
        Resolution::Matched(first)
    } else {
        Resolution::Ambiguous {
            chosen: first,
            candidates: others + 1,
        }
    }
}

/// Per-stage resolution counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub matched: usize,
    pub ambiguous: usize,
    pub unmapped: usize,
    /// Unmapped events removed by an inner join.
    pub dropped: usize,
}

impl ResolutionStats {
    pub fn record(&mut self, resolution: &Resolution<'_>) {
        match resolution {
            Resolution::Matched(_) => self.matched += 1,
            Resolution::Ambiguous { .. } => self.ambiguous += 1,
            Resolution::Unmapped => self.unmapped += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mapping(code: &str, from: NaiveDate, to: NaiveDate, concept_id: i64) -> LocalCodeMapping {
        LocalCodeMapping {
            local_code: code.to_string(),
            hospital_id: "H1".to_string(),
            valid_from: from,
            valid_to: to,
            external_code: None,
            concept_id,
            concept_name: String::new(),
            vocabulary_id: Some("EDI".to_string()),
            domain_id: None,
            vocabulary_priority: Some(1),
        }
    }

    fn event(code: &str, date: NaiveDate) -> ClinicalEvent<'_> {
        ClinicalEvent {
            local_code: code,
            hospital_id: "H1",
            event_date: date,
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        let table = MappingTable::new(vec![mapping("A", ymd(2020, 1, 1), ymd(2020, 12, 31), 5)]);
        for date in [ymd(2020, 1, 1), ymd(2020, 12, 31)] {
            assert_eq!(resolve_event(&event("A", date), &table).concept_id(&UnmappedConcept::default()), 5);
        }
        assert_eq!(resolve_event(&event("A", ymd(2019, 12, 31)), &table), Resolution::Unmapped);
    }

    #[test]
    fn hospital_is_part_of_the_key() {
        let table = MappingTable::new(vec![mapping("A", ymd(2020, 1, 1), ymd(2020, 12, 31), 5)]);
        let other = ClinicalEvent {
            local_code: "A",
            hospital_id: "H2",
            event_date: ymd(2020, 6, 1),
        };
        assert_eq!(resolve_event(&other, &table), Resolution::Unmapped);
    }

    #[test]
    fn overlap_takes_earliest_interval_and_flags_it() {
        let table = MappingTable::new(vec![
            mapping("A", ymd(2020, 6, 1), ymd(2099, 12, 31), 8),
            mapping("A", ymd(2020, 1, 1), ymd(2020, 12, 31), 7),
        ]);
        let resolution = resolve_event(&event("A", ymd(2020, 7, 1)), &table);
        match resolution {
            Resolution::Ambiguous { chosen, candidates } => {
                assert_eq!(chosen.concept_id, 7);
                assert_eq!(candidates, 2);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
        assert_eq!(
            resolve_event(&event("A", ymd(2021, 1, 1)), &table).concept_id(&UnmappedConcept::default()),
            8
        );
    }

    #[test]
    fn stats_count_each_outcome() {
        let mut stats = ResolutionStats::default();
        stats.record(&Resolution::Unmapped);
        stats.record(&Resolution::Unmapped);
        assert_eq!(stats.unmapped, 2);
        assert_eq!(stats.matched, 0);
    }
}
