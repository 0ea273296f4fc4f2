//! Exact-code mapping table construction.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use omop_common::{open_end, open_start, parse_date};
use omop_model::UnmappedConcept;

use crate::model::{LocalCodeMapping, OrderMasterRow, VocabularyConcept};
use crate::priority::{RankTable, VocabularyPriority};

#[derive(Debug, Clone, Default)]
pub struct MappingOptions {
    pub priority: VocabularyPriority,
    pub unmapped: UnmappedConcept,
    /// Hospital id for order master rows without one.
    pub default_hospital: String,
}

/// Counters reported as stage diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub input_rows: usize,
    pub mapped: usize,
    pub unmapped: usize,
    /// Validity bounds present but not parsable as dates.
    pub unparsable_dates: usize,
    /// Rows whose `valid_from` was after `valid_to`; the bounds were swapped.
    pub inverted_intervals: usize,
    /// Rows dropped by the per-`valid_from` tie-break.
    pub collapsed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOutcome {
    /// Sorted by `(local_code, hospital_id, valid_from)`.
    pub mappings: Vec<LocalCodeMapping>,
    pub stats: BuildStats,
}

/// Keeps the best-ranked concept per `concept_code`.
///
/// Ties on rank go to the lowest `concept_id`. The output is ordered by
/// code, so applying the function to its own output changes nothing.
pub fn dedup_by_priority(
    concepts: &[VocabularyConcept],
    ranks: &RankTable,
) -> Vec<VocabularyConcept> {
    let mut best: BTreeMap<&str, &VocabularyConcept> = BTreeMap::new();
    for concept in concepts {
        let code = concept.concept_code.trim();
        let better = match best.get(code) {
            None => true,
            Some(current) => {
                (ranks.rank(&concept.vocabulary_id), concept.concept_id)
                    < (ranks.rank(&current.vocabulary_id), current.concept_id)
            }
        };
        if better {
            best.insert(code, concept);
        }
    }
    best.into_values().cloned().collect()
}

/// Builds the mapping table for exact `external_code` matches.
pub fn build_mapping_rows(
    order_master: &[OrderMasterRow],
    concepts: &[VocabularyConcept],
    options: &MappingOptions,
) -> MappingOutcome {
    let ranks = options
        .priority
        .ranks(concepts.iter().map(|c| c.vocabulary_id.as_str()));
    let deduped = dedup_by_priority(concepts, &ranks);
    let by_code: HashMap<&str, &VocabularyConcept> = deduped
        .iter()
        .map(|concept| (concept.concept_code.trim(), concept))
        .collect();

    let mut stats = BuildStats {
        input_rows: order_master.len(),
        ..BuildStats::default()
    };
    let candidates = order_master
        .iter()
        .map(|row| {
            let concept = row
                .external_code
                .as_deref()
                .and_then(|code| by_code.get(code.trim()).copied());
            candidate(
                row,
                row.external_code.clone(),
                concept,
                &ranks,
                options,
                &mut stats,
            )
        })
        .collect();
    finalize(candidates, stats)
}

/// Turns one source row into a mapping candidate with concrete bounds.
pub(crate) fn candidate(
    row: &OrderMasterRow,
    external_code: Option<String>,
    concept: Option<&VocabularyConcept>,
    ranks: &RankTable,
    options: &MappingOptions,
    stats: &mut BuildStats,
) -> LocalCodeMapping {
    let mut valid_from = bound(row.valid_from.as_deref(), open_start(), stats);
    let mut valid_to = bound(row.valid_to.as_deref(), open_end(), stats);
    if valid_from > valid_to {
        std::mem::swap(&mut valid_from, &mut valid_to);
        stats.inverted_intervals += 1;
    }
    let hospital_id = if row.hospital_id.trim().is_empty() {
        options.default_hospital.clone()
    } else {
        row.hospital_id.trim().to_string()
    };
    let base = LocalCodeMapping {
        local_code: row.local_code.trim().to_string(),
        hospital_id,
        valid_from,
        valid_to,
        external_code,
        concept_id: options.unmapped.concept_id,
        concept_name: options.unmapped.concept_name.clone(),
        vocabulary_id: None,
        domain_id: None,
        vocabulary_priority: None,
    };
    match concept {
        Some(concept) => LocalCodeMapping {
            concept_id: concept.concept_id,
            concept_name: concept.concept_name.clone(),
            vocabulary_id: Some(concept.vocabulary_id.clone()),
            domain_id: concept.domain_id.clone(),
            vocabulary_priority: Some(ranks.rank(&concept.vocabulary_id)),
            ..base
        },
        None => base,
    }
}

fn bound(raw: Option<&str>, open: NaiveDate, stats: &mut BuildStats) -> NaiveDate {
    match raw.map(str::trim) {
        None | Some("") => open,
        Some(text) => parse_date(text).unwrap_or_else(|| {
            stats.unparsable_dates += 1;
            open
        }),
    }
}

/// Keeps the first candidate per `(local_code, hospital_id, valid_from)`.
pub(crate) fn finalize(mut candidates: Vec<LocalCodeMapping>, mut stats: BuildStats) -> MappingOutcome {
    candidates.sort_by(|a, b| {
        (&a.local_code, &a.hospital_id, a.valid_from, a.priority_key(), a.concept_id)
            .cmp(&(
                &b.local_code,
                &b.hospital_id,
                b.valid_from,
                b.priority_key(),
                b.concept_id,
            ))
            .then_with(|| (a.valid_to, &a.external_code).cmp(&(b.valid_to, &b.external_code)))
    });
    let before = candidates.len();
    candidates.dedup_by(|later, kept| {
        later.local_code == kept.local_code
            && later.hospital_id == kept.hospital_id
            && later.valid_from == kept.valid_from
    });
    stats.collapsed = before - candidates.len();
    stats.mapped = candidates.iter().filter(|m| m.is_mapped()).count();
    stats.unmapped = candidates.len() - stats.mapped;
    tracing::debug!(
        rows = candidates.len(),
        mapped = stats.mapped,
        unmapped = stats.unmapped,
        collapsed = stats.collapsed,
        "built mapping table"
    );
    MappingOutcome {
        mappings: candidates,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(id: i64, code: &str, vocabulary: &str) -> VocabularyConcept {
        VocabularyConcept {
            concept_id: id,
            concept_code: code.to_string(),
            concept_name: format!("concept {id}"),
            vocabulary_id: vocabulary.to_string(),
            domain_id: Some("Drug".to_string()),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn priority_dedup_prefers_listed_vocabulary() {
        let concepts = vec![concept(10, "E1", "OLD"), concept(20, "E1", "EDI")];
        let ranks = VocabularyPriority::new(["EDI"]).ranks(["OLD", "EDI"]);
        let deduped = dedup_by_priority(&concepts, &ranks);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].concept_id, 20);
    }

    #[test]
    fn priority_dedup_breaks_rank_ties_by_concept_id() {
        let concepts = vec![concept(30, "E1", "EDI"), concept(20, "E1", "EDI")];
        let ranks = VocabularyPriority::default().ranks(["EDI"]);
        assert_eq!(dedup_by_priority(&concepts, &ranks)[0].concept_id, 20);
    }

    #[test]
    fn missing_bounds_get_sentinels_and_unmapped_rows_are_kept() {
        let rows = vec![
            OrderMasterRow::new("99213", "H1").with_external_code("E1"),
            OrderMasterRow::new("55555", "H1").with_external_code("NOPE"),
        ];
        let outcome = build_mapping_rows(&rows, &[concept(4001, "E1", "EDI")], &MappingOptions::default());
        assert_eq!(outcome.mappings.len(), 2);
        let unmapped = &outcome.mappings[0];
        assert_eq!(unmapped.local_code, "55555");
        assert_eq!(unmapped.concept_id, 0);
        assert_eq!(unmapped.concept_name, "No matching concept");
        assert!(!unmapped.is_mapped());
        let mapped = &outcome.mappings[1];
        assert_eq!(mapped.concept_id, 4001);
        assert_eq!(mapped.valid_from, ymd(1900, 1, 1));
        assert_eq!(mapped.valid_to, ymd(2099, 12, 31));
        assert_eq!(outcome.stats.mapped, 1);
        assert_eq!(outcome.stats.unmapped, 1);
    }

    #[test]
    fn same_valid_from_keeps_best_priority() {
        let rows = vec![
            OrderMasterRow::new("A", "")
                .with_external_code("LEGACY")
                .with_validity(Some("20200101"), None),
            OrderMasterRow::new("A", "")
                .with_external_code("CURRENT")
                .with_validity(Some("2020-01-01"), None),
        ];
        let concepts = vec![concept(1, "LEGACY", "KCD6"), concept(2, "CURRENT", "KCD7")];
        let outcome = build_mapping_rows(&rows, &concepts, &MappingOptions::default());
        assert_eq!(outcome.mappings.len(), 1);
        assert_eq!(outcome.mappings[0].concept_id, 2);
        assert_eq!(outcome.stats.collapsed, 1);
    }

    #[test]
    fn inverted_interval_is_swapped() {
        let rows = vec![
            OrderMasterRow::new("A", "H1")
                .with_external_code("E1")
                .with_validity(Some("2021-12-31"), Some("2021-01-01")),
        ];
        let outcome = build_mapping_rows(&rows, &[], &MappingOptions::default());
        let mapping = &outcome.mappings[0];
        assert_eq!(mapping.valid_from, ymd(2021, 1, 1));
        assert_eq!(mapping.valid_to, ymd(2021, 12, 31));
        assert_eq!(outcome.stats.inverted_intervals, 1);
    }

    #[test]
    fn unparsable_bound_counts_and_opens() {
        let rows = vec![
            OrderMasterRow::new("A", "H1").with_validity(Some("soon"), Some("2021-01-01")),
        ];
        let outcome = build_mapping_rows(&rows, &[], &MappingOptions::default());
        assert_eq!(outcome.mappings[0].valid_from, ymd(1900, 1, 1));
        assert_eq!(outcome.stats.unparsable_dates, 1);
    }

    #[test]
    fn blank_hospital_uses_default() {
        let options = MappingOptions {
            default_hospital: "H9".to_string(),
            ..MappingOptions::default()
        };
        let outcome = build_mapping_rows(&[OrderMasterRow::new("A", " ")], &[], &options);
        assert_eq!(outcome.mappings[0].hospital_id, "H9");
    }
}
