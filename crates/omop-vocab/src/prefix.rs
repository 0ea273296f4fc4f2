//! Hierarchical (longest-prefix) matching for diagnosis codes.

use std::collections::HashMap;

use crate::mapping::{BuildStats, MappingOptions, MappingOutcome, candidate, finalize};
use crate::model::{OrderMasterRow, VocabularyConcept};
use crate::priority::RankTable;

/// Canonical form used on both sides of a prefix match: trimmed, uppercase,
/// without dots (`a12.3` and `A123` are the same code).
pub fn normalize_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Concepts keyed by normalized code, one per code after priority dedup.
#[derive(Debug, Clone)]
pub struct ConceptIndex {
    by_code: HashMap<String, VocabularyConcept>,
}

impl ConceptIndex {
    pub fn new(concepts: &[VocabularyConcept], ranks: &RankTable) -> Self {
        let mut by_code: HashMap<String, VocabularyConcept> = HashMap::new();
        for concept in concepts {
            let key = normalize_code(&concept.concept_code);
            if key.is_empty() {
                continue;
            }
            let replace = match by_code.get(&key) {
                None => true,
                Some(current) => {
                    (ranks.rank(&concept.vocabulary_id), concept.concept_id)
                        < (ranks.rank(&current.vocabulary_id), current.concept_id)
                }
            };
            if replace {
                by_code.insert(key, concept.clone());
            }
        }
        Self { by_code }
    }

    pub fn get(&self, normalized: &str) -> Option<&VocabularyConcept> {
        self.by_code.get(normalized)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Finds the concept whose code is the longest prefix of `diagnosis_code`.
///
/// Returns `None` for an empty code or when no prefix of any length is
/// indexed.
pub fn match_diagnosis_prefix<'a>(
    diagnosis_code: &str,
    index: &'a ConceptIndex,
) -> Option<&'a VocabularyConcept> {
    let code = normalize_code(diagnosis_code);
    if code.is_empty() {
        return None;
    }
    let mut ends: Vec<usize> = code.char_indices().map(|(idx, _)| idx).skip(1).collect();
    ends.push(code.len());
    ends.iter().rev().find_map(|end| index.get(&code[..*end]))
}

/// Builds the mapping table by longest-prefix match.
///
/// Each row is matched on its `external_code` when present, otherwise on its
/// `local_code`.
pub fn build_prefix_mapping_rows(
    codes: &[OrderMasterRow],
    concepts: &[VocabularyConcept],
    options: &MappingOptions,
) -> MappingOutcome {
    let ranks = options
        .priority
        .ranks(concepts.iter().map(|c| c.vocabulary_id.as_str()));
    let index = ConceptIndex::new(concepts, &ranks);
    let mut stats = BuildStats {
        input_rows: codes.len(),
        ..BuildStats::default()
    };
    let candidates = codes
        .iter()
        .map(|row| {
            let code = row.external_code.as_deref().unwrap_or(&row.local_code);
            let concept = match_diagnosis_prefix(code, &index);
            let external_code = concept.map(|c| c.concept_code.clone());
            candidate(row, external_code, concept, &ranks, options, &mut stats)
        })
        .collect();
    finalize(candidates, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::VocabularyPriority;

    fn concept(id: i64, code: &str) -> VocabularyConcept {
        VocabularyConcept {
            concept_id: id,
            concept_code: code.to_string(),
            concept_name: code.to_string(),
            vocabulary_id: "KCD7".to_string(),
            domain_id: Some("Condition".to_string()),
        }
    }

    fn index(concepts: &[VocabularyConcept]) -> ConceptIndex {
        let ranks = VocabularyPriority::default().ranks(["KCD7"]);
        ConceptIndex::new(concepts, &ranks)
    }

    #[test]
    fn longest_available_prefix_wins() {
        let index = index(&[concept(1, "A1"), concept(2, "A12"), concept(3, "B123X")]);
        let found = match_diagnosis_prefix("A123X", &index).unwrap();
        assert_eq!(found.concept_code, "A12");
    }

    #[test]
    fn dotted_codes_normalize() {
        let index = index(&[concept(1, "J45.9")]);
        assert_eq!(match_diagnosis_prefix("j459", &index).unwrap().concept_id, 1);
        assert_eq!(match_diagnosis_prefix(" J45.90 ", &index).unwrap().concept_id, 1);
    }

    #[test]
    fn no_prefix_or_empty_code_is_none() {
        let index = index(&[concept(1, "A12")]);
        assert!(match_diagnosis_prefix("B20", &index).is_none());
        assert!(match_diagnosis_prefix("", &index).is_none());
        assert!(match_diagnosis_prefix(" . ", &index).is_none());
    }

    #[test]
    fn prefix_table_records_matched_code() {
        let rows = vec![OrderMasterRow::new("A123X", "H1"), OrderMasterRow::new("Z99", "H1")];
        let outcome =
            build_prefix_mapping_rows(&rows, &[concept(7, "A12")], &MappingOptions::default());
        assert_eq!(outcome.mappings.len(), 2);
        assert_eq!(outcome.mappings[0].local_code, "A123X");
        assert_eq!(outcome.mappings[0].external_code.as_deref(), Some("A12"));
        assert_eq!(outcome.mappings[0].concept_id, 7);
        assert_eq!(outcome.mappings[1].concept_id, 0);
        assert_eq!(outcome.mappings[1].external_code, None);
    }
}
