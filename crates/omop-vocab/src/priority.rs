use std::collections::{BTreeSet, HashMap};

/// Configured vocabulary preference, highest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabularyPriority {
    preferred: Vec<String>,
}

impl VocabularyPriority {
    pub fn new<I, S>(preferred: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            preferred: preferred.into_iter().map(Into::into).collect(),
        }
    }

    /// Ranks every vocabulary seen in a concept table.
    ///
    /// Listed vocabularies take ranks `1..=n` in list order. The others
    /// follow, ordered by `vocabulary_id` descending.
    pub fn ranks<'a, I>(&self, vocabularies: I) -> RankTable
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ranks = HashMap::new();
        let mut next = 1u32;
        for name in &self.preferred {
            let key = name.trim().to_ascii_uppercase();
            if !ranks.contains_key(&key) {
                ranks.insert(key, next);
                next += 1;
            }
        }
        let unlisted: BTreeSet<String> = vocabularies
            .into_iter()
            .map(|name| name.trim().to_ascii_uppercase())
            .filter(|key| !ranks.contains_key(key))
            .collect();
        for key in unlisted.into_iter().rev() {
            ranks.insert(key, next);
            next += 1;
        }
        RankTable { ranks, next }
    }
}

/// Vocabulary id to rank, 1 being preferred.
#[derive(Debug, Clone)]
pub struct RankTable {
    ranks: HashMap<String, u32>,
    next: u32,
}

impl RankTable {
    /// Vocabularies unseen when the table was built rank last.
    pub fn rank(&self, vocabulary_id: &str) -> u32 {
        self.ranks
            .get(&vocabulary_id.trim().to_ascii_uppercase())
            .copied()
            .unwrap_or(self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_before_unlisted_descending() {
        let priority = VocabularyPriority::new(["EDI"]);
        let ranks = priority.ranks(["KCD7", "EDI", "ATC", "LOINC"]);
        assert_eq!(ranks.rank("EDI"), 1);
        assert_eq!(ranks.rank("LOINC"), 2);
        assert_eq!(ranks.rank("KCD7"), 3);
        assert_eq!(ranks.rank("ATC"), 4);
        assert_eq!(ranks.rank("SNOMED"), 5);
    }

    #[test]
    fn empty_list_falls_back_to_descending_ids() {
        let ranks = VocabularyPriority::default().ranks(["KCD6", "KCD7"]);
        assert!(ranks.rank("kcd7") < ranks.rank("KCD6"));
    }
}
