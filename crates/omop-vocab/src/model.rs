use chrono::NaiveDate;

/// One order master (or diagnosis code) row before resolution.
///
/// Validity bounds are kept as raw text; they are parsed and defaulted while
/// the mapping table is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMasterRow {
    pub local_code: String,
    pub hospital_id: String,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub external_code: Option<String>,
}

impl OrderMasterRow {
    pub fn new(local_code: impl Into<String>, hospital_id: impl Into<String>) -> Self {
        Self {
            local_code: local_code.into(),
            hospital_id: hospital_id.into(),
            valid_from: None,
            valid_to: None,
            external_code: None,
        }
    }

    pub fn with_external_code(mut self, code: impl Into<String>) -> Self {
        self.external_code = Some(code.into());
        self
    }

    pub fn with_validity(mut self, from: Option<&str>, to: Option<&str>) -> Self {
        self.valid_from = from.map(str::to_string);
        self.valid_to = to.map(str::to_string);
        self
    }
}

/// A row of the vocabulary `CONCEPT` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyConcept {
    pub concept_id: i64,
    /// The code the order master refers to as `external_code`.
    pub concept_code: String,
    pub concept_name: String,
    pub vocabulary_id: String,
    pub domain_id: Option<String>,
}

/// A binding of a local code to a concept over an inclusive date interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCodeMapping {
    pub local_code: String,
    pub hospital_id: String,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub external_code: Option<String>,
    /// The configured unmapped concept id when no vocabulary row matched.
    pub concept_id: i64,
    pub concept_name: String,
    pub vocabulary_id: Option<String>,
    pub domain_id: Option<String>,
    /// Rank of `vocabulary_id`, 1 being preferred; `None` when unmapped.
    pub vocabulary_priority: Option<u32>,
}

impl LocalCodeMapping {
    pub fn is_mapped(&self) -> bool {
        self.vocabulary_priority.is_some()
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_to
    }

    /// Sort key shared by every tie-break: mapped rows first, then by rank.
    pub(crate) fn priority_key(&self) -> u32 {
        self.vocabulary_priority.unwrap_or(u32::MAX)
    }
}

/// The part of a clinical row that takes part in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicalEvent<'a> {
    pub local_code: &'a str,
    pub hospital_id: &'a str,
    pub event_date: NaiveDate,
}
