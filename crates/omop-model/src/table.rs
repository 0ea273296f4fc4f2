//! CDM tables produced by the ETL and their fixed column layouts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{JoinMode, MappingStrategy};

/// A CDM table (or local code mapping table) produced by one stage.
///
/// Variants are declared in dependency order; the scheduler uses this order
/// to break ties between independent stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CdmTable {
    CareSite,
    Location,
    Provider,
    Person,
    VisitOccurrence,
    VisitDetail,
    LocalEdi,
    LocalKcd,
    ConditionOccurrence,
    DrugExposure,
    Measurement,
    ProcedureOccurrence,
    ObservationPeriod,
}

const LOCATION_COLUMNS: &[&str] = &[
    "location_id",
    "address_1",
    "address_2",
    "city",
    "state",
    "zip",
    "county",
    "location_source_value",
];

const CARE_SITE_COLUMNS: &[&str] = &[
    "care_site_id",
    "care_site_name",
    "place_of_service_concept_id",
    "location_id",
    "care_site_source_value",
    "place_of_service_source_value",
];

const PROVIDER_COLUMNS: &[&str] = &[
    "provider_id",
    "provider_name",
    "npi",
    "dea",
    "specialty_concept_id",
    "care_site_id",
    "year_of_birth",
    "gender_concept_id",
    "provider_source_value",
    "specialty_source_value",
    "specialty_source_concept_id",
    "gender_source_value",
    "gender_source_concept_id",
];

const PERSON_COLUMNS: &[&str] = &[
    "person_id",
    "gender_concept_id",
    "year_of_birth",
    "month_of_birth",
    "day_of_birth",
    "birth_datetime",
    "race_concept_id",
    "ethnicity_concept_id",
    "location_id",
    "provider_id",
    "care_site_id",
    "person_source_value",
    "gender_source_value",
    "gender_source_concept_id",
    "race_source_value",
    "race_source_concept_id",
    "ethnicity_source_value",
    "ethnicity_source_concept_id",
];

const VISIT_OCCURRENCE_COLUMNS: &[&str] = &[
    "visit_occurrence_id",
    "person_id",
    "visit_concept_id",
    "visit_start_date",
    "visit_start_datetime",
    "visit_end_date",
    "visit_end_datetime",
    "visit_type_concept_id",
    "provider_id",
    "care_site_id",
    "visit_source_value",
    "visit_source_concept_id",
    "admitting_source_concept_id",
    "admitting_source_value",
    "discharge_to_concept_id",
    "discharge_to_source_value",
    "preceding_visit_occurrence_id",
    "visit_source_key",
];

const VISIT_DETAIL_COLUMNS: &[&str] = &[
    "visit_detail_id",
    "person_id",
    "visit_detail_concept_id",
    "visit_detail_start_date",
    "visit_detail_start_datetime",
    "visit_detail_end_date",
    "visit_detail_end_datetime",
    "visit_detail_type_concept_id",
    "provider_id",
    "care_site_id",
    "visit_detail_source_value",
    "visit_detail_source_concept_id",
    "admitting_source_value",
    "admitting_source_concept_id",
    "discharge_to_source_value",
    "discharge_to_concept_id",
    "preceding_visit_detail_id",
    "visit_detail_parent_id",
    "visit_occurrence_id",
    "visit_source_key",
];

const LOCAL_MAPPING_COLUMNS: &[&str] = &[
    "local_code",
    "hospital_id",
    "valid_from",
    "valid_to",
    "external_code",
    "concept_id",
    "concept_name",
    "vocabulary_id",
    "domain_id",
    "vocabulary_priority",
];

const CONDITION_OCCURRENCE_COLUMNS: &[&str] = &[
    "condition_occurrence_id",
    "person_id",
    "condition_concept_id",
    "condition_start_date",
    "condition_start_datetime",
    "condition_end_date",
    "condition_end_datetime",
    "condition_type_concept_id",
    "condition_status_concept_id",
    "stop_reason",
    "provider_id",
    "visit_occurrence_id",
    "visit_detail_id",
    "condition_source_value",
    "condition_source_concept_id",
    "condition_status_source_value",
];

const DRUG_EXPOSURE_COLUMNS: &[&str] = &[
    "drug_exposure_id",
    "person_id",
    "drug_concept_id",
    "drug_exposure_start_date",
    "drug_exposure_start_datetime",
    "drug_exposure_end_date",
    "drug_exposure_end_datetime",
    "verbatim_end_date",
    "drug_type_concept_id",
    "stop_reason",
    "refills",
    "quantity",
    "days_supply",
    "sig",
    "route_concept_id",
    "lot_number",
    "provider_id",
    "visit_occurrence_id",
    "visit_detail_id",
    "drug_source_value",
    "drug_source_concept_id",
    "route_source_value",
    "dose_unit_source_value",
];

const MEASUREMENT_COLUMNS: &[&str] = &[
    "measurement_id",
    "person_id",
    "measurement_concept_id",
    "measurement_date",
    "measurement_datetime",
    "measurement_time",
    "measurement_type_concept_id",
    "operator_concept_id",
    "value_as_number",
    "value_as_concept_id",
    "unit_concept_id",
    "range_low",
    "range_high",
    "provider_id",
    "visit_occurrence_id",
    "visit_detail_id",
    "measurement_source_value",
    "measurement_source_concept_id",
    "unit_source_value",
    "value_source_value",
];

const PROCEDURE_OCCURRENCE_COLUMNS: &[&str] = &[
    "procedure_occurrence_id",
    "person_id",
    "procedure_concept_id",
    "procedure_date",
    "procedure_datetime",
    "procedure_type_concept_id",
    "modifier_concept_id",
    "quantity",
    "provider_id",
    "visit_occurrence_id",
    "visit_detail_id",
    "procedure_source_value",
    "procedure_source_concept_id",
    "modifier_source_value",
];

const OBSERVATION_PERIOD_COLUMNS: &[&str] = &[
    "observation_period_id",
    "person_id",
    "observation_period_start_date",
    "observation_period_end_date",
    "period_type_concept_id",
];

impl CdmTable {
    pub const ALL: [CdmTable; 13] = [
        CdmTable::CareSite,
        CdmTable::Location,
        CdmTable::Provider,
        CdmTable::Person,
        CdmTable::VisitOccurrence,
        CdmTable::VisitDetail,
        CdmTable::LocalEdi,
        CdmTable::LocalKcd,
        CdmTable::ConditionOccurrence,
        CdmTable::DrugExposure,
        CdmTable::Measurement,
        CdmTable::ProcedureOccurrence,
        CdmTable::ObservationPeriod,
    ];

    /// The config key and default file stem.
    pub fn name(self) -> &'static str {
        match self {
            CdmTable::CareSite => "care_site",
            CdmTable::Location => "location",
            CdmTable::Provider => "provider",
            CdmTable::Person => "person",
            CdmTable::VisitOccurrence => "visit_occurrence",
            CdmTable::VisitDetail => "visit_detail",
            CdmTable::LocalEdi => "local_edi",
            CdmTable::LocalKcd => "local_kcd",
            CdmTable::ConditionOccurrence => "condition_occurrence",
            CdmTable::DrugExposure => "drug_exposure",
            CdmTable::Measurement => "measurement",
            CdmTable::ProcedureOccurrence => "procedure_occurrence",
            CdmTable::ObservationPeriod => "observation_period",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let needle = name.trim();
        Self::ALL
            .into_iter()
            .find(|table| table.name().eq_ignore_ascii_case(needle))
    }

    /// Tables whose output must exist before this stage can run.
    pub fn dependencies(self) -> &'static [CdmTable] {
        match self {
            CdmTable::CareSite
            | CdmTable::Location
            | CdmTable::Person
            | CdmTable::LocalEdi
            | CdmTable::LocalKcd
            | CdmTable::ObservationPeriod => &[],
            CdmTable::Provider => &[CdmTable::CareSite],
            CdmTable::VisitOccurrence => &[CdmTable::Person, CdmTable::CareSite],
            CdmTable::VisitDetail => &[
                CdmTable::Person,
                CdmTable::VisitOccurrence,
                CdmTable::CareSite,
            ],
            CdmTable::ConditionOccurrence => &[
                CdmTable::Person,
                CdmTable::VisitOccurrence,
                CdmTable::LocalKcd,
            ],
            CdmTable::DrugExposure | CdmTable::Measurement | CdmTable::ProcedureOccurrence => &[
                CdmTable::Person,
                CdmTable::VisitOccurrence,
                CdmTable::LocalEdi,
            ],
        }
    }

    /// Tables used when available; their absence does not block the stage.
    pub fn optional_dependencies(self) -> &'static [CdmTable] {
        match self {
            CdmTable::Person => &[CdmTable::Location],
            CdmTable::VisitOccurrence | CdmTable::VisitDetail => &[CdmTable::Provider],
            CdmTable::ConditionOccurrence
            | CdmTable::DrugExposure
            | CdmTable::Measurement
            | CdmTable::ProcedureOccurrence => &[CdmTable::Provider],
            CdmTable::ObservationPeriod => &[
                CdmTable::VisitOccurrence,
                CdmTable::ConditionOccurrence,
                CdmTable::DrugExposure,
                CdmTable::Measurement,
                CdmTable::ProcedureOccurrence,
            ],
            _ => &[],
        }
    }

    /// Fixed output column order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            CdmTable::CareSite => CARE_SITE_COLUMNS,
            CdmTable::Location => LOCATION_COLUMNS,
            CdmTable::Provider => PROVIDER_COLUMNS,
            CdmTable::Person => PERSON_COLUMNS,
            CdmTable::VisitOccurrence => VISIT_OCCURRENCE_COLUMNS,
            CdmTable::VisitDetail => VISIT_DETAIL_COLUMNS,
            CdmTable::LocalEdi | CdmTable::LocalKcd => LOCAL_MAPPING_COLUMNS,
            CdmTable::ConditionOccurrence => CONDITION_OCCURRENCE_COLUMNS,
            CdmTable::DrugExposure => DRUG_EXPOSURE_COLUMNS,
            CdmTable::Measurement => MEASUREMENT_COLUMNS,
            CdmTable::ProcedureOccurrence => PROCEDURE_OCCURRENCE_COLUMNS,
            CdmTable::ObservationPeriod => OBSERVATION_PERIOD_COLUMNS,
        }
    }

    /// The surrogate key column, absent for the mapping tables.
    pub fn id_column(self) -> Option<&'static str> {
        if self.is_mapping_table() {
            None
        } else {
            self.columns().first().copied()
        }
    }

    pub fn default_output_filename(self) -> String {
        format!("{}.csv", self.name())
    }

    pub fn is_mapping_table(self) -> bool {
        matches!(self, CdmTable::LocalEdi | CdmTable::LocalKcd)
    }

    /// Whether the stage reads raw source files.
    pub fn needs_source(self) -> bool {
        self != CdmTable::ObservationPeriod
    }

    /// Whether the stage reads a vocabulary concept file.
    pub fn needs_concepts(self) -> bool {
        self.is_mapping_table()
    }

    /// The mapping table a clinical stage resolves codes against.
    pub fn mapping_source(self) -> Option<CdmTable> {
        match self {
            CdmTable::ConditionOccurrence => Some(CdmTable::LocalKcd),
            CdmTable::DrugExposure | CdmTable::Measurement | CdmTable::ProcedureOccurrence => {
                Some(CdmTable::LocalEdi)
            }
            _ => None,
        }
    }

    /// Whether unresolved events are kept with the sentinel or dropped.
    pub fn default_join(self) -> Option<JoinMode> {
        match self {
            CdmTable::ConditionOccurrence
            | CdmTable::DrugExposure
            | CdmTable::ProcedureOccurrence => Some(JoinMode::Left),
            CdmTable::Measurement => Some(JoinMode::Inner),
            _ => None,
        }
    }

    pub fn default_strategy(self) -> Option<MappingStrategy> {
        match self {
            CdmTable::LocalEdi => Some(MappingStrategy::Exact),
            CdmTable::LocalKcd => Some(MappingStrategy::Prefix),
            _ => None,
        }
    }
}

impl fmt::Display for CdmTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CdmTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown CDM table '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for table in CdmTable::ALL {
            assert_eq!(CdmTable::from_name(table.name()), Some(table));
        }
        assert_eq!(
            "Visit_Occurrence".parse::<CdmTable>(),
            Ok(CdmTable::VisitOccurrence)
        );
        assert!("note".parse::<CdmTable>().is_err());
    }

    #[test]
    fn visit_occurrence_layout_has_eighteen_columns() {
        let columns = CdmTable::VisitOccurrence.columns();
        assert_eq!(columns.len(), 18);
        assert_eq!(columns[0], "visit_occurrence_id");
        assert_eq!(columns[16], "preceding_visit_occurrence_id");
    }

    #[test]
    fn dependencies_are_declared_earlier() {
        for table in CdmTable::ALL {
            for dep in table
                .dependencies()
                .iter()
                .chain(table.optional_dependencies())
            {
                assert!(dep < &table, "{dep} should precede {table}");
            }
        }
    }

    #[test]
    fn mapping_tables_have_no_id() {
        assert_eq!(CdmTable::LocalEdi.id_column(), None);
        assert_eq!(CdmTable::Person.id_column(), Some("person_id"));
    }
}
