//! Local code resolver.
//!
//! Hospital order and diagnosis codes are bound to standard vocabulary
//! concepts in two steps:
//!
//! 1. [`build_mapping_rows`] (exact codes) or [`build_prefix_mapping_rows`]
//!    (hierarchical diagnosis codes) derive one [`LocalCodeMapping`] per
//!    `(local_code, hospital_id, valid_from)` from the order master and the
//!    vocabulary concept table.
//! 2. [`resolve_event`] picks the mapping whose validity interval covers a
//!    clinical event's date.
//!
//! Both steps are deterministic: ties are broken by vocabulary priority and
//! concept id, never by input or hash order.

mod error;
mod frame;
mod mapping;
mod model;
mod prefix;
mod priority;
mod resolve;

pub use error::{Result, VocabError};
pub use frame::{
    LoadedMappings, build_mapping_table, build_prefix_mapping_table, concepts_from_frame,
    mappings_from_frame, mappings_to_frame, order_master_from_frame,
};
pub use mapping::{BuildStats, MappingOptions, MappingOutcome, build_mapping_rows, dedup_by_priority};
pub use model::{ClinicalEvent, LocalCodeMapping, OrderMasterRow, VocabularyConcept};
pub use prefix::{ConceptIndex, build_prefix_mapping_rows, match_diagnosis_prefix, normalize_code};
pub use priority::{RankTable, VocabularyPriority};
pub use resolve::{MappingTable, Resolution, ResolutionStats, resolve_event};
