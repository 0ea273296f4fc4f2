//! Conversions between DataFrames and resolver rows.
//!
//! Input frames use the logical column names (`local_code`, `external_code`,
//! `valid_from`, ...); the transformers rename source headers before calling
//! in. Concept frames use the OMOP `CONCEPT` headers.

use chrono::NaiveDate;
use polars::prelude::{DataFrame, PolarsResult};

use omop_common::{
    format_date, has_column, i64_column, i64_values, open_end, open_start, parse_date,
    string_column, string_values,
};
use omop_model::CdmTable;

use crate::error::{Result, VocabError};
use crate::mapping::{MappingOptions, MappingOutcome, build_mapping_rows};
use crate::model::{LocalCodeMapping, OrderMasterRow, VocabularyConcept};
use crate::prefix::build_prefix_mapping_rows;

const ORDER_MASTER: &str = "order master";
const CONCEPTS: &str = "vocabulary concepts";
const MAPPING: &str = "mapping table";

fn require(df: &DataFrame, table: &'static str, column: &str) -> Result<()> {
    if has_column(df, column) {
        Ok(())
    } else {
        Err(VocabError::MissingColumn {
            table,
            column: column.to_string(),
        })
    }
}

fn optional_strings(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    if has_column(df, column) {
        Ok(string_values(df, column)?)
    } else {
        Ok(vec![None; df.height()])
    }
}

/// Reads order master rows.
///
/// `local_code` is always required and `external_code` when
/// `require_external` is set. Rows without a local code are skipped.
pub fn order_master_from_frame(
    df: &DataFrame,
    require_external: bool,
) -> Result<Vec<OrderMasterRow>> {
    require(df, ORDER_MASTER, "local_code")?;
    if require_external {
        require(df, ORDER_MASTER, "external_code")?;
    }
    let local_codes = string_values(df, "local_code")?;
    let hospitals = optional_strings(df, "hospital_id")?;
    let valid_from = optional_strings(df, "valid_from")?;
    let valid_to = optional_strings(df, "valid_to")?;
    let external = optional_strings(df, "external_code")?;

    let mut rows = Vec::with_capacity(df.height());
    for (idx, local_code) in local_codes.into_iter().enumerate() {
        let Some(local_code) = local_code else {
            continue;
        };
        rows.push(OrderMasterRow {
            local_code,
            hospital_id: hospitals[idx].clone().unwrap_or_default(),
            valid_from: valid_from[idx].clone(),
            valid_to: valid_to[idx].clone(),
            external_code: external[idx].clone(),
        });
    }
    Ok(rows)
}

/// Reads an OMOP `CONCEPT` table; rows without a numeric id or a code are skipped.
pub fn concepts_from_frame(df: &DataFrame) -> Result<Vec<VocabularyConcept>> {
    for column in ["concept_id", "concept_code", "concept_name", "vocabulary_id"] {
        require(df, CONCEPTS, column)?;
    }
    let ids = i64_values(df, "concept_id")?;
    let codes = string_values(df, "concept_code")?;
    let names = string_values(df, "concept_name")?;
    let vocabularies = string_values(df, "vocabulary_id")?;
    let domains = optional_strings(df, "domain_id")?;

    let mut concepts = Vec::with_capacity(df.height());
    let mut skipped = 0usize;
    for idx in 0..df.height() {
        let (Some(concept_id), Some(code)) = (ids[idx], codes[idx].clone()) else {
            skipped += 1;
            continue;
        };
        concepts.push(VocabularyConcept {
            concept_id,
            concept_code: code,
            concept_name: names[idx].clone().unwrap_or_default(),
            vocabulary_id: vocabularies[idx].clone().unwrap_or_default(),
            domain_id: domains[idx].clone(),
        });
    }
    if skipped > 0 {
        tracing::debug!(skipped, "skipped concept rows without id or code");
    }
    Ok(concepts)
}

/// Builds an exact-match mapping table from DataFrames.
///
/// Fails with [`VocabError::MissingColumn`] naming the first absent column.
pub fn build_mapping_table(
    order_master: &DataFrame,
    concepts: &DataFrame,
    options: &MappingOptions,
) -> Result<MappingOutcome> {
    let rows = order_master_from_frame(order_master, true)?;
    let concepts = concepts_from_frame(concepts)?;
    Ok(build_mapping_rows(&rows, &concepts, options))
}

/// Builds a longest-prefix mapping table from DataFrames.
pub fn build_prefix_mapping_table(
    codes: &DataFrame,
    concepts: &DataFrame,
    options: &MappingOptions,
) -> Result<MappingOutcome> {
    let rows = order_master_from_frame(codes, false)?;
    let concepts = concepts_from_frame(concepts)?;
    Ok(build_prefix_mapping_rows(&rows, &concepts, options))
}

/// Writes mapping rows in the `local_edi`/`local_kcd` column layout.
pub fn mappings_to_frame(mappings: &[LocalCodeMapping]) -> PolarsResult<DataFrame> {
    let strings = |f: fn(&LocalCodeMapping) -> Option<String>| -> Vec<Option<String>> {
        mappings.iter().map(f).collect()
    };
    let columns = CdmTable::LocalEdi
        .columns()
        .iter()
        .map(|name| match *name {
            "local_code" => string_column(name, strings(|m| Some(m.local_code.clone()))),
            "hospital_id" => string_column(
                name,
                strings(|m| Some(m.hospital_id.clone()).filter(|h| !h.is_empty())),
            ),
            "valid_from" => string_column(name, strings(|m| Some(format_date(m.valid_from)))),
            "valid_to" => string_column(name, strings(|m| Some(format_date(m.valid_to)))),
            "external_code" => string_column(name, strings(|m| m.external_code.clone())),
            "concept_id" => {
                i64_column(name, mappings.iter().map(|m| Some(m.concept_id)).collect())
            }
            "concept_name" => string_column(name, strings(|m| Some(m.concept_name.clone()))),
            "vocabulary_id" => string_column(name, strings(|m| m.vocabulary_id.clone())),
            "domain_id" => string_column(name, strings(|m| m.domain_id.clone())),
            _ => i64_column(
                name,
                mappings
                    .iter()
                    .map(|m| m.vocabulary_priority.map(i64::from))
                    .collect(),
            ),
        })
        .collect();
    DataFrame::new(columns)
}

fn date_or(value: Option<&str>, open: NaiveDate) -> NaiveDate {
    value.and_then(parse_date).unwrap_or(open)
}

/// Mapping rows read back from a `local_edi`/`local_kcd` frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedMappings {
    pub mappings: Vec<LocalCodeMapping>,
    /// Rows without a local code or a numeric `concept_id`.
    pub skipped: usize,
}

/// Reads a mapping table written by an earlier stage or run.
///
/// Unusable rows are counted in [`LoadedMappings::skipped`], not returned.
pub fn mappings_from_frame(df: &DataFrame) -> Result<LoadedMappings> {
    for column in ["local_code", "concept_id"] {
        require(df, MAPPING, column)?;
    }
    let local_codes = string_values(df, "local_code")?;
    let concept_ids = i64_values(df, "concept_id")?;
    let hospitals = optional_strings(df, "hospital_id")?;
    let valid_from = optional_strings(df, "valid_from")?;
    let valid_to = optional_strings(df, "valid_to")?;
    let external = optional_strings(df, "external_code")?;
    let names = optional_strings(df, "concept_name")?;
    let vocabularies = optional_strings(df, "vocabulary_id")?;
    let domains = optional_strings(df, "domain_id")?;
    let priorities = if has_column(df, "vocabulary_priority") {
        i64_values(df, "vocabulary_priority")?
    } else {
        vec![None; df.height()]
    };

    let mut mappings = Vec::with_capacity(df.height());
    let mut skipped = 0usize;
    for idx in 0..df.height() {
        let (Some(local_code), Some(concept_id)) = (local_codes[idx].clone(), concept_ids[idx])
        else {
            skipped += 1;
            continue;
        };
        mappings.push(LocalCodeMapping {
            local_code,
            hospital_id: hospitals[idx].clone().unwrap_or_default(),
            valid_from: date_or(valid_from[idx].as_deref(), open_start()),
            valid_to: date_or(valid_to[idx].as_deref(), open_end()),
            external_code: external[idx].clone(),
            concept_id,
            concept_name: names[idx].clone().unwrap_or_default(),
            vocabulary_id: vocabularies[idx].clone(),
            domain_id: domains[idx].clone(),
            vocabulary_priority: priorities[idx].and_then(|p| u32::try_from(p).ok()),
        });
    }
    Ok(LoadedMappings { mappings, skipped })
}
