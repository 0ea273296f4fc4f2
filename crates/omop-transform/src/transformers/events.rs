//! Shared pipeline of the clinical event tables.
//!
//! Condition, drug, measurement and procedure rows go through the same
//! steps: parse the event timestamp, inner join `person`, cut at
//! `data_range`, resolve the local code against the mapping table active on
//! the event date, and find the visit through its source key.

use chrono::{NaiveDate, NaiveDateTime};
use omop_model::{CdmTable, JoinMode};
use omop_vocab::{
    ClinicalEvent, MappingTable, Resolution, ResolutionStats, mappings_from_frame, resolve_event,
};
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::{Result, TransformError};
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::ops::{
    id_lookup, lookup_all, parse_datetimes, pick, visit_source_key, within_data_range,
};
use crate::transformers::visit::provider_ids;

pub(crate) struct EventSpec {
    pub table: CdmTable,
    pub code: &'static str,
    pub start: &'static str,
}

/// Kept events in output order.
pub(crate) struct Events {
    /// Source row of each event.
    pub rows: Vec<usize>,
    pub person_ids: Vec<Option<i64>>,
    pub starts: Vec<Option<NaiveDateTime>>,
    pub codes: Vec<Option<String>>,
    pub concept_ids: Vec<Option<i64>>,
    pub visit_ids: Vec<Option<i64>>,
    pub provider_ids: Vec<Option<i64>>,
}

impl Events {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn start_dates(&self) -> Vec<Option<NaiveDate>> {
        self.starts.iter().map(|s| s.map(|s| s.date())).collect()
    }
}

/// The mapping table an event table resolves its codes against.
fn mapping_source(table: CdmTable) -> Result<CdmTable> {
    table
        .mapping_source()
        .ok_or(TransformError::NoMappingSource { table })
}

struct Candidate {
    row: usize,
    person_id: i64,
    start: NaiveDateTime,
}

pub(crate) fn build_events(
    spec: &EventSpec,
    input: &StageInput<'_>,
    fields: &FieldMap<'_>,
    ctx: &mut TransformContext<'_>,
) -> Result<Events> {
    let table = spec.table;
    let persons = input.tables.require(table, CdmTable::Person)?;
    let visits = input.tables.require(table, CdmTable::VisitOccurrence)?;
    let mapping_frame = input.tables.require(table, mapping_source(table)?)?;

    let patients = fields.require("person_source_value")?;
    let codes = fields.require(spec.code)?;
    let (starts, unparsable) = parse_datetimes(&fields.require(spec.start)?);
    ctx.warn_rows(unparsable, spec.start, "unparsable event timestamp, row dropped");

    let person_lookup = id_lookup(persons, "person_source_value", "person_id")?;
    let cutoff = ctx.site.data_range;
    let mut candidates = Vec::new();
    let (mut with_start, mut without_code, mut unknown_person, mut after_range) = (0, 0, 0, 0);
    for (row, start) in starts.iter().enumerate() {
        let Some(start) = *start else {
            continue;
        };
        with_start += 1;
        if codes[row].is_none() {
            without_code += 1;
            continue;
        }
        let person_id = patients[row]
            .as_ref()
            .and_then(|patient| person_lookup.get(patient).copied());
        let Some(person_id) = person_id else {
            unknown_person += 1;
            continue;
        };
        if !within_data_range(start.date(), cutoff) {
            after_range += 1;
            continue;
        }
        candidates.push(Candidate {
            row,
            person_id,
            start,
        });
    }
    ctx.warn_rows(without_code, spec.code, "rows without a code dropped");
    ctx.warn_rows(
        unknown_person,
        "person_source_value",
        "patient not found in person, row dropped",
    );
    if with_start > without_code && unknown_person == with_start - without_code {
        return Err(TransformError::EmptyJoin {
            table,
            dependency: CdmTable::Person,
            source_rows: fields.height(),
        });
    }
    if after_range > 0 {
        ctx.info(format!("{after_range} rows after data_range excluded"));
    }

    let loaded = mappings_from_frame(mapping_frame)
        .map_err(|source| TransformError::Vocab { table, source })?;
    ctx.warn_rows(
        loaded.skipped,
        "concept_id",
        "mapping rows without a local code or numeric concept_id ignored",
    );
    let mapping_table = MappingTable::new(loaded.mappings);
    let hospitals = fields.optional_or_null("hospital_id")?;
    let site = ctx.site;
    let default_hospital = site.default_hospital();
    let join = ctx.config.join_mode(table);
    let unmapped = &site.no_matching_concept;

    let mut stats = ResolutionStats::default();
    let mut kept = Vec::with_capacity(candidates.len());
    let mut concept_ids = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let event = ClinicalEvent {
            local_code: codes[candidate.row].as_deref().unwrap_or_default(),
            hospital_id: hospitals[candidate.row]
                .as_deref()
                .unwrap_or(default_hospital),
            event_date: candidate.start.date(),
        };
        let resolution = resolve_event(&event, &mapping_table);
        stats.record(&resolution);
        if matches!(resolution, Resolution::Unmapped) && join == JoinMode::Inner {
            stats.dropped += 1;
            continue;
        }
        concept_ids.push(Some(resolution.concept_id(unmapped)));
        kept.push(candidate);
    }
    report(&stats, spec.code, join, ctx);

    let rows: Vec<usize> = kept.iter().map(|c| c.row).collect();
    let starts: Vec<Option<NaiveDateTime>> = kept.iter().map(|c| Some(c.start)).collect();
    let visit_ids = visit_ids(visits, fields, &patients, &rows, &starts, ctx)?;
    let provider_ids = provider_ids(input, fields, &rows, ctx)?;

    Ok(Events {
        person_ids: kept.iter().map(|c| Some(c.person_id)).collect(),
        codes: pick(&codes, &rows),
        rows,
        starts,
        concept_ids,
        visit_ids,
        provider_ids,
    })
}

fn report(stats: &ResolutionStats, field: &str, join: JoinMode, ctx: &mut TransformContext<'_>) {
    ctx.warn_rows(
        stats.ambiguous,
        field,
        "events covered by overlapping mapping intervals; earliest valid_from taken",
    );
    let message = match join {
        JoinMode::Left => "events without an active mapping kept with the unmapped concept",
        JoinMode::Inner => "events without an active mapping dropped",
    };
    ctx.warn_rows(stats.unmapped, field, message);
    ctx.info(format!(
        "{} events matched, {} ambiguous, {} unmapped",
        stats.matched, stats.ambiguous, stats.unmapped
    ));
}

/// Joins events to `visit_occurrence` through the visit source key.
///
/// The visit start defaults to the event timestamp and the department to
/// an empty string when their fields are not mapped.
fn visit_ids(
    visits: &DataFrame,
    fields: &FieldMap<'_>,
    patients: &[Option<String>],
    rows: &[usize],
    starts: &[Option<NaiveDateTime>],
    ctx: &mut TransformContext<'_>,
) -> Result<Vec<Option<i64>>> {
    if !fields.is_configured("visit_start_datetime")
        && !fields.is_configured("care_site_source_value")
    {
        return Ok(vec![None; rows.len()]);
    }
    let (visit_starts, unparsable) =
        parse_datetimes(&pick(&fields.optional_or_null("visit_start_datetime")?, rows));
    ctx.warn_rows(
        unparsable,
        "visit_start_datetime",
        "unparsable visit start, event timestamp used",
    );
    let departments = pick(&fields.optional_or_null("care_site_source_value")?, rows);
    let keys: Vec<Option<String>> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let start = visit_starts[i].or(starts[i])?;
            Some(visit_source_key(
                patients[*row].as_deref()?,
                start,
                departments[i].as_deref().unwrap_or_default(),
            ))
        })
        .collect();
    let lookup = id_lookup(visits, "visit_source_key", "visit_occurrence_id")?;
    let ids = lookup_all(&lookup, &keys);
    ctx.warn_rows(
        ids.iter().filter(|id| id.is_none()).count(),
        "visit_start_datetime",
        "no matching visit_occurrence",
    );
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_source_follows_the_table() {
        assert_eq!(
            mapping_source(CdmTable::ConditionOccurrence).unwrap(),
            CdmTable::LocalKcd
        );
        assert_eq!(mapping_source(CdmTable::DrugExposure).unwrap(), CdmTable::LocalEdi);
    }

    #[test]
    fn table_without_mapping_source_is_an_error() {
        let err = mapping_source(CdmTable::VisitOccurrence).unwrap_err();
        assert!(matches!(
            err,
            TransformError::NoMappingSource {
                table: CdmTable::VisitOccurrence
            }
        ));
        assert_eq!(
            err.to_string(),
            "visit_occurrence: no mapping table declared for code resolution"
        );
    }
}
