//! `visit_occurrence` and `visit_detail`.
//!
//! Both tables share one pipeline: parse the start timestamp, inner join
//! `person`, cut at `data_range`, default the end to the start, drop
//! duplicate visit keys, then number and link the visits per person.

use chrono::NaiveDateTime;
use omop_model::CdmTable;
use omop_model::concepts::{VISIT_TYPE_EHR, visit_concept};
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::{Result, TransformError};
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::linkage::link_visits;
use crate::ops::{
    OutputFrame, first_occurrence, id_lookup, kept_rows, lookup_all, parse_datetimes, pick,
    visit_source_key, within_data_range,
};
use crate::transformers::TableTransformer;

/// Column names of one visit table. Logical source fields carry the same
/// names as the output columns they feed.
struct VisitSpec {
    table: CdmTable,
    id: &'static str,
    concept: &'static str,
    start_date: &'static str,
    start: &'static str,
    end_date: &'static str,
    end: &'static str,
    type_concept: &'static str,
    source_value: &'static str,
    source_concept: &'static str,
    preceding: &'static str,
}

const VISIT_OCCURRENCE: VisitSpec = VisitSpec {
    table: CdmTable::VisitOccurrence,
    id: "visit_occurrence_id",
    concept: "visit_concept_id",
    start_date: "visit_start_date",
    start: "visit_start_datetime",
    end_date: "visit_end_date",
    end: "visit_end_datetime",
    type_concept: "visit_type_concept_id",
    source_value: "visit_source_value",
    source_concept: "visit_source_concept_id",
    preceding: "preceding_visit_occurrence_id",
};

const VISIT_DETAIL: VisitSpec = VisitSpec {
    table: CdmTable::VisitDetail,
    id: "visit_detail_id",
    concept: "visit_detail_concept_id",
    start_date: "visit_detail_start_date",
    start: "visit_detail_start_datetime",
    end_date: "visit_detail_end_date",
    end: "visit_detail_end_datetime",
    type_concept: "visit_detail_type_concept_id",
    source_value: "visit_detail_source_value",
    source_concept: "visit_detail_source_concept_id",
    preceding: "preceding_visit_detail_id",
};

/// Linked visits in output order.
struct Visits {
    output: OutputFrame,
    /// Source row of each visit.
    rows: Vec<usize>,
    patients: Vec<String>,
    departments: Vec<Option<String>>,
    starts: Vec<NaiveDateTime>,
}

fn build_visits(
    spec: &VisitSpec,
    input: &StageInput<'_>,
    fields: &FieldMap<'_>,
    ctx: &mut TransformContext<'_>,
) -> Result<Visits> {
    let table = spec.table;
    let persons = input.tables.require(table, CdmTable::Person)?;
    let care_sites = input.tables.require(table, CdmTable::CareSite)?;

    let patients = fields.require("person_source_value")?;
    let classes = fields.require(spec.source_value)?;
    let departments = fields.require("care_site_source_value")?;
    let (starts, unparsable) = parse_datetimes(&fields.require(spec.start)?);
    ctx.warn_rows(unparsable, spec.start, "unparsable start timestamp, row dropped");

    let person_lookup = id_lookup(persons, "person_source_value", "person_id")?;
    let cutoff = ctx.site.data_range;
    let mut candidates: Vec<(usize, i64, NaiveDateTime)> = Vec::new();
    let mut with_start = 0usize;
    let mut unknown_person = 0usize;
    let mut after_range = 0usize;
    for (idx, start) in starts.iter().enumerate() {
        let Some(start) = *start else {
            continue;
        };
        with_start += 1;
        let person_id = patients[idx]
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
        candidates.push((idx, person_id, start));
    }
    ctx.warn_rows(
        unknown_person,
        "person_source_value",
        "patient not found in person, row dropped",
    );
    if with_start > 0 && unknown_person == with_start {
        return Err(TransformError::EmptyJoin {
            table,
            dependency: CdmTable::Person,
            source_rows: fields.height(),
        });
    }
    if after_range > 0 {
        ctx.info(format!("{after_range} rows after data_range excluded"));
    }

    let keys: Vec<Option<String>> = candidates
        .iter()
        .map(|(idx, _, start)| {
            Some(visit_source_key(
                patients[*idx].as_deref().unwrap_or_default(),
                *start,
                departments[*idx].as_deref().unwrap_or_default(),
            ))
        })
        .collect();
    let unique = kept_rows(&first_occurrence(&keys));
    ctx.warn_rows(
        candidates.len() - unique.len(),
        "visit_source_key",
        "duplicate visits dropped",
    );
    let candidates = pick(&candidates, &unique);
    let keys = pick(&keys, &unique);

    let person_ids: Vec<i64> = candidates.iter().map(|c| c.1).collect();
    let start_times: Vec<NaiveDateTime> = candidates.iter().map(|c| c.2).collect();
    let linked = link_visits(&person_ids, &start_times);
    let order: Vec<usize> = linked.iter().map(|visit| visit.index).collect();
    let rows: Vec<usize> = order.iter().map(|i| candidates[*i].0).collect();
    let starts: Vec<NaiveDateTime> = order.iter().map(|i| start_times[*i]).collect();

    let (ends, unparsable_end) = parse_datetimes(&pick(&fields.optional_or_null(spec.end)?, &rows));
    ctx.warn_rows(unparsable_end, spec.end, "unparsable end timestamp, start used");
    let ends: Vec<Option<NaiveDateTime>> = ends
        .iter()
        .zip(&starts)
        .map(|(end, start)| Some(end.unwrap_or(*start)))
        .collect();
    let start_values: Vec<Option<NaiveDateTime>> = starts.iter().copied().map(Some).collect();

    let classes = pick(&classes, &rows);
    let concepts: Vec<Option<i64>> = classes
        .iter()
        .map(|class| Some(class.as_deref().map_or(0, visit_concept)))
        .collect();

    let visit_departments = pick(&departments, &rows);
    let care_site_lookup = id_lookup(care_sites, "care_site_source_value", "care_site_id")?;
    let care_site_ids = lookup_all(&care_site_lookup, &visit_departments);
    let unknown_site = visit_departments
        .iter()
        .zip(&care_site_ids)
        .filter(|(code, id)| code.is_some() && id.is_none())
        .count();
    ctx.warn_rows(
        unknown_site,
        "care_site_source_value",
        "department not found in care_site",
    );

    let provider_ids = provider_ids(input, fields, &rows, ctx)?;

    let mut output = OutputFrame::new(table, rows.len());
    output
        .ints(spec.id, linked.iter().map(|visit| Some(visit.id)).collect())
        .ints(
            "person_id",
            order.iter().map(|i| Some(person_ids[*i])).collect(),
        )
        .ints(spec.concept, concepts)
        .dates(
            spec.start_date,
            &start_values.iter().map(|s| s.map(|s| s.date())).collect::<Vec<_>>(),
        )
        .datetimes(spec.start, &start_values)
        .dates(
            spec.end_date,
            &ends.iter().map(|e| e.map(|e| e.date())).collect::<Vec<_>>(),
        )
        .datetimes(spec.end, &ends)
        .constant(spec.type_concept, VISIT_TYPE_EHR)
        .ints("provider_id", provider_ids)
        .ints("care_site_id", care_site_ids)
        .strings(spec.source_value, classes)
        .constant(spec.source_concept, 0)
        .constant("admitting_source_concept_id", 0)
        .strings(
            "admitting_source_value",
            pick(&fields.optional_or_null("admitting_source_value")?, &rows),
        )
        .constant("discharge_to_concept_id", 0)
        .strings(
            "discharge_to_source_value",
            pick(&fields.optional_or_null("discharge_to_source_value")?, &rows),
        )
        .ints(
            spec.preceding,
            linked.iter().map(|visit| visit.preceding_id).collect(),
        )
        .strings("visit_source_key", pick(&keys, &order));

    let patients = rows
        .iter()
        .map(|idx| patients[*idx].clone().unwrap_or_default())
        .collect();
    Ok(Visits {
        output,
        rows,
        patients,
        departments: visit_departments,
        starts,
    })
}

/// Provider ids when `provider` is available and the field is mapped.
pub(crate) fn provider_ids(
    input: &StageInput<'_>,
    fields: &FieldMap<'_>,
    rows: &[usize],
    ctx: &mut TransformContext<'_>,
) -> Result<Vec<Option<i64>>> {
    let Some(codes) = fields.optional("provider_source_value")? else {
        return Ok(vec![None; rows.len()]);
    };
    let Some(providers) = input.tables.get(CdmTable::Provider) else {
        ctx.warn("provider is not available; provider_id left empty");
        return Ok(vec![None; rows.len()]);
    };
    let lookup = id_lookup(providers, "provider_source_value", "provider_id")?;
    Ok(lookup_all(&lookup, &pick(&codes, rows)))
}

const VISIT_FIELDS: &[&str] = &[
    "person_source_value",
    "visit_start_datetime",
    "visit_source_value",
    "care_site_source_value",
];

const VISIT_OPTIONAL_FIELDS: &[&str] = &[
    "visit_end_datetime",
    "provider_source_value",
    "admitting_source_value",
    "discharge_to_source_value",
];

/// Visits keyed by patient, start timestamp and department.
pub struct VisitOccurrenceTransformer;

impl TableTransformer for VisitOccurrenceTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::VisitOccurrence
    }

    fn description(&self) -> &'static str {
        "Visits with preceding-visit linkage"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        VISIT_FIELDS
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        VISIT_OPTIONAL_FIELDS
    }

    fn transform(
        &self,
        input: &StageInput<'_>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<DataFrame> {
        let source = input.source(self.table())?;
        let fields = FieldMap::new(self.table(), ctx.config, source);
        let visits = build_visits(&VISIT_OCCURRENCE, input, &fields, ctx)?;
        visits.output.finish()
    }
}

const DETAIL_FIELDS: &[&str] = &[
    "person_source_value",
    "visit_detail_start_datetime",
    "visit_detail_source_value",
    "care_site_source_value",
];

const DETAIL_OPTIONAL_FIELDS: &[&str] = &[
    "visit_detail_end_datetime",
    "visit_start_datetime",
    "provider_source_value",
    "admitting_source_value",
    "discharge_to_source_value",
];

/// Department stays within a visit.
///
/// The parent visit is found through its source key, built from
/// `visit_start_datetime` when mapped and from the detail start otherwise.
pub struct VisitDetailTransformer;

impl TableTransformer for VisitDetailTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::VisitDetail
    }

    fn description(&self) -> &'static str {
        "Visit details linked to their visit"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        DETAIL_FIELDS
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        DETAIL_OPTIONAL_FIELDS
    }

    fn transform(
        &self,
        input: &StageInput<'_>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<DataFrame> {
        let table = self.table();
        let source = input.source(table)?;
        let visit_occurrence = input.tables.require(table, CdmTable::VisitOccurrence)?;
        let fields = FieldMap::new(table, ctx.config, source);
        let mut visits = build_visits(&VISIT_DETAIL, input, &fields, ctx)?;

        let parents = pick(&fields.optional_or_null("visit_start_datetime")?, &visits.rows);
        let (parent_starts, unparsable) = parse_datetimes(&parents);
        ctx.warn_rows(
            unparsable,
            "visit_start_datetime",
            "unparsable visit start, detail start used",
        );
        let keys: Vec<Option<String>> = visits
            .starts
            .iter()
            .enumerate()
            .map(|(i, start)| {
                Some(visit_source_key(
                    &visits.patients[i],
                    parent_starts[i].unwrap_or(*start),
                    visits.departments[i].as_deref().unwrap_or_default(),
                ))
            })
            .collect();
        let lookup = id_lookup(visit_occurrence, "visit_source_key", "visit_occurrence_id")?;
        let visit_ids = lookup_all(&lookup, &keys);
        let orphans = visit_ids.iter().filter(|id| id.is_none()).count();
        ctx.warn_rows(
            orphans,
            "visit_start_datetime",
            "no matching visit_occurrence",
        );

        visits.output.ints("visit_occurrence_id", visit_ids);
        visits.output.finish()
    }
}
