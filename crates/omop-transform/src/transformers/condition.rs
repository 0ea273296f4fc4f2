use omop_model::CdmTable;
use omop_model::concepts::{CONDITION_TYPE_EHR, condition_status_concept};
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::Result;
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::ops::{OutputFrame, parse_datetimes, pick};
use crate::transformers::TableTransformer;
use crate::transformers::events::{EventSpec, build_events};

const SPEC: EventSpec = EventSpec {
    table: CdmTable::ConditionOccurrence,
    code: "condition_source_value",
    start: "condition_start_datetime",
};

/// Diagnoses resolved through `local_kcd`.
pub struct ConditionTransformer;

impl TableTransformer for ConditionTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::ConditionOccurrence
    }

    fn description(&self) -> &'static str {
        "Diagnoses with primary/secondary status"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "person_source_value",
            "condition_source_value",
            "condition_start_datetime",
        ]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[
            "condition_end_datetime",
            "condition_status_source_value",
            "hospital_id",
            "visit_start_datetime",
            "care_site_source_value",
            "provider_source_value",
        ]
    }

    fn transform(
        &self,
        input: &StageInput<'_>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<DataFrame> {
        let source = input.source(self.table())?;
        let fields = FieldMap::new(self.table(), ctx.config, source);
        let events = build_events(&SPEC, input, &fields, ctx)?;

        let (ends, unparsable) = parse_datetimes(&pick(
            &fields.optional_or_null("condition_end_datetime")?,
            &events.rows,
        ));
        ctx.warn_rows(
            unparsable,
            "condition_end_datetime",
            "unparsable end timestamp left empty",
        );
        let statuses = pick(
            &fields.optional_or_null("condition_status_source_value")?,
            &events.rows,
        );
        let status_concepts: Vec<Option<i64>> = statuses
            .iter()
            .map(|status| status.as_deref().and_then(condition_status_concept))
            .collect();

        let mut output = OutputFrame::new(self.table(), events.len());
        output
            .ids("condition_occurrence_id")
            .ints("person_id", events.person_ids.clone())
            .ints("condition_concept_id", events.concept_ids.clone())
            .dates("condition_start_date", &events.start_dates())
            .datetimes("condition_start_datetime", &events.starts)
            .dates(
                "condition_end_date",
                &ends.iter().map(|e| e.map(|e| e.date())).collect::<Vec<_>>(),
            )
            .datetimes("condition_end_datetime", &ends)
            .constant("condition_type_concept_id", CONDITION_TYPE_EHR)
            .ints("condition_status_concept_id", status_concepts)
            .ints("provider_id", events.provider_ids)
            .ints("visit_occurrence_id", events.visit_ids)
            .strings("condition_source_value", events.codes)
            .constant("condition_source_concept_id", 0)
            .strings("condition_status_source_value", statuses);
        output.finish()
    }
}
