use omop_common::parse_i64;
use omop_model::CdmTable;
use omop_model::concepts::PROCEDURE_TYPE_EHR;
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::Result;
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::ops::{OutputFrame, pick};
use crate::transformers::TableTransformer;
use crate::transformers::events::{EventSpec, build_events};

const SPEC: EventSpec = EventSpec {
    table: CdmTable::ProcedureOccurrence,
    code: "procedure_source_value",
    start: "procedure_datetime",
};

pub struct ProcedureTransformer;

impl TableTransformer for ProcedureTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::ProcedureOccurrence
    }

    fn description(&self) -> &'static str {
        "Procedures resolved through order codes"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "person_source_value",
            "procedure_source_value",
            "procedure_datetime",
        ]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[
            "quantity",
            "modifier_source_value",
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
        let rows = &events.rows;

        let quantities: Vec<Option<i64>> = pick(&fields.optional_or_null("quantity")?, rows)
            .iter()
            .map(|q| q.as_deref().and_then(parse_i64))
            .collect();

        let mut output = OutputFrame::new(self.table(), events.len());
        output
            .ids("procedure_occurrence_id")
            .ints("person_id", events.person_ids.clone())
            .ints("procedure_concept_id", events.concept_ids.clone())
            .dates("procedure_date", &events.start_dates())
            .datetimes("procedure_datetime", &events.starts)
            .constant("procedure_type_concept_id", PROCEDURE_TYPE_EHR)
            .constant("modifier_concept_id", 0)
            .ints("quantity", quantities)
            .ints("provider_id", events.provider_ids.clone())
            .ints("visit_occurrence_id", events.visit_ids.clone())
            .strings("procedure_source_value", events.codes.clone())
            .constant("procedure_source_concept_id", 0)
            .strings(
                "modifier_source_value",
                pick(&fields.optional_or_null("modifier_source_value")?, rows),
            );
        output.finish()
    }
}
