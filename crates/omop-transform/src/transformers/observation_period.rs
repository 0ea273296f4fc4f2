use omop_model::CdmTable;
use omop_model::concepts::PERIOD_TYPE_EHR;
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::Result;
use crate::frame::StageInput;
use crate::observation::{aggregate_periods, project_spans};
use crate::ops::OutputFrame;
use crate::transformers::TableTransformer;

/// Start and end columns each table contributes to observation periods.
const SPAN_COLUMNS: [(CdmTable, &str, &str); 5] = [
    (
        CdmTable::VisitOccurrence,
        "visit_start_date",
        "visit_end_date",
    ),
    (
        CdmTable::ConditionOccurrence,
        "condition_start_date",
        "condition_end_date",
    ),
    (
        CdmTable::DrugExposure,
        "drug_exposure_start_date",
        "drug_exposure_end_date",
    ),
    (CdmTable::Measurement, "measurement_date", "measurement_date"),
    (
        CdmTable::ProcedureOccurrence,
        "procedure_date",
        "procedure_date",
    ),
];

/// One period per person from the earliest start to the latest end across
/// the clinical tables that are available.
pub struct ObservationPeriodTransformer;

impl TableTransformer for ObservationPeriodTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::ObservationPeriod
    }

    fn description(&self) -> &'static str {
        "Per-person observation periods"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn transform(
        &self,
        input: &StageInput<'_>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<DataFrame> {
        let mut spans = Vec::new();
        let mut used = Vec::new();
        for (table, start, end) in SPAN_COLUMNS {
            if let Some(frame) = input.tables.get(table) {
                spans.extend(project_spans(frame, start, end)?);
                used.push(table.name());
            }
        }
        if used.is_empty() {
            ctx.warn("no clinical table available; observation_period is empty");
        } else {
            ctx.info(format!("periods built from {}", used.join(", ")));
        }

        let periods = aggregate_periods(spans);
        let mut output = OutputFrame::new(self.table(), periods.len());
        output
            .ints(
                "observation_period_id",
                periods
                    .iter()
                    .map(|p| Some(p.observation_period_id))
                    .collect(),
            )
            .ints(
                "person_id",
                periods.iter().map(|p| Some(p.person_id)).collect(),
            )
            .dates(
                "observation_period_start_date",
                &periods.iter().map(|p| Some(p.start)).collect::<Vec<_>>(),
            )
            .dates(
                "observation_period_end_date",
                &periods.iter().map(|p| Some(p.end)).collect::<Vec<_>>(),
            )
            .constant("period_type_concept_id", PERIOD_TYPE_EHR);
        output.finish()
    }
}
