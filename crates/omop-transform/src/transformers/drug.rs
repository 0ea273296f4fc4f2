use chrono::{Duration, NaiveDateTime};
use omop_common::{parse_f64, parse_i64};
use omop_model::CdmTable;
use omop_model::concepts::DRUG_TYPE_PRESCRIPTION;
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::Result;
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::ops::{OutputFrame, pick};
use crate::transformers::TableTransformer;
use crate::transformers::events::{EventSpec, build_events};

const SPEC: EventSpec = EventSpec {
    table: CdmTable::DrugExposure,
    code: "drug_source_value",
    start: "drug_exposure_start_datetime",
};

/// Last day covered by a prescription: `start + days_supply - 1`.
///
/// Missing or non-positive supplies end on the start day.
fn exposure_end(start: NaiveDateTime, days_supply: Option<i64>) -> NaiveDateTime {
    match days_supply {
        Some(days) if days > 1 => start
            .checked_add_signed(Duration::days(days - 1))
            .unwrap_or(start),
        _ => start,
    }
}

/// Prescriptions resolved through `local_edi`.
pub struct DrugExposureTransformer;

impl TableTransformer for DrugExposureTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::DrugExposure
    }

    fn description(&self) -> &'static str {
        "Prescriptions with days of supply"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "person_source_value",
            "drug_source_value",
            "drug_exposure_start_datetime",
        ]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[
            "days_supply",
            "quantity",
            "refills",
            "sig",
            "route_source_value",
            "dose_unit_source_value",
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

        let supplies: Vec<Option<i64>> = pick(&fields.optional_or_null("days_supply")?, rows)
            .iter()
            .map(|days| days.as_deref().and_then(parse_i64))
            .collect();
        let ends: Vec<Option<NaiveDateTime>> = events
            .starts
            .iter()
            .zip(&supplies)
            .map(|(start, days)| start.map(|start| exposure_end(start, *days)))
            .collect();
        let end_dates: Vec<_> = ends.iter().map(|e| e.map(|e| e.date())).collect();
        let quantities: Vec<Option<f64>> = pick(&fields.optional_or_null("quantity")?, rows)
            .iter()
            .map(|q| q.as_deref().and_then(parse_f64))
            .collect();
        let refills: Vec<Option<i64>> = pick(&fields.optional_or_null("refills")?, rows)
            .iter()
            .map(|r| r.as_deref().and_then(parse_i64))
            .collect();

        let mut output = OutputFrame::new(self.table(), events.len());
        output
            .ids("drug_exposure_id")
            .ints("person_id", events.person_ids.clone())
            .ints("drug_concept_id", events.concept_ids.clone())
            .dates("drug_exposure_start_date", &events.start_dates())
            .datetimes("drug_exposure_start_datetime", &events.starts)
            .dates("drug_exposure_end_date", &end_dates)
            .datetimes("drug_exposure_end_datetime", &ends)
            .constant("drug_type_concept_id", DRUG_TYPE_PRESCRIPTION)
            .ints("refills", refills)
            .floats("quantity", quantities)
            .ints("days_supply", supplies)
            .strings("sig", pick(&fields.optional_or_null("sig")?, rows))
            .constant("route_concept_id", 0)
            .ints("provider_id", events.provider_ids.clone())
            .ints("visit_occurrence_id", events.visit_ids.clone())
            .strings("drug_source_value", events.codes.clone())
            .constant("drug_source_concept_id", 0)
            .strings(
                "route_source_value",
                pick(&fields.optional_or_null("route_source_value")?, rows),
            )
            .strings(
                "dose_unit_source_value",
                pick(&fields.optional_or_null("dose_unit_source_value")?, rows),
            );
        output.finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn supply_counts_the_start_day() {
        let start = NaiveDate::from_ymd_opt(2022, 1, 30)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(exposure_end(start, Some(3)).date(), NaiveDate::from_ymd_opt(2022, 2, 1).unwrap());
        assert_eq!(exposure_end(start, Some(1)), start);
        assert_eq!(exposure_end(start, Some(0)), start);
        assert_eq!(exposure_end(start, None), start);
    }
}
