use omop_common::parse_f64;
use omop_model::CdmTable;
use omop_model::concepts::{MEASUREMENT_TYPE_LAB, split_operator};
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::Result;
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::ops::{OutputFrame, pick};
use crate::transformers::TableTransformer;
use crate::transformers::events::{EventSpec, build_events};

const SPEC: EventSpec = EventSpec {
    table: CdmTable::Measurement,
    code: "measurement_source_value",
    start: "measurement_datetime",
};

/// A lab result split into comparison operator and numeric value.
///
/// `"<0.5"` gives the less-than concept and 0.5; text results keep no
/// number.
fn parse_result(value: &str) -> (Option<i64>, Option<f64>) {
    let (operator, rest) = split_operator(value);
    (operator, parse_f64(rest))
}

/// Lab results resolved through `local_edi`. Unmapped results are dropped
/// unless the table is configured with `join: left`.
pub struct MeasurementTransformer;

impl TableTransformer for MeasurementTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::Measurement
    }

    fn description(&self) -> &'static str {
        "Lab results with numeric values"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            "person_source_value",
            "measurement_source_value",
            "measurement_datetime",
        ]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[
            "value_source_value",
            "unit_source_value",
            "range_low",
            "range_high",
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

        let values = pick(&fields.optional_or_null("value_source_value")?, rows);
        let (operators, numbers): (Vec<Option<i64>>, Vec<Option<f64>>) = values
            .iter()
            .map(|value| value.as_deref().map_or((None, None), parse_result))
            .unzip();
        let floats = |field: &str| -> Result<Vec<Option<f64>>> {
            Ok(pick(&fields.optional_or_null(field)?, rows)
                .iter()
                .map(|v| v.as_deref().and_then(parse_f64))
                .collect())
        };
        let times: Vec<Option<String>> = events
            .starts
            .iter()
            .map(|s| s.map(|s| s.format("%H:%M:%S").to_string()))
            .collect();

        let mut output = OutputFrame::new(self.table(), events.len());
        output
            .ids("measurement_id")
            .ints("person_id", events.person_ids.clone())
            .ints("measurement_concept_id", events.concept_ids.clone())
            .dates("measurement_date", &events.start_dates())
            .datetimes("measurement_datetime", &events.starts)
            .strings("measurement_time", times)
            .constant("measurement_type_concept_id", MEASUREMENT_TYPE_LAB)
            .ints("operator_concept_id", operators)
            .floats("value_as_number", numbers)
            .floats("range_low", floats("range_low")?)
            .floats("range_high", floats("range_high")?)
            .ints("provider_id", events.provider_ids.clone())
            .ints("visit_occurrence_id", events.visit_ids.clone())
            .strings("measurement_source_value", events.codes.clone())
            .constant("measurement_source_concept_id", 0)
            .strings(
                "unit_source_value",
                pick(&fields.optional_or_null("unit_source_value")?, rows),
            )
            .strings("value_source_value", values);
        output.finish()
    }
}

#[cfg(test)]
mod tests {
    use omop_model::concepts::{OPERATOR_LE, OPERATOR_LT};

    use super::*;

    #[test]
    fn results_split_operator_and_number() {
        assert_eq!(parse_result("<0.5"), (Some(OPERATOR_LT), Some(0.5)));
        assert_eq!(parse_result("<= 10"), (Some(OPERATOR_LE), Some(10.0)));
        assert_eq!(parse_result("12.3"), (None, Some(12.3)));
        assert_eq!(parse_result("positive"), (None, None));
    }
}
