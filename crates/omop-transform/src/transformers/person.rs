use chrono::Datelike;
use omop_model::CdmTable;
use omop_model::concepts::gender_concept;
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::Result;
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::ops::{
    OutputFrame, first_occurrence, id_lookup, kept_rows, lookup_all, parse_datetimes, pick,
};
use crate::transformers::TableTransformer;

/// One person per patient id.
///
/// The first row of a patient wins. Birth timestamps are split into year,
/// month and day; rows whose birth date does not parse are kept with null
/// birth fields.
pub struct PersonTransformer;

impl TableTransformer for PersonTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::Person
    }

    fn description(&self) -> &'static str {
        "Patients with gender and birth date"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["person_source_value", "gender_source_value", "birth_datetime"]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[
            "location_source_value",
            "race_source_value",
            "ethnicity_source_value",
        ]
    }

    fn transform(
        &self,
        input: &StageInput<'_>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<DataFrame> {
        let table = self.table();
        let source = input.source(table)?;
        let fields = FieldMap::new(table, ctx.config, source);

        let patients = fields.require("person_source_value")?;
        let missing = patients.iter().filter(|p| p.is_none()).count();
        ctx.warn_rows(
            missing,
            "person_source_value",
            "rows without a patient id dropped",
        );
        let first = first_occurrence(&patients);
        let duplicates = first.len() - missing - first.iter().filter(|keep| **keep).count();
        ctx.warn_rows(
            duplicates,
            "person_source_value",
            "duplicate patient rows dropped",
        );
        let rows = kept_rows(&first);

        let genders = pick(&fields.require("gender_source_value")?, &rows);
        let gender_concepts: Vec<Option<i64>> = genders
            .iter()
            .map(|gender| Some(gender.as_deref().map_or(0, gender_concept)))
            .collect();

        let (births, unparsable) = parse_datetimes(&pick(&fields.require("birth_datetime")?, &rows));
        ctx.warn_rows(unparsable, "birth_datetime", "unparsable birth date");
        let part = |f: fn(&chrono::NaiveDateTime) -> i64| -> Vec<Option<i64>> {
            births.iter().map(|birth| birth.as_ref().map(f)).collect()
        };
        let years = part(|birth| i64::from(birth.year()));
        let months = part(|birth| i64::from(birth.month()));
        let days = part(|birth| i64::from(birth.day()));

        let locations = pick(&fields.optional_or_null("location_source_value")?, &rows);
        let location_ids = match input.tables.get(CdmTable::Location) {
            Some(location) => {
                let lookup = id_lookup(location, "location_source_value", "location_id")?;
                lookup_all(&lookup, &locations)
            }
            None => {
                if fields.is_configured("location_source_value") {
                    ctx.warn("location is not available; location_id left empty");
                }
                vec![None; rows.len()]
            }
        };

        let mut output = OutputFrame::new(table, rows.len());
        output
            .ids("person_id")
            .ints("gender_concept_id", gender_concepts)
            .ints("year_of_birth", years)
            .ints("month_of_birth", months)
            .ints("day_of_birth", days)
            .datetimes("birth_datetime", &births)
            .constant("race_concept_id", 0)
            .constant("ethnicity_concept_id", 0)
            .ints("location_id", location_ids)
            .strings("person_source_value", pick(&patients, &rows))
            .strings("gender_source_value", genders)
            .constant("gender_source_concept_id", 0)
            .strings(
                "race_source_value",
                pick(&fields.optional_or_null("race_source_value")?, &rows),
            )
            .constant("race_source_concept_id", 0)
            .strings(
                "ethnicity_source_value",
                pick(&fields.optional_or_null("ethnicity_source_value")?, &rows),
            )
            .constant("ethnicity_source_concept_id", 0);
        output.finish()
    }
}
