use omop_model::CdmTable;
use omop_model::concepts::visit_concept;
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::Result;
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::ops::{OutputFrame, first_occurrence, kept_rows, pick};
use crate::transformers::TableTransformer;

/// One care site per department code.
pub struct CareSiteTransformer;

impl TableTransformer for CareSiteTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::CareSite
    }

    fn description(&self) -> &'static str {
        "Departments as care sites"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["care_site_source_value"]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &["care_site_name", "place_of_service_source_value"]
    }

    fn transform(
        &self,
        input: &StageInput<'_>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<DataFrame> {
        let source = input.source(self.table())?;
        let fields = FieldMap::new(self.table(), ctx.config, source);
        let codes = fields.require("care_site_source_value")?;
        let missing = codes.iter().filter(|code| code.is_none()).count();
        ctx.warn_rows(
            missing,
            "care_site_source_value",
            "rows without a department code dropped",
        );

        let rows = kept_rows(&first_occurrence(&codes));
        let names = pick(&fields.optional_or_null("care_site_name")?, &rows);
        let places = pick(
            &fields.optional_or_null("place_of_service_source_value")?,
            &rows,
        );
        let place_concepts: Vec<Option<i64>> = places
            .iter()
            .map(|place| Some(place.as_deref().map_or(0, visit_concept)))
            .collect();

        let mut output = OutputFrame::new(self.table(), rows.len());
        output
            .ids("care_site_id")
            .strings("care_site_name", names)
            .ints("place_of_service_concept_id", place_concepts)
            .strings("care_site_source_value", pick(&codes, &rows))
            .strings("place_of_service_source_value", places);
        output.finish()
    }
}
