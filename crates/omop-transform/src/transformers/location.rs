use omop_model::CdmTable;
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::Result;
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::ops::{OutputFrame, first_occurrence, kept_rows, pick};
use crate::transformers::TableTransformer;

const ADDRESS_FIELDS: &[&str] = &["address_1", "address_2", "city", "state", "county"];

/// Distinct patient locations keyed by postal code.
pub struct LocationTransformer;

impl TableTransformer for LocationTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::Location
    }

    fn description(&self) -> &'static str {
        "Distinct locations keyed by postal code"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["location_source_value"]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        ADDRESS_FIELDS
    }

    fn transform(
        &self,
        input: &StageInput<'_>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<DataFrame> {
        let source = input.source(self.table())?;
        let fields = FieldMap::new(self.table(), ctx.config, source);
        let keys = fields.require("location_source_value")?;
        let missing = keys.iter().filter(|key| key.is_none()).count();
        ctx.warn_rows(
            missing,
            "location_source_value",
            "rows without a location code dropped",
        );

        let rows = kept_rows(&first_occurrence(&keys));
        let keys = pick(&keys, &rows);
        let mut output = OutputFrame::new(self.table(), rows.len());
        output
            .ids("location_id")
            .strings("zip", keys.clone())
            .strings("location_source_value", keys);
        for field in ADDRESS_FIELDS {
            let values = fields.optional_or_null(field)?;
            output.strings(*field, pick(&values, &rows));
        }
        output.finish()
    }
}
