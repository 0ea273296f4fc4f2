use omop_common::parse_i64;
use omop_model::CdmTable;
use omop_model::concepts::gender_concept;
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::Result;
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::ops::{OutputFrame, first_occurrence, id_lookup, kept_rows, lookup_all, pick};
use crate::transformers::TableTransformer;

/// One provider per provider code, linked to its care site.
pub struct ProviderTransformer;

impl TableTransformer for ProviderTransformer {
    fn table(&self) -> CdmTable {
        CdmTable::Provider
    }

    fn description(&self) -> &'static str {
        "Distinct providers with their care site"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["provider_source_value"]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[
            "provider_name",
            "care_site_source_value",
            "specialty_source_value",
            "gender_source_value",
            "year_of_birth",
        ]
    }

    fn transform(
        &self,
        input: &StageInput<'_>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<DataFrame> {
        let table = self.table();
        let source = input.source(table)?;
        let care_sites = input.tables.require(table, CdmTable::CareSite)?;
        let fields = FieldMap::new(table, ctx.config, source);

        let codes = fields.require("provider_source_value")?;
        let missing = codes.iter().filter(|code| code.is_none()).count();
        ctx.warn_rows(
            missing,
            "provider_source_value",
            "rows without a provider code dropped",
        );
        let rows = kept_rows(&first_occurrence(&codes));

        let departments = pick(&fields.optional_or_null("care_site_source_value")?, &rows);
        let lookup = id_lookup(care_sites, "care_site_source_value", "care_site_id")?;
        let care_site_ids = lookup_all(&lookup, &departments);
        let unknown = departments
            .iter()
            .zip(&care_site_ids)
            .filter(|(code, id)| code.is_some() && id.is_none())
            .count();
        ctx.warn_rows(
            unknown,
            "care_site_source_value",
            "department not found in care_site",
        );

        let genders = pick(&fields.optional_or_null("gender_source_value")?, &rows);
        let gender_concepts: Vec<Option<i64>> = genders
            .iter()
            .map(|gender| gender.as_deref().map(gender_concept))
            .collect();
        let years: Vec<Option<i64>> = pick(&fields.optional_or_null("year_of_birth")?, &rows)
            .iter()
            .map(|year| year.as_deref().and_then(parse_i64))
            .collect();

        let mut output = OutputFrame::new(table, rows.len());
        output
            .ids("provider_id")
            .strings(
                "provider_name",
                pick(&fields.optional_or_null("provider_name")?, &rows),
            )
            .constant("specialty_concept_id", 0)
            .ints("care_site_id", care_site_ids)
            .ints("year_of_birth", years)
            .ints("gender_concept_id", gender_concepts)
            .strings("provider_source_value", pick(&codes, &rows))
            .strings(
                "specialty_source_value",
                pick(&fields.optional_or_null("specialty_source_value")?, &rows),
            )
            .constant("specialty_source_concept_id", 0)
            .strings("gender_source_value", genders)
            .constant("gender_source_concept_id", 0);
        output.finish()
    }
}
