use omop_model::{CdmTable, MappingStrategy};
use omop_vocab::{
    BuildStats, MappingOptions, VocabularyPriority, build_mapping_table,
    build_prefix_mapping_table, mappings_to_frame,
};
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::{Result, TransformError};
use crate::fields::FieldMap;
use crate::frame::StageInput;
use crate::transformers::TableTransformer;

const OPTIONAL_FIELDS: &[&str] = &["external_code", "hospital_id", "valid_from", "valid_to"];

/// Builds `local_edi` or `local_kcd` from the hospital code list and the
/// vocabulary concept file.
///
/// With the exact strategy and no `external_code` mapping, the local code
/// itself is matched against concept codes.
pub struct LocalCodeTransformer {
    table: CdmTable,
}

impl LocalCodeTransformer {
    pub fn new(table: CdmTable) -> Self {
        Self { table }
    }
}

/// Concept files come with upper- or lower-case OMOP headers.
fn lowercase_headers(df: &DataFrame) -> Result<DataFrame> {
    let columns = df
        .get_columns()
        .iter()
        .map(|column| {
            let name = column.name().trim().to_ascii_lowercase();
            column.clone().with_name(name.into())
        })
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn report(stats: &BuildStats, ctx: &mut TransformContext<'_>) {
    ctx.warn_rows(
        stats.unmapped,
        "external_code",
        "local codes without a matching concept",
    );
    ctx.warn_rows(
        stats.unparsable_dates,
        "valid_from",
        "unparsable validity bounds replaced by open bounds",
    );
    ctx.warn_rows(
        stats.inverted_intervals,
        "valid_to",
        "validity intervals with valid_from after valid_to swapped",
    );
    if stats.collapsed > 0 {
        ctx.info(format!(
            "{} rows sharing a code, hospital and valid_from collapsed",
            stats.collapsed
        ));
    }
    ctx.info(format!(
        "{} of {} local codes mapped",
        stats.mapped, stats.input_rows
    ));
}

impl TableTransformer for LocalCodeTransformer {
    fn table(&self) -> CdmTable {
        self.table
    }

    fn description(&self) -> &'static str {
        match self.table {
            CdmTable::LocalKcd => "Diagnosis code to concept mapping",
            _ => "Order code to concept mapping",
        }
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["local_code"]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        OPTIONAL_FIELDS
    }

    fn transform(
        &self,
        input: &StageInput<'_>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<DataFrame> {
        let table = self.table;
        let source = input.source(table)?;
        let concepts = lowercase_headers(input.concepts(table)?)?;
        let fields = FieldMap::new(table, ctx.config, source);
        // Fail on an unmapped local_code before building anything.
        fields.require("local_code")?;

        let mut codes = fields.logical_frame(&[
            "local_code",
            "external_code",
            "hospital_id",
            "valid_from",
            "valid_to",
        ])?;
        let strategy = ctx.config.strategy(table);
        if strategy == MappingStrategy::Exact && !fields.is_configured("external_code") {
            let external = codes
                .column("local_code")?
                .clone()
                .with_name("external_code".into());
            let mut columns = codes.get_columns().to_vec();
            columns.push(external);
            codes = DataFrame::new(columns)?;
        }

        let options = MappingOptions {
            priority: VocabularyPriority::new(ctx.site.vocabulary_priority.iter().cloned()),
            unmapped: ctx.site.no_matching_concept.clone(),
            default_hospital: ctx.site.default_hospital().to_string(),
        };
        let outcome = match strategy {
            MappingStrategy::Exact => build_mapping_table(&codes, &concepts, &options),
            MappingStrategy::Prefix => build_prefix_mapping_table(&codes, &concepts, &options),
        }
        .map_err(|source| TransformError::Vocab { table, source })?;

        report(&outcome.stats, ctx);
        Ok(mappings_to_frame(&outcome.mappings)?)
    }
}
