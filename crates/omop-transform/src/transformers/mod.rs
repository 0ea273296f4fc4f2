//! Table transformer trait and registry.
//!
//! Each CDM table is produced by one [`TableTransformer`]. Transformers are
//! registered in a [`TransformerRegistry`] keyed by [`CdmTable`]; the
//! scheduler looks them up by table and hands each one its [`StageInput`]
//! and a fresh [`TransformContext`].
//!
//! A transformer declares the logical fields it reads. The site config maps
//! those names to hospital headers (`columns:`), and
//! [`TransformerRegistry::validate`] checks every configured table against
//! its transformer before anything runs.

mod care_site;
mod condition;
mod drug;
mod events;
mod local_codes;
mod location;
mod measurement;
mod observation_period;
mod person;
mod procedure;
mod provider;
mod visit;

use std::collections::HashMap;
use std::sync::OnceLock;

use omop_model::{CdmTable, ConfigError, SiteConfig};
use polars::prelude::DataFrame;

use crate::context::TransformContext;
use crate::error::{Result, TransformError};
use crate::frame::{CdmFrame, StageInput};

pub use care_site::CareSiteTransformer;
pub use condition::ConditionTransformer;
pub use drug::DrugExposureTransformer;
pub use local_codes::LocalCodeTransformer;
pub use location::LocationTransformer;
pub use measurement::MeasurementTransformer;
pub use observation_period::ObservationPeriodTransformer;
pub use person::PersonTransformer;
pub use procedure::ProcedureTransformer;
pub use provider::ProviderTransformer;
pub use visit::{VisitDetailTransformer, VisitOccurrenceTransformer};

/// Produces one CDM table.
///
/// # Implementing a transformer
///
/// 1. Implement this trait for a unit struct.
/// 2. Register it in [`default_registry`].
///
/// The returned frame must follow [`CdmTable::columns`]; build it with
/// [`crate::ops::OutputFrame`].
pub trait TableTransformer: Send + Sync {
    fn table(&self) -> CdmTable;

    fn description(&self) -> &'static str {
        "CDM table transformer"
    }

    /// Logical fields that must be mapped in `columns:`.
    fn required_fields(&self) -> &'static [&'static str];

    /// Logical fields read when mapped.
    fn optional_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Builds the table.
    ///
    /// # Errors
    ///
    /// Fails when a mapped header is absent from the source, a required
    /// dependency frame is missing, or a join leaves no rows. Row-level
    /// problems are reported through `ctx` instead.
    fn transform(&self, input: &StageInput<'_>, ctx: &mut TransformContext<'_>)
    -> Result<DataFrame>;
}

/// Transformers indexed by table.
pub struct TransformerRegistry {
    transformers: HashMap<CdmTable, Box<dyn TableTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self {
            transformers: HashMap::new(),
        }
    }

    /// Registers a transformer, replacing any previous one for its table.
    pub fn register(&mut self, transformer: Box<dyn TableTransformer>) {
        self.transformers.insert(transformer.table(), transformer);
    }

    pub fn get(&self, table: CdmTable) -> Option<&dyn TableTransformer> {
        self.transformers.get(&table).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Registered tables in dependency order.
    pub fn tables(&self) -> Vec<CdmTable> {
        let mut tables: Vec<CdmTable> = self.transformers.keys().copied().collect();
        tables.sort();
        tables
    }

    /// Runs the transformer of `ctx.table`.
    pub fn run(&self, input: &StageInput<'_>, ctx: &mut TransformContext<'_>) -> Result<CdmFrame> {
        let table = ctx.table;
        let transformer = self
            .get(table)
            .ok_or(TransformError::NoTransformer { table })?;
        let data = transformer.transform(input, ctx)?;
        Ok(CdmFrame::new(table, data))
    }

    /// Checks the `columns:` section of every configured table.
    ///
    /// A required field without a header is reported as a missing key;
    /// a field the transformer does not read is rejected.
    pub fn validate(&self, site: &SiteConfig) -> std::result::Result<(), ConfigError> {
        for (table, config) in &site.tables {
            let Some(transformer) = self.get(*table) else {
                return Err(ConfigError::UnknownTable {
                    name: table.name().to_string(),
                });
            };
            for field in transformer.required_fields() {
                if config.column(field).is_none() {
                    return Err(ConfigError::MissingKey {
                        key: format!("{table}.columns.{field}"),
                    });
                }
            }
            for field in config.columns.keys() {
                let known = transformer.required_fields().contains(&field.as_str())
                    || transformer.optional_fields().contains(&field.as_str());
                if !known {
                    return Err(ConfigError::InvalidValue {
                        key: format!("{table}.columns.{field}"),
                        value: config.columns[field].clone(),
                        reason: format!("{table} does not read a field named '{field}'"),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        build_default_registry()
    }
}

static DEFAULT_REGISTRY: OnceLock<TransformerRegistry> = OnceLock::new();

/// The registry with a transformer for every [`CdmTable`].
pub fn default_registry() -> &'static TransformerRegistry {
    DEFAULT_REGISTRY.get_or_init(build_default_registry)
}

fn build_default_registry() -> TransformerRegistry {
    let mut registry = TransformerRegistry::new();
    registry.register(Box::new(LocationTransformer));
    registry.register(Box::new(CareSiteTransformer));
    registry.register(Box::new(ProviderTransformer));
    registry.register(Box::new(PersonTransformer));
    registry.register(Box::new(VisitOccurrenceTransformer));
    registry.register(Box::new(VisitDetailTransformer));
    registry.register(Box::new(LocalCodeTransformer::new(CdmTable::LocalEdi)));
    registry.register(Box::new(LocalCodeTransformer::new(CdmTable::LocalKcd)));
    registry.register(Box::new(ConditionTransformer));
    registry.register(Box::new(DrugExposureTransformer));
    registry.register(Box::new(MeasurementTransformer));
    registry.register(Box::new(ProcedureTransformer));
    registry.register(Box::new(ObservationPeriodTransformer));
    registry
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn every_table_has_a_transformer() {
        let registry = default_registry();
        assert_eq!(registry.len(), CdmTable::ALL.len());
        assert_eq!(registry.tables(), CdmTable::ALL.to_vec());
        for table in CdmTable::ALL {
            assert_eq!(registry.get(table).map(|t| t.table()), Some(table));
        }
    }

    #[test]
    fn validate_reports_missing_required_field() {
        let site = SiteConfig::from_yaml_str(
            "source_path: s\nCDM_path: c\nperson:\n  data: { source_data: p.csv }\n  columns: { person_source_value: PATNO }\n",
            Path::new(""),
        )
        .unwrap();
        let err = default_registry().validate(&site).unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingKey { ref key } if key == "person.columns.birth_datetime"
                || key == "person.columns.gender_source_value")
        );
    }

    #[test]
    fn validate_rejects_unknown_field() {
        let site = SiteConfig::from_yaml_str(
            "source_path: s\nCDM_path: c\ncare_site:\n  data: { source_data: d.csv }\n  columns: { care_site_source_value: DEPT, colour: X }\n",
            Path::new(""),
        )
        .unwrap();
        let err = default_registry().validate(&site).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "care_site.columns.colour"));
    }
}
