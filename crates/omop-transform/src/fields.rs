//! Declarative field mapping from logical names to source headers.

use omop_common::string_values;
use omop_model::{CaseInsensitiveSet, CdmTable, TableConfig};
use polars::prelude::{Column, DataFrame};

use crate::error::{Result, TransformError};

/// Resolves the `columns:` section of a table config against a source frame.
///
/// Header lookup ignores ASCII case.
#[derive(Debug)]
pub struct FieldMap<'a> {
    table: CdmTable,
    config: &'a TableConfig,
    source: &'a DataFrame,
    headers: CaseInsensitiveSet,
}

impl<'a> FieldMap<'a> {
    pub fn new(table: CdmTable, config: &'a TableConfig, source: &'a DataFrame) -> Self {
        let headers = CaseInsensitiveSet::new(
            source
                .get_column_names()
                .into_iter()
                .map(|name| name.as_str()),
        );
        Self {
            table,
            config,
            source,
            headers,
        }
    }

    pub fn height(&self) -> usize {
        self.source.height()
    }

    pub fn is_configured(&self, field: &str) -> bool {
        self.config.column(field).is_some()
    }

    fn header(&self, field: &str) -> Result<Option<&str>> {
        let Some(column) = self.config.column(field) else {
            return Ok(None);
        };
        self.headers
            .get(column)
            .map(Some)
            .ok_or_else(|| TransformError::MissingSourceColumn {
                table: self.table,
                field: field.to_string(),
                column: column.to_string(),
            })
    }

    /// Values of a field that must be configured and present.
    pub fn require(&self, field: &str) -> Result<Vec<Option<String>>> {
        let header = self
            .header(field)?
            .ok_or_else(|| TransformError::MissingField {
                table: self.table,
                field: field.to_string(),
            })?;
        Ok(string_values(self.source, header)?)
    }

    /// Values of an optional field; `None` when it is not configured.
    pub fn optional(&self, field: &str) -> Result<Option<Vec<Option<String>>>> {
        match self.header(field)? {
            Some(header) => Ok(Some(string_values(self.source, header)?)),
            None => Ok(None),
        }
    }

    /// Values of an optional field, all null when it is not configured.
    pub fn optional_or_null(&self, field: &str) -> Result<Vec<Option<String>>> {
        Ok(self
            .optional(field)?
            .unwrap_or_else(|| vec![None; self.height()]))
    }

    /// A frame of the configured fields renamed to their logical names.
    ///
    /// Unconfigured fields are left out.
    pub fn logical_frame(&self, fields: &[&str]) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::new();
        for field in fields {
            if let Some(header) = self.header(field)? {
                let column = self.source.column(header)?;
                columns.push(column.clone().with_name((*field).into()));
            }
        }
        Ok(DataFrame::new(columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omop_common::string_column;

    fn source() -> DataFrame {
        DataFrame::new(vec![
            string_column("PatNo", vec![Some("P1".to_string())]),
            string_column("SEX", vec![Some("M".to_string())]),
        ])
        .unwrap()
    }

    fn config() -> TableConfig {
        let mut config = TableConfig::default();
        config
            .columns
            .insert("person_source_value".to_string(), "PATNO".to_string());
        config
            .columns
            .insert("race_source_value".to_string(), "RACE".to_string());
        config
    }

    #[test]
    fn header_match_ignores_case() {
        let source = source();
        let config = config();
        let fields = FieldMap::new(CdmTable::Person, &config, &source);
        assert_eq!(
            fields.require("person_source_value").unwrap(),
            vec![Some("P1".to_string())]
        );
    }

    #[test]
    fn unconfigured_and_absent_fields() {
        let source = source();
        let config = config();
        let fields = FieldMap::new(CdmTable::Person, &config, &source);
        assert!(matches!(
            fields.require("gender_source_value"),
            Err(TransformError::MissingField { .. })
        ));
        assert!(fields.optional("ethnicity_source_value").unwrap().is_none());
        assert!(matches!(
            fields.optional("race_source_value"),
            Err(TransformError::MissingSourceColumn { ref column, .. }) if column == "RACE"
        ));
    }

    #[test]
    fn logical_frame_renames() {
        let source = source();
        let config = config();
        let fields = FieldMap::new(CdmTable::Person, &config, &source);
        let frame = fields.logical_frame(&["person_source_value"]).unwrap();
        assert_eq!(
            string_values(&frame, "person_source_value").unwrap(),
            vec![Some("P1".to_string())]
        );
    }
}
