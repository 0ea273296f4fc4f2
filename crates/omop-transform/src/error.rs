//! Stage and planning errors.

use std::path::PathBuf;

use omop_model::CdmTable;
use omop_vocab::VocabError;
use thiserror::Error;

/// A failure of one stage. The scheduler records it and skips dependents.
#[derive(Debug, Error)]
pub enum TransformError {
    /// No column configured for a required logical field.
    #[error("{table}: no column configured for field '{field}'")]
    MissingField { table: CdmTable, field: String },

    /// The configured header is absent from the source files.
    #[error("{table}: source column '{column}' (field '{field}') not found")]
    MissingSourceColumn {
        table: CdmTable,
        field: String,
        column: String,
    },

    #[error("{table}: no transformer registered")]
    NoTransformer { table: CdmTable },

    #[error("{table}: no source data supplied")]
    MissingSource { table: CdmTable },

    #[error("{table}: no vocabulary concept data supplied")]
    MissingConcepts { table: CdmTable },

    /// An event table with no `local_*` table to resolve its codes against.
    #[error("{table}: no mapping table declared for code resolution")]
    NoMappingSource { table: CdmTable },

    /// A required dependency frame was not handed to the stage.
    #[error("{table}: dependency {dependency} is not available")]
    MissingDependency {
        table: CdmTable,
        dependency: CdmTable,
    },

    /// Joining the source against a dependency left nothing.
    #[error("{table}: join with {dependency} produced no rows from {source_rows} source rows")]
    EmptyJoin {
        table: CdmTable,
        dependency: CdmTable,
        source_rows: usize,
    },

    /// A transformer produced a column outside its table layout.
    #[error("{table}: column '{column}' is not part of the table layout")]
    Layout { table: CdmTable, column: String },

    #[error("{table}: {source}")]
    Vocab {
        table: CdmTable,
        #[source]
        source: VocabError,
    },

    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for TransformError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;

/// Errors found while ordering stages, before anything runs.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "{table} depends on {dependency}, which is not scheduled and has no output at {path}"
    )]
    MissingDependency {
        table: CdmTable,
        dependency: CdmTable,
        path: PathBuf,
    },

    #[error("{table} was requested but has no section in the config")]
    NotConfigured { table: CdmTable },

    #[error("dependency cycle among: {tables}")]
    Cycle { tables: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dependency_display() {
        let err = PlanError::MissingDependency {
            table: CdmTable::DrugExposure,
            dependency: CdmTable::LocalEdi,
            path: PathBuf::from("/cdm/local_edi.csv"),
        };
        assert_eq!(
            err.to_string(),
            "drug_exposure depends on local_edi, which is not scheduled and has no output at /cdm/local_edi.csv"
        );
    }

    #[test]
    fn test_error_from_polars() {
        let polars_err = polars::prelude::PolarsError::ColumnNotFound("x".into());
        let err: TransformError = polars_err.into();
        assert!(matches!(err, TransformError::DataFrame { .. }));
    }
}
