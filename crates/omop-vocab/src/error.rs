use thiserror::Error;

#[derive(Debug, Error)]
pub enum VocabError {
    /// An input table lacks a column the resolver needs.
    #[error("{table} is missing required column '{column}'")]
    MissingColumn { table: &'static str, column: String },

    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for VocabError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VocabError>;
