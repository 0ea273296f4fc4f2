//! Configuration errors.
//!
//! Any of these aborts a run before the first stage starts.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be opened.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML syntax error or a missing top-level key.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A key required by the configured tables is absent.
    #[error("missing required config key '{key}'")]
    MissingKey { key: String },

    /// A top-level key that is neither a setting nor a CDM table.
    #[error("unknown table '{name}' in config")]
    UnknownTable { name: String },

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
