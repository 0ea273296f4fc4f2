//! CDM output: one CSV per table in `CDM_path` plus `manifest.json`.
//!
//! Columns are written in the table's fixed layout, nulls as empty cells,
//! encoded with the configured `cdm_encoding`. Each written file is hashed
//! so repeated runs can be compared byte for byte.

mod error;
mod manifest;
mod writer;

pub use error::{OutputError, Result};
pub use manifest::{MANIFEST_FILE, Manifest, ManifestEntry};
pub use writer::{WrittenTable, render_csv, write_cdm_csv};
