//! CSV ingestion for the OMOP ETL.
//!
//! Source exports arrive in site-specific encodings (often CP949) and are
//! loaded into all-string Polars `DataFrame`s:
//!
//! - cells are trimmed, empty cells become null
//! - a UTF-8 BOM and surrounding whitespace are stripped from headers
//! - several files configured for one table are stacked over the union of
//!   their headers
//!
//! CDM tables written by earlier runs are read back through the same path.

mod encoding;
mod error;
mod reader;

pub use encoding::{decode_bytes, resolve_encoding};
pub use error::{IngestError, Result};
pub use reader::{parse_delimited, read_cdm_table, read_delimited, read_sources};
