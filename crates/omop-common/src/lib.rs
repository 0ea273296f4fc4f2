//! Shared utilities for the OMOP ETL crates.
//!
//! Every source and CDM table travels through the pipeline as a Polars
//! `DataFrame`. Columns read from CSV are strings; columns produced by a
//! transformer may be typed. The helpers here read cells through `AnyValue`
//! so callers never care which of the two they were handed.

pub mod dates;
pub mod frame;

pub use dates::{format_date, format_datetime, open_end, open_start, parse_date, parse_datetime};
pub use frame::{
    any_to_i64, any_to_string, cell_string, format_numeric, has_column, i64_column,
    i64_values, parse_f64, parse_i64, string_column, string_values,
};
