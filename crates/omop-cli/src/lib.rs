//! Library side of the `omop-etl` binary: logging setup and the stage runner.

pub mod logging;
pub mod pipeline;
pub mod types;
