//! CLI argument definitions for `omop-etl`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colorchoice_clap::Color;
use omop_model::CdmTable;

#[derive(Parser)]
#[command(
    name = "omop-etl",
    version,
    about = "Convert hospital EHR exports to OMOP CDM tables",
    long_about = "Convert hospital EHR exports to OMOP CDM tables.\n\n\
                  Reads a site config (YAML), runs the configured table stages in\n\
                  dependency order and writes one CSV per table to CDM_path."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the stages of a site config.
    Run(RunArgs),

    /// Print the stage order a run would use.
    Plan(PlanArgs),

    /// List the supported CDM tables.
    Tables,
}

#[derive(Args)]
pub struct RunArgs {
    /// Site config file (YAML).
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Run only these tables (comma separated or repeated).
    ///
    /// Dependencies that are not listed must already have their output in
    /// CDM_path.
    #[arg(long = "only", value_name = "TABLE", value_delimiter = ',')]
    pub only: Vec<CdmTable>,

    /// Stop at the first failing stage.
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Transform and report without writing any file.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Site config file (YAML).
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Plan only these tables.
    #[arg(long = "only", value_name = "TABLE", value_delimiter = ',')]
    pub only: Vec<CdmTable>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
