use anyhow::Result;
use comfy_table::Table;
use omop_cli::pipeline::{self, RunOptions};
use omop_model::CdmTable;
use tracing::info_span;

use crate::cli::{PlanArgs, RunArgs};
use crate::summary::{apply_table_style, print_plan, print_summary};

pub fn run_tables() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Table", "Depends on", "Columns"]);
    apply_table_style(&mut table);
    for cdm_table in CdmTable::ALL {
        let dependencies = cdm_table
            .dependencies()
            .iter()
            .chain(cdm_table.optional_dependencies())
            .map(|d| d.name())
            .collect::<Vec<_>>();
        table.add_row(vec![
            cdm_table.name().to_string(),
            if dependencies.is_empty() {
                "-".to_string()
            } else {
                dependencies.join(", ")
            },
            cdm_table.columns().join(", "),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn run_plan(args: &PlanArgs) -> Result<()> {
    let (site, plan) = pipeline::plan_site(&args.config, &args.only)?;
    print_plan(&site, &plan);
    Ok(())
}

/// Runs a site and prints the summary; `Ok(true)` when a stage failed or
/// was skipped.
pub fn run_site(args: &RunArgs) -> Result<bool> {
    let span = info_span!("site", config = %args.config.display());
    let _guard = span.enter();
    let options = RunOptions {
        only: args.only.clone(),
        fail_fast: args.fail_fast,
        dry_run: args.dry_run,
    };
    let result = pipeline::run_site(&args.config, &options)?;
    print_summary(&result);
    Ok(result.has_errors())
}
