use std::time::Duration;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use omop_cli::types::{RunResult, StageReport, StageStatus};
use omop_model::SiteConfig;
use omop_transform::{DiagnosticLevel, ExecutionPlan};

pub fn print_summary(result: &RunResult) {
    println!("Config: {}", result.config.display());
    println!("Output: {}", result.cdm_path.display());
    if let Some(path) = &result.manifest {
        println!("Manifest: {}", path.display());
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Status"),
        header_cell("Rows"),
        header_cell("Warnings"),
        header_cell("Time"),
        header_cell("Output"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);

    let mut total_rows = 0usize;
    let mut total_warnings = 0usize;
    for stage in &result.stages {
        let warnings = stage.warning_count();
        total_rows += stage.rows.unwrap_or(0);
        total_warnings += warnings;
        table.add_row(vec![
            Cell::new(stage.table.name())
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            status_cell(&stage.status),
            stage.rows.map_or_else(|| dim_cell("-"), Cell::new),
            count_cell(warnings, Color::Yellow),
            dim_cell(format_duration(stage.duration)),
            stage
                .output
                .as_ref()
                .and_then(|p| p.file_name())
                .map_or_else(|| dim_cell("-"), |name| Cell::new(name.to_string_lossy())),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        Cell::new(total_rows).add_attribute(Attribute::Bold),
        count_cell(total_warnings, Color::Yellow).add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
    ]);
    println!("{table}");
    print_diagnostics(&result.stages);

    let problems: Vec<&StageReport> = result
        .stages
        .iter()
        .filter(|s| s.status.is_problem())
        .collect();
    if !problems.is_empty() {
        eprintln!("Errors:");
        for stage in problems {
            match &stage.status {
                StageStatus::Failed { error } => eprintln!("- {}: {error}", stage.table),
                StageStatus::Skipped { dependency } => {
                    eprintln!("- {}: skipped because {dependency} failed", stage.table);
                }
                StageStatus::Succeeded | StageStatus::Checked => {}
            }
        }
    }
    if result.halted {
        eprintln!("Run halted at the first failure (--fail-fast).");
    }
}

fn print_diagnostics(stages: &[StageReport]) {
    let rows: Vec<_> = stages
        .iter()
        .flat_map(|s| s.diagnostics.iter().map(move |d| (s.table, d)))
        .filter(|(_, d)| d.level == DiagnosticLevel::Warning)
        .collect();
    if rows.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Field"),
        header_cell("Count"),
        header_cell("Message"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    for (cdm_table, diagnostic) in rows {
        table.add_row(vec![
            Cell::new(cdm_table.name()),
            diagnostic
                .field
                .as_deref()
                .map_or_else(|| dim_cell("-"), Cell::new),
            diagnostic
                .count
                .map_or_else(|| dim_cell("-"), |c| Cell::new(c).fg(Color::Yellow)),
            Cell::new(&diagnostic.message),
        ]);
    }
    println!();
    println!("Warnings:");
    println!("{table}");
}

pub fn print_plan(site: &SiteConfig, plan: &ExecutionPlan) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("#"),
        header_cell("Table"),
        header_cell("After"),
        header_cell("Read from CDM_path"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    for (position, stage) in plan.stages.iter().enumerate() {
        let names = |tables: &[omop_model::CdmTable]| {
            if tables.is_empty() {
                dim_cell("-")
            } else {
                Cell::new(
                    tables
                        .iter()
                        .map(|t| t.name())
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            }
        };
        table.add_row(vec![
            Cell::new(position + 1),
            Cell::new(stage.table.name()).add_attribute(Attribute::Bold),
            names(&stage.upstream),
            names(&stage.from_disk),
        ]);
    }
    println!("Output: {}", site.cdm_path.display());
    println!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn status_cell(status: &StageStatus) -> Cell {
    let cell = Cell::new(status.label());
    match status {
        StageStatus::Succeeded => cell.fg(Color::Green).add_attribute(Attribute::Bold),
        StageStatus::Checked => cell.fg(Color::Cyan),
        StageStatus::Failed { .. } => cell.fg(Color::Red).add_attribute(Attribute::Bold),
        StageStatus::Skipped { .. } => cell.fg(Color::Yellow),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
