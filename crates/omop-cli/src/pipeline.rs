//! Runs the planned stages of one site.
//!
//! Each stage loads its sources and any dependency read back from
//! `CDM_path`, runs its transformer, and writes its CSV. A failing stage is
//! recorded and every stage downstream of it is skipped; `fail_fast` stops
//! the run at the first failure instead.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use omop_ingest::{read_cdm_table, read_delimited, read_sources, resolve_encoding};
use omop_model::{CdmTable, SiteConfig};
use omop_output::{Manifest, WrittenTable, write_cdm_csv};
use omop_transform::{
    CdmFrame, CdmTables, ExecutionPlan, PlannedStage, StageInput, TransformContext,
    TransformerRegistry, default_registry,
};
use polars::prelude::DataFrame;
use tracing::{debug, error, info, info_span, warn};

use crate::types::{RunResult, StageReport, StageStatus};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run only these tables; empty runs every configured table.
    pub only: Vec<CdmTable>,
    pub fail_fast: bool,
    /// Transform without writing any file.
    pub dry_run: bool,
}

#[derive(Clone, Copy)]
struct Encodings {
    source: &'static Encoding,
    cdm: &'static Encoding,
}

/// Loads a site config and checks it against the registered transformers.
pub fn load_site(config_path: &Path) -> Result<SiteConfig> {
    let site = SiteConfig::load(config_path)
        .with_context(|| format!("load site config {}", config_path.display()))?;
    default_registry()
        .validate(&site)
        .with_context(|| format!("invalid site config {}", config_path.display()))?;
    Ok(site)
}

/// Plans the run without executing it.
pub fn plan_site(config_path: &Path, only: &[CdmTable]) -> Result<(SiteConfig, ExecutionPlan)> {
    let site = load_site(config_path)?;
    let plan = ExecutionPlan::for_site(&site, only).context("plan stages")?;
    Ok((site, plan))
}

/// Loads, plans and runs a site config.
///
/// Configuration and planning errors abort before any stage runs; stage
/// errors are reported per stage in the result.
pub fn run_site(config_path: &Path, options: &RunOptions) -> Result<RunResult> {
    let (site, plan) = plan_site(config_path, &options.only)?;
    let encodings = Encodings {
        source: resolve_encoding(&site.source_encoding).context("source_encoding")?,
        cdm: resolve_encoding(&site.cdm_encoding).context("cdm_encoding")?,
    };
    let run_span = info_span!("run", config = %config_path.display(), stages = plan.len());
    let _run_guard = run_span.enter();
    info!(order = %format_order(&plan), "planned stages");

    let mut runner = Runner {
        site: &site,
        registry: default_registry(),
        encodings,
        options,
        tables: CdmTables::new(),
        failed: BTreeSet::new(),
    };
    let mut reports = Vec::with_capacity(plan.len());
    let mut written = Vec::new();
    let mut halted = false;
    for stage in &plan.stages {
        let (report, output) = runner.run(stage);
        let failed = matches!(report.status, StageStatus::Failed { .. });
        reports.push(report);
        written.extend(output);
        if failed && options.fail_fast {
            halted = reports.len() < plan.len();
            if halted {
                warn!("fail-fast: remaining stages not run");
            }
            break;
        }
    }

    let manifest = if options.dry_run || written.is_empty() {
        None
    } else {
        Some(update_manifest(&site, &written)?)
    };
    Ok(RunResult {
        config: config_path.to_path_buf(),
        cdm_path: site.cdm_path.clone(),
        stages: reports,
        manifest,
        halted,
    })
}

fn format_order(plan: &ExecutionPlan) -> String {
    plan.tables()
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn update_manifest(site: &SiteConfig, written: &[WrittenTable]) -> Result<PathBuf> {
    let mut manifest = Manifest::load_or_default(&site.cdm_path)?;
    manifest.cdm_encoding = site.cdm_encoding.clone();
    for table in written {
        manifest.record(table);
    }
    let path = manifest.write(&site.cdm_path)?;
    debug!(path = %path.display(), tables = manifest.tables.len(), "manifest updated");
    Ok(path)
}

struct Runner<'a> {
    site: &'a SiteConfig,
    registry: &'a TransformerRegistry,
    encodings: Encodings,
    options: &'a RunOptions,
    tables: CdmTables,
    /// Failed and skipped tables.
    failed: BTreeSet<CdmTable>,
}

impl Runner<'_> {
    fn run(&mut self, stage: &PlannedStage) -> (StageReport, Option<WrittenTable>) {
        let table = stage.table;
        let span = info_span!("stage", %table);
        let _guard = span.enter();

        if let Some(dependency) = stage.upstream.iter().find(|d| self.failed.contains(*d)) {
            warn!(%dependency, "skipped: dependency failed");
            self.failed.insert(table);
            return (StageReport::skipped(table, *dependency), None);
        }

        let started = Instant::now();
        let outcome = self.transform(stage).and_then(|(frame, diagnostics)| {
            let written = if self.options.dry_run {
                None
            } else {
                let path = self.site.output_path(table);
                Some(write_cdm_csv(table, &path, &frame.data, self.encodings.cdm)?)
            };
            Ok((frame, diagnostics, written))
        });
        let duration = started.elapsed();

        match outcome {
            Ok((frame, diagnostics, written)) => {
                let rows = frame.record_count();
                info!(rows, elapsed_ms = duration.as_millis() as u64, "stage complete");
                self.tables.insert(table, frame.data);
                let report = StageReport {
                    table,
                    status: if written.is_some() {
                        StageStatus::Succeeded
                    } else {
                        StageStatus::Checked
                    },
                    rows: Some(rows),
                    duration,
                    output: written.as_ref().map(|w| w.path.clone()),
                    diagnostics,
                };
                (report, written)
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(error = %message, "stage failed");
                self.failed.insert(table);
                let report = StageReport {
                    table,
                    status: StageStatus::Failed { error: message },
                    rows: None,
                    duration,
                    output: None,
                    diagnostics: Vec::new(),
                };
                (report, None)
            }
        }
    }

    fn transform(
        &mut self,
        stage: &PlannedStage,
    ) -> Result<(CdmFrame, Vec<omop_transform::Diagnostic>)> {
        let table = stage.table;
        for dependency in &stage.from_disk {
            if self.tables.contains(*dependency) {
                continue;
            }
            let path = self.site.output_path(*dependency);
            let frame = read_cdm_table(&path, self.encodings.cdm)
                .with_context(|| format!("read {dependency} output {}", path.display()))?;
            debug!(%dependency, rows = frame.height(), "dependency loaded from disk");
            self.tables.insert(*dependency, frame);
        }

        let config = self
            .site
            .table(table)
            .ok_or_else(|| anyhow!("{table} is not configured"))?;
        let source = if table.needs_source() {
            Some(self.load_sources(table, config.delimiter())?)
        } else {
            None
        };
        let concepts = match self.site.concept_file(table) {
            Some(path) => Some(
                read_delimited(&path, self.encodings.source, config.concept_delimiter())
                    .with_context(|| format!("read concepts {}", path.display()))?,
            ),
            None => None,
        };

        let mut input = StageInput::new(&self.tables);
        if let Some(source) = &source {
            input = input.with_source(source);
        }
        if let Some(concepts) = &concepts {
            input = input.with_concepts(concepts);
        }
        let mut ctx = TransformContext::new(table, self.site, config);
        let frame = self.registry.run(&input, &mut ctx)?;
        let diagnostics = ctx.into_diagnostics().iter().cloned().collect();
        Ok((frame, diagnostics))
    }

    fn load_sources(&self, table: CdmTable, delimiter: u8) -> Result<DataFrame> {
        let files = self.site.source_files(table);
        let frame = read_sources(&files, self.encodings.source, delimiter)
            .with_context(|| format!("read {table} sources"))?;
        debug!(files = files.len(), rows = frame.height(), "sources loaded");
        Ok(frame)
    }
}
