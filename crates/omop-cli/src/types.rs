use std::path::PathBuf;
use std::time::Duration;

use omop_model::CdmTable;
use omop_transform::Diagnostic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// Transformed and written.
    Succeeded,
    /// Transformed; nothing written because of `--dry-run`.
    Checked,
    Failed { error: String },
    /// Not run because a stage it depends on failed.
    Skipped { dependency: CdmTable },
}

impl StageStatus {
    pub fn is_problem(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "ok",
            Self::Checked => "checked",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub table: CdmTable,
    pub status: StageStatus,
    pub rows: Option<usize>,
    pub duration: Duration,
    pub output: Option<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

impl StageReport {
    pub fn skipped(table: CdmTable, dependency: CdmTable) -> Self {
        Self {
            table,
            status: StageStatus::Skipped { dependency },
            rows: None,
            duration: Duration::ZERO,
            output: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == omop_transform::DiagnosticLevel::Warning)
            .count()
    }
}

#[derive(Debug)]
pub struct RunResult {
    pub config: PathBuf,
    pub cdm_path: PathBuf,
    pub stages: Vec<StageReport>,
    pub manifest: Option<PathBuf>,
    /// Set when `--fail-fast` stopped the run before every stage ran.
    pub halted: bool,
}

impl RunResult {
    pub fn has_errors(&self) -> bool {
        self.halted || self.stages.iter().any(|s| s.status.is_problem())
    }

    pub fn stage(&self, table: CdmTable) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.table == table)
    }
}
