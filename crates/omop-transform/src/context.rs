//! Per-stage execution context and diagnostics.
//!
//! A [`TransformContext`] is created for one stage run and dropped with it.
//! Warnings raised by a transformer are recorded here and emitted as
//! `tracing` events in the stage's span; nothing is kept in global state.

use omop_model::{CdmTable, SiteConfig, TableConfig};

/// Runtime context of one stage.
#[derive(Debug)]
pub struct TransformContext<'a> {
    pub table: CdmTable,
    pub site: &'a SiteConfig,
    pub config: &'a TableConfig,
    diagnostics: Diagnostics,
}

impl<'a> TransformContext<'a> {
    pub fn new(table: CdmTable, site: &'a SiteConfig, config: &'a TableConfig) -> Self {
        Self {
            table,
            site,
            config,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Records a warning and logs it.
    pub fn warn(&mut self, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(message);
        tracing::warn!(table = %self.table, "{}", diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    /// Records a warning about `count` rows of one field, if any.
    pub fn warn_rows(&mut self, count: usize, field: &str, message: &str) {
        if count == 0 {
            return;
        }
        let diagnostic = Diagnostic::warning(message)
            .with_field(field)
            .with_count(count);
        tracing::warn!(table = %self.table, field, count, "{message}");
        self.diagnostics.push(diagnostic);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let diagnostic = Diagnostic::info(message);
        tracing::info!(table = %self.table, "{}", diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    /// Informational message.
    Info,
    /// The stage succeeded but rows were dropped, defaulted or ambiguous.
    Warning,
}

/// A diagnostic message from a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    /// Logical field concerned, if any.
    pub field: Option<String>,
    /// Number of rows concerned, if any.
    pub count: Option<usize>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
            field: None,
            count: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            message: message.into(),
            field: None,
            count: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

/// Diagnostics collected by one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn warnings_are_collected_per_context() {
        let site = SiteConfig::from_yaml_str("source_path: s\nCDM_path: c\n", Path::new(""))
            .unwrap();
        let config = TableConfig::default();
        let mut ctx = TransformContext::new(CdmTable::Person, &site, &config);
        ctx.warn_rows(0, "birth_datetime", "unparsable birth date");
        ctx.warn_rows(3, "birth_datetime", "unparsable birth date");
        ctx.info("loaded");
        let diagnostics = ctx.into_diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.warning_count(), 1);
        let first = diagnostics.iter().next().unwrap();
        assert_eq!(first.count, Some(3));
        assert_eq!(first.field.as_deref(), Some("birth_datetime"));
    }
}
