//! Frames passed between stages.

use std::collections::BTreeMap;

use omop_model::CdmTable;
use polars::prelude::DataFrame;

use crate::error::{Result, TransformError};

/// The output of one stage: a frame in the table's column layout.
#[derive(Debug, Clone)]
pub struct CdmFrame {
    pub table: CdmTable,
    pub data: DataFrame,
}

impl CdmFrame {
    pub fn new(table: CdmTable, data: DataFrame) -> Self {
        Self { table, data }
    }

    pub fn record_count(&self) -> usize {
        self.data.height()
    }
}

/// CDM frames available to later stages, produced in this run or read back
/// from `CDM_path`.
#[derive(Debug, Clone, Default)]
pub struct CdmTables {
    frames: BTreeMap<CdmTable, DataFrame>,
}

impl CdmTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: CdmTable, data: DataFrame) {
        self.frames.insert(table, data);
    }

    pub fn get(&self, table: CdmTable) -> Option<&DataFrame> {
        self.frames.get(&table)
    }

    pub fn contains(&self, table: CdmTable) -> bool {
        self.frames.contains_key(&table)
    }

    /// A dependency the stage `table` cannot run without.
    pub fn require(&self, table: CdmTable, dependency: CdmTable) -> Result<&DataFrame> {
        self.get(dependency)
            .ok_or(TransformError::MissingDependency { table, dependency })
    }
}

/// Everything a stage reads.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    /// Stacked source files of the table.
    pub source: Option<&'a DataFrame>,
    /// Vocabulary concept table for the mapping stages.
    pub concepts: Option<&'a DataFrame>,
    pub tables: &'a CdmTables,
}

impl<'a> StageInput<'a> {
    pub fn new(tables: &'a CdmTables) -> Self {
        Self {
            source: None,
            concepts: None,
            tables,
        }
    }

    pub fn with_source(mut self, source: &'a DataFrame) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_concepts(mut self, concepts: &'a DataFrame) -> Self {
        self.concepts = Some(concepts);
        self
    }

    pub fn source(&self, table: CdmTable) -> Result<&'a DataFrame> {
        self.source.ok_or(TransformError::MissingSource { table })
    }

    pub fn concepts(&self, table: CdmTable) -> Result<&'a DataFrame> {
        self.concepts.ok_or(TransformError::MissingConcepts { table })
    }
}
