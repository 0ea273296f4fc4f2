//! Stage ordering.
//!
//! Stages form a DAG through [`CdmTable::dependencies`]. A dependency that is
//! not scheduled in this run must already have its output in `CDM_path`;
//! otherwise planning fails before any stage runs.

use std::collections::{BTreeMap, BTreeSet};

use omop_model::{CdmTable, SiteConfig};

use crate::error::PlanError;

/// One scheduled stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub table: CdmTable,
    /// Dependencies produced earlier in this run.
    pub upstream: Vec<CdmTable>,
    /// Dependencies read back from `CDM_path`.
    pub from_disk: Vec<CdmTable>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub stages: Vec<PlannedStage>,
}

impl ExecutionPlan {
    /// Plans the configured tables, or only `only` when it is not empty,
    /// checking earlier outputs on the filesystem.
    pub fn for_site(site: &SiteConfig, only: &[CdmTable]) -> Result<Self, PlanError> {
        Self::build(site, only, |table| site.output_path(table).is_file())
    }

    /// Plans with an explicit test for existing outputs.
    pub fn build<F>(site: &SiteConfig, only: &[CdmTable], output_exists: F) -> Result<Self, PlanError>
    where
        F: Fn(CdmTable) -> bool,
    {
        let scheduled: BTreeSet<CdmTable> = if only.is_empty() {
            site.configured_tables().into_iter().collect()
        } else {
            for table in only {
                if site.table(*table).is_none() {
                    return Err(PlanError::NotConfigured { table: *table });
                }
            }
            only.iter().copied().collect()
        };

        let mut upstream: BTreeMap<CdmTable, Vec<CdmTable>> = BTreeMap::new();
        let mut from_disk: BTreeMap<CdmTable, Vec<CdmTable>> = BTreeMap::new();
        for table in &scheduled {
            let mut in_run = Vec::new();
            let mut on_disk = Vec::new();
            for dependency in table.dependencies() {
                if scheduled.contains(dependency) {
                    in_run.push(*dependency);
                } else if output_exists(*dependency) {
                    on_disk.push(*dependency);
                } else {
                    return Err(PlanError::MissingDependency {
                        table: *table,
                        dependency: *dependency,
                        path: site.output_path(*dependency),
                    });
                }
            }
            for dependency in table.optional_dependencies() {
                if scheduled.contains(dependency) {
                    in_run.push(*dependency);
                } else if output_exists(*dependency) {
                    on_disk.push(*dependency);
                }
            }
            upstream.insert(*table, in_run);
            from_disk.insert(*table, on_disk);
        }

        let order = topological_order(&scheduled, &upstream)?;
        let stages = order
            .into_iter()
            .map(|table| PlannedStage {
                table,
                upstream: upstream.remove(&table).unwrap_or_default(),
                from_disk: from_disk.remove(&table).unwrap_or_default(),
            })
            .collect();
        Ok(Self { stages })
    }

    pub fn tables(&self) -> Vec<CdmTable> {
        self.stages.iter().map(|stage| stage.table).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Kahn's algorithm; among ready stages the earliest declared runs first.
fn topological_order(
    scheduled: &BTreeSet<CdmTable>,
    upstream: &BTreeMap<CdmTable, Vec<CdmTable>>,
) -> Result<Vec<CdmTable>, PlanError> {
    let mut pending: BTreeMap<CdmTable, usize> = scheduled
        .iter()
        .map(|table| (*table, upstream.get(table).map_or(0, Vec::len)))
        .collect();
    let mut ready: BTreeSet<CdmTable> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(table, _)| *table)
        .collect();
    let mut order = Vec::with_capacity(scheduled.len());

    while let Some(table) = ready.pop_first() {
        pending.remove(&table);
        order.push(table);
        for (dependent, deps) in upstream {
            if deps.contains(&table)
                && let Some(count) = pending.get_mut(dependent)
            {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if pending.is_empty() {
        Ok(order)
    } else {
        let tables = pending
            .keys()
            .map(|table| table.name())
            .collect::<Vec<_>>()
            .join(", ");
        Err(PlanError::Cycle { tables })
    }
}
