//! CDM table transformers.
//!
//! Every CDM table is produced by one [`TableTransformer`] registered in a
//! [`TransformerRegistry`]. A transformer reads the stacked source frame of
//! its table through a [`FieldMap`] (logical field name to hospital header),
//! joins the CDM frames of its dependencies, and returns a frame in the
//! table's fixed column layout.
//!
//! [`ExecutionPlan`] orders the configured stages by their declared
//! dependencies.

pub mod context;
pub mod error;
pub mod fields;
pub mod frame;
pub mod linkage;
pub mod observation;
pub mod ops;
pub mod plan;
pub mod transformers;

pub use context::{Diagnostic, DiagnosticLevel, Diagnostics, TransformContext};
pub use error::{PlanError, Result, TransformError};
pub use fields::FieldMap;
pub use frame::{CdmFrame, CdmTables, StageInput};
pub use linkage::{LinkedVisit, link_visits};
pub use observation::{ObservationPeriod, Span, aggregate_periods, project_spans};
pub use plan::{ExecutionPlan, PlannedStage};
pub use transformers::{TableTransformer, TransformerRegistry, default_registry};
