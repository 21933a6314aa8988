//! sqlineage Core
//!
//! Core domain model with stable, versioned types: raw extraction records,
//! the canonical lineage graph, worker event payloads, diagnostics and config.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod raw;
pub mod lineage;
pub mod event;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use raw::{
    RunId, RunInfo, TableRole, EdgeKind, LineRange, LineContext, RawTableRecord, RawEdgeRecord,
    parse_line_value,
};
pub use lineage::{
    CanonicalTable, TransformationProvenance, NeighborEntry, TableRelationship, Direction,
    ColumnProvenance, UpstreamRef, ColumnLineageFact, ColumnFactKey, UNKNOWN_SCHEMA,
    UNKNOWN_TRANSFORMATION,
};
pub use event::{WorkerEvent, EventKind, FileExtraction, RunStarted, EventError};
pub use report::{RebuildReport, RebuildSummary, ReportVersion};
pub use config::{
    Config, AggregationConfig, RealtimeConfig, QueryConfig, ColumnMergePolicy, ConfigError,
};
