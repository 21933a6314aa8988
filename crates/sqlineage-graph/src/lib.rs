//! Lineage graph construction
//!
//! This crate handles:
//! - Canonicalizing raw, possibly templated, qualified table names
//! - Folding raw table sightings into canonical table nodes
//! - Expanding column edges into column lineage facts
//! - Building symmetric, deduplicated table adjacency
//! - Transitive traversal (impact analysis) over the result
//!
//! Every algorithm here is a pure transform over [`LineageGraph`]; the batch
//! rebuild and the realtime upserts share the same merge primitives.

pub mod canonical;
pub mod graph;
pub mod edge;
pub mod aggregate;
pub mod column_lineage;
pub mod relationships;
pub mod dag;

pub use canonical::{canonicalize, CanonicalName, CanonicalizeError};
pub use graph::{LineageGraph, GraphSnapshot, TableMerge};
pub use edge::{EdgeRejection, ResolvedEdge};
pub use aggregate::{TableAggregator, TableSighting, normalize_names};
pub use column_lineage::ColumnLineageBuilder;
pub use relationships::TableRelationshipBuilder;
pub use dag::LineageDag;
