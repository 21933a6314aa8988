//! Store trait for raw records and the canonical lineage graph

use serde::{Deserialize, Serialize};
use sqlineage_core::{
    CanonicalTable, ColumnLineageFact, ColumnMergePolicy, EdgeKind, RawEdgeRecord,
    RawTableRecord, RunId, RunInfo, TableRelationship, TransformationProvenance,
};
use sqlineage_graph::{LineageGraph, TableMerge, TableSighting};

/// Errors that can occur when reading or writing the store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Run already registered: {0}")]
    DuplicateRun(RunId),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Filter for relationship listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipFilter {
    /// Keep only tables that do (`Some(true)`) or do not have upstream neighbors
    pub has_upstream: Option<bool>,

    /// Keep only tables that do (`Some(true)`) or do not have downstream neighbors
    pub has_downstream: Option<bool>,
}

impl RelationshipFilter {
    /// No filtering
    pub fn all() -> Self {
        Self::default()
    }

    /// Require upstream neighbors to be present or absent
    pub fn with_upstream(mut self, present: bool) -> Self {
        self.has_upstream = Some(present);
        self
    }

    /// Require downstream neighbors to be present or absent
    pub fn with_downstream(mut self, present: bool) -> Self {
        self.has_downstream = Some(present);
        self
    }

    /// Check a relationship row against the filter
    pub fn matches(&self, relationship: &TableRelationship) -> bool {
        self.has_upstream.map_or(true, |want| relationship.has_upstream() == want)
            && self.has_downstream.map_or(true, |want| relationship.has_downstream() == want)
    }
}

/// Trait for stores holding raw extraction records and derived lineage
///
/// Raw records are append-only. Derived data is written either wholesale
/// (`replace_graph`, one atomic swap per run) or by the incremental upserts,
/// each of which is atomic for the run it touches.
#[async_trait::async_trait]
pub trait LineageStore: Send + Sync {
    /// Get the store name (e.g., "InMemory")
    fn name(&self) -> &'static str;

    // Runs

    /// Register a new run
    async fn register_run(&self, run: RunInfo) -> Result<(), StoreError>;

    /// Look up a run
    async fn run(&self, run_id: &RunId) -> Result<Option<RunInfo>, StoreError>;

    /// All registered runs, oldest first
    async fn runs(&self) -> Result<Vec<RunInfo>, StoreError>;

    /// Mark a run as completed
    async fn complete_run(&self, run_id: &RunId) -> Result<(), StoreError>;

    // Raw records

    /// Append a raw table record; the run must be registered
    async fn insert_raw_table(&self, record: RawTableRecord) -> Result<(), StoreError>;

    /// Append a raw edge record; the run must be registered
    async fn insert_raw_edge(&self, record: RawEdgeRecord) -> Result<(), StoreError>;

    /// Raw table records of a run, in insertion order
    async fn raw_tables(&self, run_id: &RunId) -> Result<Vec<RawTableRecord>, StoreError>;

    /// Raw edge records of a run, optionally of one kind, in insertion order
    async fn raw_edges(
        &self,
        run_id: &RunId,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<RawEdgeRecord>, StoreError>;

    // Derived graph, batch

    /// Replace all derived data of a run in one step
    async fn replace_graph(&self, run_id: &RunId, graph: LineageGraph) -> Result<(), StoreError>;

    // Derived graph, incremental

    /// Merge-or-create a canonical table
    async fn merge_table(
        &self,
        run_id: &RunId,
        sighting: TableSighting,
        policy: ColumnMergePolicy,
    ) -> Result<TableMerge, StoreError>;

    /// Insert a column fact unless its key exists. Returns `true` if inserted.
    async fn insert_column_fact(
        &self,
        run_id: &RunId,
        fact: ColumnLineageFact,
    ) -> Result<bool, StoreError>;

    /// Attach a provenance tuple to both sides of a table edge. Returns `true` if new.
    async fn link_tables(
        &self,
        run_id: &RunId,
        upstream: &str,
        downstream: &str,
        provenance: TransformationProvenance,
    ) -> Result<bool, StoreError>;

    // Reads

    /// One canonical table
    async fn table(
        &self,
        run_id: &RunId,
        short_id: &str,
    ) -> Result<Option<CanonicalTable>, StoreError>;

    /// All canonical tables of a run, ordered by short id
    async fn tables(&self, run_id: &RunId) -> Result<Vec<CanonicalTable>, StoreError>;

    /// Column facts of a run, optionally only those of one downstream table
    async fn column_facts(
        &self,
        run_id: &RunId,
        downstream: Option<&str>,
    ) -> Result<Vec<ColumnLineageFact>, StoreError>;

    /// Relationship row of one table
    async fn relationship(
        &self,
        run_id: &RunId,
        table: &str,
    ) -> Result<Option<TableRelationship>, StoreError>;

    /// Relationship rows matching a filter, ordered by table
    async fn relationships(
        &self,
        run_id: &RunId,
        filter: RelationshipFilter,
    ) -> Result<Vec<TableRelationship>, StoreError>;

    /// Copy of a run's whole derived graph
    async fn graph(&self, run_id: &RunId) -> Result<LineageGraph, StoreError>;
}
