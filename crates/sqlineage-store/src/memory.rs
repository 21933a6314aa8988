//! In-memory lineage store
//!
//! Keeps every run in memory behind its own lock. It's useful for:
//! - The CLI, which replays worker event files without a database
//! - Unit and integration testing of the engine
//! - Simulating storage failures on the incremental path
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! // Every derived-graph write fails
//! let store = InMemoryStore::new().with_write_failure();
//!
//! // Only writes touching one table fail
//! store.add_failure_for_table("orders", "disk full").await;
//!
//! // Slow storage
//! let store = InMemoryStore::new().with_latency(100); // 100ms delay
//! ```

use crate::store::{LineageStore, RelationshipFilter, StoreError};
use sqlineage_core::{
    CanonicalTable, ColumnLineageFact, ColumnMergePolicy, EdgeKind, RawEdgeRecord,
    RawTableRecord, RunId, RunInfo, TableRelationship, TransformationProvenance,
};
use sqlineage_graph::{LineageGraph, TableMerge, TableSighting};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Everything stored for one run
#[derive(Debug)]
struct RunState {
    info: RunInfo,
    raw_tables: Vec<RawTableRecord>,
    raw_edges: Vec<RawEdgeRecord>,
    graph: LineageGraph,
}

impl RunState {
    fn new(info: RunInfo) -> Self {
        Self {
            info,
            raw_tables: Vec::new(),
            raw_edges: Vec::new(),
            graph: LineageGraph::new(),
        }
    }
}

type SharedRun = Arc<RwLock<RunState>>;

/// In-memory lineage store
///
/// Clones share state. Each run sits behind its own `RwLock`, so upserts are
/// atomic per run and never block readers of other runs.
pub struct InMemoryStore {
    /// Runs by id
    runs: Arc<RwLock<HashMap<RunId, SharedRun>>>,

    /// Tables whose derived-graph writes fail, with the error message
    failing_tables: Arc<RwLock<HashMap<String, String>>>,

    /// Fail every derived-graph write
    fail_writes: Arc<AtomicBool>,

    /// Simulated latency (milliseconds)
    latency_ms: u64,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            failing_tables: Arc::new(RwLock::new(HashMap::new())),
            fail_writes: Arc::new(AtomicBool::new(false)),
            latency_ms: 0,
        }
    }

    /// Configure every derived-graph write to fail
    pub fn with_write_failure(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    /// Configure simulated latency for all operations
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Turn the global write failure on or off at runtime
    pub fn set_write_failure(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make derived-graph writes touching `short_id` fail
    pub async fn add_failure_for_table(
        &self,
        short_id: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.failing_tables.write().await.insert(short_id.into(), message.into());
    }

    /// Clear all per-table failures
    pub async fn clear_failures(&self) {
        self.failing_tables.write().await.clear();
    }

    /// Number of registered runs
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }

    async fn shared_run(&self, run_id: &RunId) -> Result<SharedRun, StoreError> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| StoreError::RunNotFound(run_id.clone()))
    }

    async fn check_write(&self, tables: &[&str]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("Simulated write failure".to_string()));
        }

        let failing = self.failing_tables.read().await;
        for table in tables {
            if let Some(message) = failing.get(*table) {
                return Err(StoreError::WriteFailed(format!("{}: {}", table, message)));
            }
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryStore {
    fn clone(&self) -> Self {
        Self {
            runs: Arc::clone(&self.runs),
            failing_tables: Arc::clone(&self.failing_tables),
            fail_writes: Arc::clone(&self.fail_writes),
            latency_ms: self.latency_ms,
        }
    }
}

#[async_trait::async_trait]
impl LineageStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "InMemory"
    }

    async fn register_run(&self, run: RunInfo) -> Result<(), StoreError> {
        self.simulate_latency().await;

        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.run_id) {
            return Err(StoreError::DuplicateRun(run.run_id));
        }
        runs.insert(run.run_id.clone(), Arc::new(RwLock::new(RunState::new(run))));
        Ok(())
    }

    async fn run(&self, run_id: &RunId) -> Result<Option<RunInfo>, StoreError> {
        let Some(run) = self.runs.read().await.get(run_id).cloned() else {
            return Ok(None);
        };
        let info = run.read().await.info.clone();
        Ok(Some(info))
    }

    async fn runs(&self) -> Result<Vec<RunInfo>, StoreError> {
        let shared: Vec<SharedRun> = self.runs.read().await.values().cloned().collect();

        let mut infos = Vec::with_capacity(shared.len());
        for run in shared {
            infos.push(run.read().await.info.clone());
        }
        infos.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(infos)
    }

    async fn complete_run(&self, run_id: &RunId) -> Result<(), StoreError> {
        let run = self.shared_run(run_id).await?;
        run.write().await.info.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn insert_raw_table(&self, record: RawTableRecord) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let run = self.shared_run(&record.run_id).await?;
        run.write().await.raw_tables.push(record);
        Ok(())
    }

    async fn insert_raw_edge(&self, record: RawEdgeRecord) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let run = self.shared_run(&record.run_id).await?;
        run.write().await.raw_edges.push(record);
        Ok(())
    }

    async fn raw_tables(&self, run_id: &RunId) -> Result<Vec<RawTableRecord>, StoreError> {
        let run = self.shared_run(run_id).await?;
        let tables = run.read().await.raw_tables.clone();
        Ok(tables)
    }

    async fn raw_edges(
        &self,
        run_id: &RunId,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<RawEdgeRecord>, StoreError> {
        let run = self.shared_run(run_id).await?;
        let state = run.read().await;
        Ok(state
            .raw_edges
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect())
    }

    async fn replace_graph(&self, run_id: &RunId, graph: LineageGraph) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let run = self.shared_run(run_id).await?;
        self.check_write(&[]).await?;

        run.write().await.graph = graph;
        Ok(())
    }

    async fn merge_table(
        &self,
        run_id: &RunId,
        sighting: TableSighting,
        policy: ColumnMergePolicy,
    ) -> Result<TableMerge, StoreError> {
        self.simulate_latency().await;
        let run = self.shared_run(run_id).await?;
        self.check_write(&[sighting.short_id.as_str()]).await?;

        let mut state = run.write().await;
        Ok(state.graph.merge_table(sighting, policy))
    }

    async fn insert_column_fact(
        &self,
        run_id: &RunId,
        fact: ColumnLineageFact,
    ) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        let run = self.shared_run(run_id).await?;
        self.check_write(&[fact.downstream_table.as_str(), fact.upstream.table.as_str()]).await?;

        let mut state = run.write().await;
        Ok(state.graph.add_column_fact(fact))
    }

    async fn link_tables(
        &self,
        run_id: &RunId,
        upstream: &str,
        downstream: &str,
        provenance: TransformationProvenance,
    ) -> Result<bool, StoreError> {
        self.simulate_latency().await;
        let run = self.shared_run(run_id).await?;
        self.check_write(&[upstream, downstream]).await?;

        let mut state = run.write().await;
        Ok(state.graph.link(upstream, downstream, provenance))
    }

    async fn table(
        &self,
        run_id: &RunId,
        short_id: &str,
    ) -> Result<Option<CanonicalTable>, StoreError> {
        let run = self.shared_run(run_id).await?;
        let table = run.read().await.graph.table(short_id).cloned();
        Ok(table)
    }

    async fn tables(&self, run_id: &RunId) -> Result<Vec<CanonicalTable>, StoreError> {
        let run = self.shared_run(run_id).await?;
        let tables = run.read().await.graph.tables().cloned().collect();
        Ok(tables)
    }

    async fn column_facts(
        &self,
        run_id: &RunId,
        downstream: Option<&str>,
    ) -> Result<Vec<ColumnLineageFact>, StoreError> {
        let run = self.shared_run(run_id).await?;
        let state = run.read().await;
        Ok(state
            .graph
            .column_facts()
            .filter(|f| downstream.map_or(true, |table| f.downstream_table == table))
            .cloned()
            .collect())
    }

    async fn relationship(
        &self,
        run_id: &RunId,
        table: &str,
    ) -> Result<Option<TableRelationship>, StoreError> {
        let run = self.shared_run(run_id).await?;
        let relationship = run.read().await.graph.relationship(table).cloned();
        Ok(relationship)
    }

    async fn relationships(
        &self,
        run_id: &RunId,
        filter: RelationshipFilter,
    ) -> Result<Vec<TableRelationship>, StoreError> {
        let run = self.shared_run(run_id).await?;
        let state = run.read().await;
        Ok(state
            .graph
            .relationships()
            .filter(|r| !r.is_isolated() && filter.matches(r))
            .cloned()
            .collect())
    }

    async fn graph(&self, run_id: &RunId) -> Result<LineageGraph, StoreError> {
        let run = self.shared_run(run_id).await?;
        let graph = run.read().await.graph.clone();
        Ok(graph)
    }
}

/// Builder for an in-memory store pre-populated with runs and raw records
///
/// # Example
///
/// ```rust,ignore
/// let store = InMemoryStoreBuilder::new()
///     .with_run(RunInfo::new("run-1", "repo", "main"))
///     .with_table(RawTableRecord::new("run-1", "f.sql", "orders", TableRole::Target))
///     .build();
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    runs: Vec<RunInfo>,
    tables: Vec<RawTableRecord>,
    edges: Vec<RawEdgeRecord>,
    latency_ms: u64,
}

impl InMemoryStoreBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run
    pub fn with_run(mut self, run: RunInfo) -> Self {
        self.runs.push(run);
        self
    }

    /// Add a raw table record (its run must be added too)
    pub fn with_table(mut self, record: RawTableRecord) -> Self {
        self.tables.push(record);
        self
    }

    /// Add a raw edge record (its run must be added too)
    pub fn with_edge(mut self, record: RawEdgeRecord) -> Self {
        self.edges.push(record);
        self
    }

    /// Configure latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Build the store. Records for runs that were not added are skipped.
    pub fn build(self) -> InMemoryStore {
        let mut states: HashMap<RunId, RunState> = self
            .runs
            .into_iter()
            .map(|info| (info.run_id.clone(), RunState::new(info)))
            .collect();

        for record in self.tables {
            if let Some(state) = states.get_mut(&record.run_id) {
                state.raw_tables.push(record);
            }
        }
        for record in self.edges {
            if let Some(state) = states.get_mut(&record.run_id) {
                state.raw_edges.push(record);
            }
        }

        let runs = states
            .into_iter()
            .map(|(id, state)| (id, Arc::new(RwLock::new(state))))
            .collect();

        InMemoryStore {
            runs: Arc::new(RwLock::new(runs)),
            ..InMemoryStore::new()
        }
        .with_latency(self.latency_ms)
    }
}
