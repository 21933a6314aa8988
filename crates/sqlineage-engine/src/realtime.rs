//! Realtime update coordinator
//!
//! The ingestion gateway publishes one [`RawRecordEvent`] per raw record it
//! has stored. The coordinator consumes the channel and handles every event
//! in its own task, applying the same canonicalization and merge rules as a
//! rebuild but only to the nodes and edges the record implicates.
//!
//! Tasks are fire-and-forget: failures are logged and never retried, and one
//! failing record never blocks the next.
//!
//! Events of one run may be handled in any order. An edge that arrives before
//! one of its tables is parked under the missing table's short id and
//! replayed when that table is merged, so the result converges with a rebuild
//! over the same records.

use crate::locks::RunLocks;
use sqlineage_core::{
    ColumnMergePolicy, Config, Diagnostic, DiagnosticCode, EdgeKind, Location, RawEdgeRecord,
    RawTableRecord, RunId,
};
use sqlineage_graph::{
    ColumnLineageBuilder, EdgeRejection, ResolvedEdge, TableMerge, TableRelationshipBuilder,
    TableSighting,
};
use sqlineage_store::{LineageStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// A raw record that has just been stored
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecordEvent {
    TableWritten(RawTableRecord),
    EdgeWritten(RawEdgeRecord),
}

impl RawRecordEvent {
    /// Run the record belongs to
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::TableWritten(record) => &record.run_id,
            Self::EdgeWritten(record) => &record.run_id,
        }
    }
}

/// What one incremental update did
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// A table record was merged; `replayed` parked edges were re-applied
    TableMerged {
        short_id: String,
        merge: TableMerge,
        replayed: usize,
    },

    /// A column edge produced facts
    ColumnFacts { inserted: usize, duplicates: usize },

    /// A table edge was linked; `added` is false if the tuple was already there
    Linked { added: bool },

    /// The edge waits for tables that are not known yet
    Parked { missing: Vec<String> },

    /// The record had no effect
    Dropped(Diagnostic),
}

/// Edges waiting for a table, keyed by run and then by missing short id.
///
/// Shared between the coordinator, which parks and replays, and the batch
/// reprocessor, which forgets a completed run's leftovers after rebuilding it.
#[derive(Debug, Clone, Default)]
pub struct ParkedEdges {
    inner: Arc<Mutex<HashMap<RunId, HashMap<String, Vec<RawEdgeRecord>>>>>,
}

impl ParkedEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of edges parked for a run
    pub async fn count(&self, run_id: &RunId) -> usize {
        self.inner
            .lock()
            .await
            .get(run_id)
            .map(|by_table| by_table.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Remove and return the edges waiting for one table
    pub async fn take(&self, run_id: &RunId, short_id: &str) -> Vec<RawEdgeRecord> {
        let mut parked = self.inner.lock().await;
        let Some(by_table) = parked.get_mut(run_id) else {
            return Vec::new();
        };

        let edges = by_table.remove(short_id).unwrap_or_default();
        if by_table.is_empty() {
            parked.remove(run_id);
        }
        edges
    }

    /// Drop every edge still parked for a run, returning how many there were
    pub async fn forget_run(&self, run_id: &RunId) -> usize {
        let Some(by_table) = self.inner.lock().await.remove(run_id) else {
            return 0;
        };

        let mut dropped = 0;
        for (table, edges) in by_table {
            for edge in &edges {
                tracing::debug!(
                    run_id = %run_id,
                    table = %table,
                    file_id = %edge.file_id,
                    "forgetting parked edge"
                );
            }
            dropped += edges.len();
        }
        dropped
    }
}

/// Applies raw records to the stored graph one at a time
#[derive(Clone)]
pub struct RealtimeCoordinator {
    store: Arc<dyn LineageStore>,
    locks: RunLocks,
    policy: ColumnMergePolicy,
    columns: ColumnLineageBuilder,
    park_orphans: bool,
    max_parked: usize,
    parked: ParkedEdges,
}

impl RealtimeCoordinator {
    pub fn new(store: Arc<dyn LineageStore>, locks: RunLocks, config: &Config) -> Self {
        Self {
            store,
            locks,
            policy: config.aggregation.column_merge,
            columns: ColumnLineageBuilder::new(config.aggregation.column_delimiter.clone()),
            park_orphans: config.realtime.park_orphan_edges,
            max_parked: config.realtime.max_parked_edges_per_run,
            parked: ParkedEdges::new(),
        }
    }

    /// Handle on the parked edges, for the reprocessor to clear after a rebuild
    pub fn parked_edges(&self) -> ParkedEdges {
        self.parked.clone()
    }

    /// Consume events until every sender is dropped.
    ///
    /// Each event gets its own task. Returns once the channel is closed and
    /// all in-flight tasks have finished.
    pub async fn run(self, mut events: mpsc::Receiver<RawRecordEvent>) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let coordinator = self.clone();
                        tasks.spawn(async move { coordinator.handle(event).await });
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!(error = %err, "realtime task panicked");
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "realtime task panicked");
            }
        }
        tracing::debug!("realtime coordinator stopped");
    }

    /// Handle one event, logging instead of propagating failures
    pub async fn handle(&self, event: RawRecordEvent) {
        let run_id = event.run_id().clone();
        let result = match &event {
            RawRecordEvent::TableWritten(record) => self.on_raw_table_written(record).await,
            RawRecordEvent::EdgeWritten(record) => self.on_raw_edge_written(record).await,
        };

        match result {
            Ok(UpdateOutcome::Dropped(diagnostic)) => {
                tracing::warn!(run_id = %run_id, code = %diagnostic.code, "{}", diagnostic.message);
            }
            Ok(UpdateOutcome::Parked { missing }) => {
                if let RawRecordEvent::EdgeWritten(edge) = &event {
                    let diagnostic = parked_diagnostic(edge, &missing);
                    tracing::info!(
                        run_id = %run_id,
                        code = %diagnostic.code,
                        "{}",
                        diagnostic.message
                    );
                }
            }
            Ok(outcome) => {
                tracing::debug!(run_id = %run_id, ?outcome, "realtime update applied");
            }
            Err(err) => {
                tracing::error!(run_id = %run_id, error = %err, "realtime update failed");
            }
        }
    }

    /// Upsert the canonical table of a newly written table record, then
    /// replay edges that were waiting for it
    pub async fn on_raw_table_written(
        &self,
        record: &RawTableRecord,
    ) -> Result<UpdateOutcome, StoreError> {
        let _guard = self.locks.shared(&record.run_id).await;

        let sighting = match TableSighting::from_record(record) {
            Ok(sighting) => sighting,
            Err(err) => {
                return Ok(UpdateOutcome::Dropped(
                    Diagnostic::warn(DiagnosticCode::MalformedIdentifier, err.to_string())
                        .with_location(Location::new(record.file_id.clone()))
                        .with_subjects(vec![record.name.clone()]),
                ));
            }
        };

        let short_id = sighting.short_id.clone();
        let merge = self.store.merge_table(&record.run_id, sighting, self.policy).await?;
        tracing::trace!(run_id = %record.run_id, table = %short_id, ?merge, "table merged");

        let waiting = self.take_parked(&record.run_id, &short_id).await;
        let replayed = waiting.len();
        for edge in waiting {
            match self.apply_edge(&edge).await {
                Ok(UpdateOutcome::Dropped(diagnostic)) => {
                    tracing::warn!(
                        run_id = %edge.run_id,
                        code = %diagnostic.code,
                        "{}",
                        diagnostic.message
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(
                        run_id = %edge.run_id,
                        file_id = %edge.file_id,
                        error = %err,
                        "replaying parked edge failed"
                    );
                }
            }
        }

        Ok(UpdateOutcome::TableMerged {
            short_id,
            merge,
            replayed,
        })
    }

    /// Upsert the facts or adjacency implied by a newly written edge record
    pub async fn on_raw_edge_written(
        &self,
        record: &RawEdgeRecord,
    ) -> Result<UpdateOutcome, StoreError> {
        let _guard = self.locks.shared(&record.run_id).await;
        self.apply_edge(record).await
    }

    /// Number of edges parked for a run
    pub async fn parked_count(&self, run_id: &RunId) -> usize {
        self.parked.count(run_id).await
    }

    /// Drop every edge still parked for a run, returning how many there were
    pub async fn forget_run(&self, run_id: &RunId) -> usize {
        self.parked.forget_run(run_id).await
    }

    async fn apply_edge(&self, edge: &RawEdgeRecord) -> Result<UpdateOutcome, StoreError> {
        if edge.kind == EdgeKind::Column
            && (self.columns.parse_columns(edge.from_column.as_deref()).is_empty()
                || self.columns.parse_columns(edge.to_column.as_deref()).is_empty())
        {
            return Ok(UpdateOutcome::Dropped(EdgeRejection::EmptyColumns.to_diagnostic(edge)));
        }

        let resolved = match self.resolve_or_park(edge).await? {
            Ok(resolved) => resolved,
            Err(outcome) => return Ok(outcome),
        };

        match edge.kind {
            EdgeKind::Column => {
                let facts = match self.columns.facts(edge, &resolved) {
                    Ok(facts) => facts,
                    Err(rejection) => {
                        return Ok(UpdateOutcome::Dropped(rejection.to_diagnostic(edge)))
                    }
                };

                let mut inserted = 0;
                let mut duplicates = 0;
                for fact in facts {
                    if self.store.insert_column_fact(&edge.run_id, fact).await? {
                        inserted += 1;
                    } else {
                        duplicates += 1;
                    }
                }
                Ok(UpdateOutcome::ColumnFacts { inserted, duplicates })
            }
            EdgeKind::Table => {
                let provenance = TableRelationshipBuilder::provenance(edge);
                let added = self
                    .store
                    .link_tables(&edge.run_id, &resolved.upstream, &resolved.downstream, provenance)
                    .await?;
                Ok(UpdateOutcome::Linked { added })
            }
        }
    }

    /// Resolve both endpoints against the stored tables, parking the edge if
    /// one is missing.
    ///
    /// The parked-edge lock is held across the existence check so a table
    /// merged concurrently either is seen here or finds the parked edge.
    async fn resolve_or_park(
        &self,
        edge: &RawEdgeRecord,
    ) -> Result<Result<ResolvedEdge, UpdateOutcome>, StoreError> {
        let (upstream, downstream) = match ResolvedEdge::canonical_endpoints(edge) {
            Ok(endpoints) => endpoints,
            Err(rejection) => return Ok(Err(UpdateOutcome::Dropped(rejection.to_diagnostic(edge)))),
        };

        let mut parked = self.parked.inner.lock().await;

        let mut known = Vec::with_capacity(2);
        for table in [&upstream, &downstream] {
            if self.store.table(&edge.run_id, table).await?.is_some() {
                known.push(table.clone());
            }
        }

        let is_known = |table: &str| known.iter().any(|k| k == table);
        let rejection = match ResolvedEdge::resolve_with(edge, is_known) {
            Ok(resolved) => return Ok(Ok(resolved)),
            Err(rejection) => rejection,
        };

        let Some(missing) = rejection.missing_tables().first().cloned() else {
            return Ok(Err(UpdateOutcome::Dropped(rejection.to_diagnostic(edge))));
        };

        let by_table = parked.entry(edge.run_id.clone()).or_default();
        let parked_for_run: usize = by_table.values().map(Vec::len).sum();
        if !self.park_orphans || parked_for_run >= self.max_parked {
            return Ok(Err(UpdateOutcome::Dropped(rejection.to_diagnostic(edge))));
        }

        tracing::debug!(
            run_id = %edge.run_id,
            table = %missing,
            file_id = %edge.file_id,
            "parking edge"
        );
        by_table.entry(missing).or_default().push(edge.clone());
        Ok(Err(UpdateOutcome::Parked {
            missing: rejection.missing_tables().to_vec(),
        }))
    }

    async fn take_parked(&self, run_id: &RunId, short_id: &str) -> Vec<RawEdgeRecord> {
        self.parked.take(run_id, short_id).await
    }
}

/// Diagnostic for an edge that was parked, for callers that report outcomes
pub fn parked_diagnostic(edge: &RawEdgeRecord, missing: &[String]) -> Diagnostic {
    Diagnostic::info(
        DiagnosticCode::ParkedEdge,
        format!(
            "Edge {} -> {} waits for table(s): {}",
            edge.from_table,
            edge.to_table,
            missing.join(", ")
        ),
    )
    .with_location(Location::new(edge.file_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlineage_core::{Direction, RunInfo, TableRole};
    use sqlineage_store::InMemoryStore;

    async fn setup(config: Config) -> (InMemoryStore, RealtimeCoordinator) {
        let store = InMemoryStore::new();
        store.register_run(RunInfo::new("run-1", "repo", "main")).await.unwrap();
        let coordinator =
            RealtimeCoordinator::new(Arc::new(store.clone()), RunLocks::new(), &config);
        (store, coordinator)
    }

    fn table(name: &str, columns: &[&str]) -> RawTableRecord {
        RawTableRecord::new("run-1", "f.sql", name, TableRole::Target)
            .with_columns(columns.iter().copied())
    }

    fn run() -> RunId {
        RunId::new("run-1")
    }

    #[tokio::test]
    async fn table_then_edge() {
        let (store, coordinator) = setup(Config::default()).await;
        coordinator.on_raw_table_written(&table("stg_orders", &["id"])).await.unwrap();
        coordinator.on_raw_table_written(&table("orders", &["id"])).await.unwrap();

        let edge =
            RawEdgeRecord::table_edge("run-1", "f.sql", "stg_orders", "orders").with_lines(1, 9);
        assert_eq!(
            coordinator.on_raw_edge_written(&edge).await.unwrap(),
            UpdateOutcome::Linked { added: true }
        );
        // Redelivery does not duplicate the tuple
        assert_eq!(
            coordinator.on_raw_edge_written(&edge).await.unwrap(),
            UpdateOutcome::Linked { added: false }
        );

        let rel = store.relationship(&run(), "orders").await.unwrap().unwrap();
        let stg = rel.neighbor(Direction::Upstream, "stg_orders").unwrap();
        assert_eq!(stg.transformations.len(), 1);
    }

    #[tokio::test]
    async fn edge_before_table_is_parked_and_replayed() {
        let (store, coordinator) = setup(Config::default()).await;
        coordinator.on_raw_table_written(&table("orders", &["id"])).await.unwrap();

        let edge =
            RawEdgeRecord::column_edge("run-1", "f.sql", ("stg_orders", "id"), ("orders", "id"));
        let outcome = coordinator.on_raw_edge_written(&edge).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Parked { missing: vec!["stg_orders".to_string()] });
        assert_eq!(coordinator.parked_count(&run()).await, 1);

        let outcome = coordinator
            .on_raw_table_written(&table("stg_orders", &["id"]))
            .await
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::TableMerged { replayed: 1, .. }));
        assert_eq!(coordinator.parked_count(&run()).await, 0);
        assert_eq!(store.column_facts(&run(), Some("orders")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edge_missing_both_tables_waits_for_both() {
        let (store, coordinator) = setup(Config::default()).await;
        let edge = RawEdgeRecord::table_edge("run-1", "f.sql", "a", "b");
        coordinator.on_raw_edge_written(&edge).await.unwrap();

        coordinator.on_raw_table_written(&table("a", &[])).await.unwrap();
        assert_eq!(coordinator.parked_count(&run()).await, 1);
        assert!(store.relationship(&run(), "b").await.unwrap().is_none());

        coordinator.on_raw_table_written(&table("b", &[])).await.unwrap();
        assert_eq!(coordinator.parked_count(&run()).await, 0);
        assert!(store.relationship(&run(), "b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn orphans_are_dropped_when_parking_is_off() {
        let mut config = Config::default();
        config.realtime.park_orphan_edges = false;
        let (store, coordinator) = setup(config).await;
        coordinator.on_raw_table_written(&table("orders", &["id"])).await.unwrap();

        let edge =
            RawEdgeRecord::column_edge("run-1", "f.sql", ("raw_stub", "id"), ("orders", "id"));
        let outcome = coordinator.on_raw_edge_written(&edge).await.unwrap();
        assert!(
            matches!(outcome, UpdateOutcome::Dropped(ref d) if d.code == DiagnosticCode::OrphanEdge)
        );
        assert!(store.table(&run(), "raw_stub").await.unwrap().is_none());
        assert!(store.column_facts(&run(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn park_limit_drops_overflow() {
        let mut config = Config::default();
        config.realtime.max_parked_edges_per_run = 1;
        let (_store, coordinator) = setup(config).await;

        let a = RawEdgeRecord::table_edge("run-1", "a.sql", "x", "y");
        let b = RawEdgeRecord::table_edge("run-1", "b.sql", "x", "z");
        assert!(matches!(
            coordinator.on_raw_edge_written(&a).await.unwrap(),
            UpdateOutcome::Parked { .. }
        ));
        assert!(matches!(
            coordinator.on_raw_edge_written(&b).await.unwrap(),
            UpdateOutcome::Dropped(_)
        ));
    }

    #[tokio::test]
    async fn malformed_and_empty_records_are_dropped() {
        let (_store, coordinator) = setup(Config::default()).await;

        let outcome = coordinator.on_raw_table_written(&table("{{ this }}", &[])).await.unwrap();
        assert!(matches!(
            outcome,
            UpdateOutcome::Dropped(ref d) if d.code == DiagnosticCode::MalformedIdentifier
        ));

        let edge = RawEdgeRecord::column_edge("run-1", "f.sql", ("a", ""), ("b", "id"));
        let outcome = coordinator.on_raw_edge_written(&edge).await.unwrap();
        assert!(matches!(
            outcome,
            UpdateOutcome::Dropped(ref d) if d.code == DiagnosticCode::EmptyColumnReference
        ));
    }

    #[tokio::test]
    async fn store_failure_is_returned_not_panicked() {
        let (store, coordinator) = setup(Config::default()).await;
        store.add_failure_for_table("orders", "disk full").await;

        let result = coordinator.on_raw_table_written(&table("orders", &["id"])).await;
        assert!(matches!(result, Err(StoreError::WriteFailed(_))));

        // The next, unrelated record still goes through
        coordinator
            .handle(RawRecordEvent::TableWritten(table("customers", &["id"])))
            .await;
        assert!(store.table(&run(), "customers").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn forget_run_drops_edges_waiting_for_a_missing_table() {
        let (store, coordinator) = setup(Config::default()).await;
        store.register_run(RunInfo::new("run-2", "repo", "main")).await.unwrap();
        coordinator.on_raw_table_written(&table("orders", &["id"])).await.unwrap();

        let ghost = RawEdgeRecord::table_edge("run-1", "legacy.sql", "legacy.ghost", "orders");
        coordinator.on_raw_edge_written(&ghost).await.unwrap();
        let other = RawEdgeRecord::table_edge("run-2", "f.sql", "x", "y");
        coordinator.on_raw_edge_written(&other).await.unwrap();

        assert_eq!(coordinator.forget_run(&run()).await, 1);
        assert_eq!(coordinator.parked_count(&run()).await, 0);
        assert_eq!(coordinator.forget_run(&run()).await, 0);

        // Other runs keep their parked edges
        assert_eq!(coordinator.parked_count(&RunId::new("run-2")).await, 1);
    }

    #[test]
    fn parked_diagnostic_names_missing_tables() {
        let edge = RawEdgeRecord::table_edge("run-1", "f.sql", "a", "b");
        let diag = parked_diagnostic(&edge, &["a".to_string()]);
        assert_eq!(diag.code, DiagnosticCode::ParkedEdge);
        assert!(diag.message.contains("waits for table(s): a"));
    }
}
