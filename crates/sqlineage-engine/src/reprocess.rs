//! Batch reprocessing of a whole run
//!
//! A rebuild reads every raw record of the run, derives a fresh graph with
//! the three builders and swaps it in with one store write. Nothing is
//! written until the new graph is complete.

use crate::locks::RunLocks;
use crate::realtime::ParkedEdges;
use sqlineage_core::{AggregationConfig, RawEdgeRecord, RawTableRecord, RebuildReport, RunId};
use sqlineage_graph::{
    ColumnLineageBuilder, LineageGraph, TableAggregator, TableRelationshipBuilder,
};
use sqlineage_store::{LineageStore, StoreError};
use std::sync::Arc;

/// Errors that abort a rebuild
#[derive(Debug, thiserror::Error)]
pub enum ReprocessError {
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ReprocessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RunNotFound(run_id) => Self::RunNotFound(run_id),
            other => Self::Store(other),
        }
    }
}

/// Derive the graph of a run from its raw records.
///
/// Tables first, then column facts, then relationships; both edge builders
/// need the complete table set.
pub fn build_graph(
    run_id: &RunId,
    tables: &[RawTableRecord],
    edges: &[RawEdgeRecord],
    config: &AggregationConfig,
) -> (LineageGraph, RebuildReport) {
    let mut graph = LineageGraph::new();
    let mut report = RebuildReport::new(run_id.clone());

    let aggregator = TableAggregator::new(config.column_merge);
    let columns = ColumnLineageBuilder::new(config.column_delimiter.clone());
    report.extend_diagnostics(aggregator.aggregate(tables, &mut graph));
    report.extend_diagnostics(columns.build(edges, &mut graph));
    report.extend_diagnostics(TableRelationshipBuilder::new().build(edges, &mut graph));

    report.summary.raw_tables = tables.len();
    report.summary.raw_edges = edges.len();
    report.summary.tables = graph.table_count();
    report.summary.column_facts = graph.column_fact_count();
    report.summary.relationships = graph.relationship_count();
    report.fingerprint = graph.fingerprint();

    (graph, report)
}

/// Runs full rebuilds against a store
#[derive(Clone)]
pub struct BatchReprocessor {
    store: Arc<dyn LineageStore>,
    locks: RunLocks,
    config: AggregationConfig,
    parked: ParkedEdges,
}

impl BatchReprocessor {
    pub fn new(store: Arc<dyn LineageStore>, locks: RunLocks, config: AggregationConfig) -> Self {
        Self {
            store,
            locks,
            config,
            parked: ParkedEdges::new(),
        }
    }

    /// Share the realtime coordinator's parked edges
    pub fn with_parked_edges(mut self, parked: ParkedEdges) -> Self {
        self.parked = parked;
        self
    }

    /// Delete and regenerate all derived data of a run.
    ///
    /// Holds the run's lock exclusively, so no realtime upsert of the same
    /// run interleaves. Idempotent: the same raw records give the same graph.
    ///
    /// Once the run is completed the rebuild has seen every record it will
    /// get, so edges still parked for it are dropped and its lock entry is
    /// released.
    pub async fn reprocess_run(&self, run_id: &RunId) -> Result<RebuildReport, ReprocessError> {
        let guard = self.locks.exclusive(run_id).await;

        let Some(info) = self.store.run(run_id).await? else {
            return Err(ReprocessError::RunNotFound(run_id.clone()));
        };

        let tables = self.store.raw_tables(run_id).await?;
        let edges = self.store.raw_edges(run_id, None).await?;
        tracing::info!(
            run_id = %run_id,
            tables = tables.len(),
            edges = edges.len(),
            "reprocessing run"
        );

        let (graph, report) = build_graph(run_id, &tables, &edges, &self.config);
        self.store.replace_graph(run_id, graph).await?;

        let completed = info.completed_at.is_some();
        if completed {
            let forgotten = self.parked.forget_run(run_id).await;
            if forgotten > 0 {
                tracing::debug!(
                    run_id = %run_id,
                    edges = forgotten,
                    "dropped parked edges of completed run"
                );
            }
        }
        drop(guard);
        if completed {
            self.locks.forget(run_id).await;
        }

        tracing::info!(
            run_id = %run_id,
            tables = report.summary.tables,
            column_facts = report.summary.column_facts,
            relationships = report.summary.relationships,
            dropped = report.summary.dropped,
            "run reprocessed"
        );
        Ok(report)
    }
}
