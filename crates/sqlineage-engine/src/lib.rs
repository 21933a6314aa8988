//! sqlineage engine - lineage aggregation services
//!
//! This crate wires the graph algorithms to a store:
//! - Batch reprocessing of a whole run (`ReprocessRun`)
//! - Realtime upserts, one task per newly written raw record
//! - The ingestion gateway that writes raw records and dispatches them
//! - Read queries for lineage, search, statistics and impact analysis

pub mod locks;
pub mod reprocess;
pub mod realtime;
pub mod ingest;
pub mod query;

pub use locks::RunLocks;
pub use reprocess::{BatchReprocessor, ReprocessError, build_graph};
pub use realtime::{ParkedEdges, RealtimeCoordinator, RawRecordEvent, UpdateOutcome};
pub use ingest::{IngestGateway, IngestError, IngestOutcome};
pub use query::{
    LineageQuery, QueryError, EntitySummary, EntityLineage, FineGrainedLineage, FieldRef, RunStats,
};

use sqlineage_core::Config;
use sqlineage_store::LineageStore;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// All engine services over one store, with the realtime coordinator running
pub struct LineageEngine {
    /// Raw record writes and worker events
    pub gateway: IngestGateway,

    /// Full rebuilds
    pub reprocessor: BatchReprocessor,

    /// Read queries
    pub query: LineageQuery,

    coordinator: JoinHandle<()>,
}

impl LineageEngine {
    /// Start the realtime coordinator and build the services around it.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(store: Arc<dyn LineageStore>, config: &Config) -> Self {
        let locks = RunLocks::new();
        let (sender, receiver) = tokio::sync::mpsc::channel(config.realtime.queue_capacity);

        let coordinator = RealtimeCoordinator::new(Arc::clone(&store), locks.clone(), config);
        let parked = coordinator.parked_edges();
        let handle = tokio::spawn(coordinator.run(receiver));

        let reprocessor =
            BatchReprocessor::new(Arc::clone(&store), locks, config.aggregation.clone())
                .with_parked_edges(parked);
        let gateway = IngestGateway::new(Arc::clone(&store), sender, reprocessor.clone());
        let query = LineageQuery::new(store, config.query.search_limit);

        Self {
            gateway,
            reprocessor,
            query,
            coordinator: handle,
        }
    }

    /// Close the event channel and wait for every in-flight realtime task.
    ///
    /// Returns the reprocessor and query service so results can still be read.
    pub async fn shutdown(self) -> (BatchReprocessor, LineageQuery) {
        drop(self.gateway);
        if let Err(err) = self.coordinator.await {
            tracing::error!(error = %err, "realtime coordinator stopped abnormally");
        }
        (self.reprocessor, self.query)
    }
}
