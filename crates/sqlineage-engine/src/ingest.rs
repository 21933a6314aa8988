//! Ingestion gateway
//!
//! The single write path for raw records. Every record is stored first and
//! then published on the realtime channel, so the coordinator only ever sees
//! durable records. Worker events are routed here too: run registration,
//! per-file extraction results and run completion.

use crate::realtime::RawRecordEvent;
use crate::reprocess::{BatchReprocessor, ReprocessError};
use sqlineage_core::{
    Diagnostic, EventError, EventKind, FileExtraction, RawEdgeRecord, RawTableRecord,
    RebuildReport, RunId, RunInfo, RunStarted, WorkerEvent,
};
use sqlineage_store::{LineageStore, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Errors returned to the writer
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Unknown run: {0}")]
    UnknownRun(RunId),

    #[error("Invalid worker event: {0}")]
    Event(#[from] EventError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reprocessing failed: {0}")]
    Reprocess(#[from] ReprocessError),
}

/// Result of handling one worker event
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A run was registered
    RunRegistered(RunId),

    /// Raw records of one file were stored
    FileIngested {
        file_id: String,
        tables: usize,
        edges: usize,
        rejected: Vec<Diagnostic>,
    },

    /// The run completed and was rebuilt
    RunReprocessed(RebuildReport),

    /// Progress and status events carry nothing to store
    Ignored,
}

/// Writes raw records and dispatches them to the realtime coordinator
#[derive(Clone)]
pub struct IngestGateway {
    store: Arc<dyn LineageStore>,
    events: mpsc::Sender<RawRecordEvent>,
    reprocessor: BatchReprocessor,
}

impl IngestGateway {
    pub fn new(
        store: Arc<dyn LineageStore>,
        events: mpsc::Sender<RawRecordEvent>,
        reprocessor: BatchReprocessor,
    ) -> Self {
        Self {
            store,
            events,
            reprocessor,
        }
    }

    /// Register a run so records can be written for it
    pub async fn register_run(&self, run: RunInfo) -> Result<(), IngestError> {
        tracing::info!(
            run_id = %run.run_id,
            repository = %run.repository_url,
            branch = %run.branch,
            "run registered"
        );
        self.store.register_run(run).await?;
        Ok(())
    }

    /// Store a raw table record and publish it
    pub async fn write_table(&self, record: RawTableRecord) -> Result<(), IngestError> {
        self.ensure_run(&record.run_id).await?;
        self.store.insert_raw_table(record.clone()).await?;
        self.publish(RawRecordEvent::TableWritten(record)).await;
        Ok(())
    }

    /// Store a raw edge record and publish it
    pub async fn write_edge(&self, record: RawEdgeRecord) -> Result<(), IngestError> {
        self.ensure_run(&record.run_id).await?;
        self.store.insert_raw_edge(record.clone()).await?;
        self.publish(RawRecordEvent::EdgeWritten(record)).await;
        Ok(())
    }

    /// Store every record of one file, tables first
    pub async fn write_extraction(
        &self,
        extraction: FileExtraction,
    ) -> Result<IngestOutcome, IngestError> {
        self.ensure_run(&extraction.run_id).await?;

        let tables = extraction.tables.len();
        let edges = extraction.edges.len();
        for record in extraction.tables {
            self.write_table(record).await?;
        }
        for record in extraction.edges {
            self.write_edge(record).await?;
        }

        for diagnostic in &extraction.rejected {
            tracing::warn!(
                run_id = %extraction.run_id,
                file_id = %extraction.file_id,
                code = %diagnostic.code,
                "{}",
                diagnostic.message
            );
        }
        tracing::debug!(
            run_id = %extraction.run_id,
            file_id = %extraction.file_id,
            tables,
            edges,
            "file ingested"
        );

        Ok(IngestOutcome::FileIngested {
            file_id: extraction.file_id,
            tables,
            edges,
            rejected: extraction.rejected,
        })
    }

    /// Route one worker event
    pub async fn handle_event(&self, event: &WorkerEvent) -> Result<IngestOutcome, IngestError> {
        match event.kind() {
            EventKind::RunStarted => {
                let started = RunStarted::from_event(event)?;
                let run_id = started.run.run_id.clone();
                self.register_run(started.run).await?;
                Ok(IngestOutcome::RunRegistered(run_id))
            }
            EventKind::FileExtraction => {
                let extraction = FileExtraction::from_event(event)?;
                self.write_extraction(extraction).await
            }
            EventKind::RunCompleted => {
                let run_id = event.run_id();
                self.ensure_run(&run_id).await?;
                self.store.complete_run(&run_id).await?;
                let report = self.reprocessor.reprocess_run(&run_id).await?;
                Ok(IngestOutcome::RunReprocessed(report))
            }
            EventKind::RunFailed => {
                tracing::warn!(run_id = %event.run_id, "extraction run failed");
                Ok(IngestOutcome::Ignored)
            }
            EventKind::ProgressUpdate | EventKind::JobStatusUpdate => {
                tracing::trace!(
                    run_id = %event.run_id,
                    event_type = %event.event_type,
                    "status event"
                );
                Ok(IngestOutcome::Ignored)
            }
            EventKind::Unknown => {
                tracing::warn!(
                    run_id = %event.run_id,
                    event_type = %event.event_type,
                    "ignoring unknown event type"
                );
                Ok(IngestOutcome::Ignored)
            }
        }
    }

    async fn ensure_run(&self, run_id: &RunId) -> Result<(), IngestError> {
        match self.store.run(run_id).await? {
            Some(_) => Ok(()),
            None => Err(IngestError::UnknownRun(run_id.clone())),
        }
    }

    /// The record is already durable; a closed channel only costs freshness
    async fn publish(&self, event: RawRecordEvent) {
        if let Err(err) = self.events.send(event).await {
            tracing::warn!(run_id = %err.0.run_id(), "realtime channel closed, update skipped");
        }
    }
}
