//! Read queries over a run's lineage graph
//!
//! Backs the lineage-by-entity, search, statistics and impact endpoints.
//! Table arguments may be qualified or templated; they are canonicalized
//! the same way raw records are.

use serde::{Deserialize, Serialize};
use sqlineage_core::{
    CanonicalTable, ColumnLineageFact, Direction, EdgeKind, LineRange, NeighborEntry, RunId,
    TableRelationship, TableRole,
};
use sqlineage_graph::{canonicalize, CanonicalizeError, LineageDag};
use sqlineage_store::{LineageStore, RelationshipFilter, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Query failures
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error(transparent)]
    InvalidIdentifier(#[from] CanonicalizeError),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RunNotFound(run_id) => Self::RunNotFound(run_id),
            other => Self::Store(other),
        }
    }
}

/// A canonical table with its neighbor counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub table: CanonicalTable,
    pub upstream_count: usize,
    pub downstream_count: usize,
    pub has_upstream: bool,
    pub has_downstream: bool,
}

/// The other end of a column dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub table: String,
    pub column: String,
    pub transformation_type: String,
    pub file_id: String,
    pub lines: LineRange,
}

/// Column dependencies of one column of the entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineGrainedLineage {
    /// Column of the queried table
    pub column: String,

    /// Columns it reads from (upstream) or that read from it (downstream)
    pub related: Vec<FieldRef>,
}

/// Lineage of one table in one direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityLineage {
    pub entity: EntitySummary,
    pub direction: Direction,

    /// Neighbor tables on the requested side, with provenance
    pub neighbors: Vec<NeighborEntry>,

    /// Column-level lineage grouped by the entity's column
    pub fine_grained: Vec<FineGrainedLineage>,

    /// Known columns of the entity
    pub fields: Vec<String>,
}

/// Per-run statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub tables: usize,
    pub column_facts: usize,
    pub relationships: usize,
    pub table_edges: usize,
    pub source_sightings: usize,
    pub target_sightings: usize,
    pub intermediate_sightings: usize,
    pub raw_tables: usize,
    pub raw_table_edges: usize,
    pub raw_column_edges: usize,
}

/// Read-only lineage queries
#[derive(Clone)]
pub struct LineageQuery {
    store: Arc<dyn LineageStore>,
    search_limit: usize,
}

impl LineageQuery {
    pub fn new(store: Arc<dyn LineageStore>, search_limit: usize) -> Self {
        Self { store, search_limit }
    }

    /// Canonical table plus its neighbor counts
    pub async fn entity(&self, run_id: &RunId, table: &str) -> Result<EntitySummary, QueryError> {
        let short_id = canonicalize(table)?.short_id;
        let canonical = self
            .store
            .table(run_id, &short_id)
            .await?
            .ok_or_else(|| QueryError::TableNotFound(short_id.clone()))?;
        let relationship = self.store.relationship(run_id, &short_id).await?;

        Ok(summarize(canonical, relationship.as_ref()))
    }

    /// Neighbors and column lineage of a table on one side
    pub async fn lineage(
        &self,
        run_id: &RunId,
        table: &str,
        direction: Direction,
    ) -> Result<EntityLineage, QueryError> {
        let short_id = canonicalize(table)?.short_id;
        let canonical = self
            .store
            .table(run_id, &short_id)
            .await?
            .ok_or_else(|| QueryError::TableNotFound(short_id.clone()))?;
        let relationship = self.store.relationship(run_id, &short_id).await?;

        let neighbors = relationship
            .as_ref()
            .map(|r| r.neighbors(direction).to_vec())
            .unwrap_or_default();

        let facts = match direction {
            Direction::Upstream => self.store.column_facts(run_id, Some(&short_id)).await?,
            Direction::Downstream => self
                .store
                .column_facts(run_id, None)
                .await?
                .into_iter()
                .filter(|f| f.upstream.table == short_id)
                .collect(),
        };

        let fields = canonical.columns.clone();
        Ok(EntityLineage {
            entity: summarize(canonical, relationship.as_ref()),
            direction,
            neighbors,
            fine_grained: group_facts(&facts, direction),
            fields,
        })
    }

    /// Tables whose short id contains `query` (case-insensitive), ordered by short id
    pub async fn search(
        &self,
        run_id: &RunId,
        query: &str,
    ) -> Result<Vec<CanonicalTable>, QueryError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .store
            .tables(run_id)
            .await?
            .into_iter()
            .filter(|t| t.short_id.contains(&needle))
            .take(self.search_limit)
            .collect())
    }

    /// Relationship rows matching a filter
    pub async fn relationships(
        &self,
        run_id: &RunId,
        filter: RelationshipFilter,
    ) -> Result<Vec<TableRelationship>, QueryError> {
        Ok(self.store.relationships(run_id, filter).await?)
    }

    /// Counts of derived and raw data
    pub async fn stats(&self, run_id: &RunId) -> Result<RunStats, QueryError> {
        let graph = self.store.graph(run_id).await?;
        let raw_tables = self.store.raw_tables(run_id).await?;
        let raw_edges = self.store.raw_edges(run_id, None).await?;

        let sightings = |role: TableRole| raw_tables.iter().filter(|t| t.role == role).count();
        let edges_of = |kind: EdgeKind| raw_edges.iter().filter(|e| e.kind == kind).count();

        Ok(RunStats {
            tables: graph.table_count(),
            column_facts: graph.column_fact_count(),
            relationships: graph.relationship_count(),
            table_edges: graph.table_edge_count(),
            source_sightings: sightings(TableRole::Source),
            target_sightings: sightings(TableRole::Target),
            intermediate_sightings: sightings(TableRole::Intermediate),
            raw_tables: raw_tables.len(),
            raw_table_edges: edges_of(EdgeKind::Table),
            raw_column_edges: edges_of(EdgeKind::Column),
        })
    }

    /// Every table downstream of `table`, nearest first
    pub async fn impact(&self, run_id: &RunId, table: &str) -> Result<Vec<String>, QueryError> {
        let (short_id, dag) = self.dag_for(run_id, table).await?;
        Ok(dag.downstream(&short_id))
    }

    /// Every table upstream of `table`, nearest first
    pub async fn upstream_closure(
        &self,
        run_id: &RunId,
        table: &str,
    ) -> Result<Vec<String>, QueryError> {
        let (short_id, dag) = self.dag_for(run_id, table).await?;
        Ok(dag.upstream(&short_id))
    }

    /// Whether `downstream` is derived, directly or transitively, from `upstream`
    pub async fn depends_on(
        &self,
        run_id: &RunId,
        downstream: &str,
        upstream: &str,
    ) -> Result<bool, QueryError> {
        let (upstream_id, dag) = self.dag_for(run_id, upstream).await?;
        let downstream_id = canonicalize(downstream)?.short_id;
        if !dag.all_nodes().iter().any(|node| **node == downstream_id) {
            return Err(QueryError::TableNotFound(downstream_id));
        }
        Ok(dag.has_path(&upstream_id, &downstream_id))
    }

    async fn dag_for(
        &self,
        run_id: &RunId,
        table: &str,
    ) -> Result<(String, LineageDag), QueryError> {
        let short_id = canonicalize(table)?.short_id;
        let graph = self.store.graph(run_id).await?;
        if !graph.contains_table(&short_id) {
            return Err(QueryError::TableNotFound(short_id));
        }
        Ok((short_id, LineageDag::from_graph(&graph)))
    }
}

fn summarize(table: CanonicalTable, relationship: Option<&TableRelationship>) -> EntitySummary {
    let (upstream_count, downstream_count) = relationship
        .map(|r| (r.upstream.len(), r.downstream.len()))
        .unwrap_or((0, 0));

    EntitySummary {
        table,
        upstream_count,
        downstream_count,
        has_upstream: upstream_count > 0,
        has_downstream: downstream_count > 0,
    }
}

/// Group facts by the queried table's column, ordered by column
fn group_facts(facts: &[ColumnLineageFact], direction: Direction) -> Vec<FineGrainedLineage> {
    let mut grouped: BTreeMap<&str, Vec<FieldRef>> = BTreeMap::new();

    for fact in facts {
        let provenance = &fact.upstream.provenance;
        let (own_column, other_table, other_column) = match direction {
            Direction::Upstream => {
                (&fact.downstream_column, &fact.upstream.table, &fact.upstream.column)
            }
            Direction::Downstream => {
                (&fact.upstream.column, &fact.downstream_table, &fact.downstream_column)
            }
        };

        grouped.entry(own_column.as_str()).or_default().push(FieldRef {
            table: other_table.clone(),
            column: other_column.clone(),
            transformation_type: provenance.transformation_type.clone(),
            file_id: provenance.file_id.clone(),
            lines: provenance.lines,
        });
    }

    grouped
        .into_iter()
        .map(|(column, related)| FineGrainedLineage {
            column: column.to_string(),
            related,
        })
        .collect()
}
