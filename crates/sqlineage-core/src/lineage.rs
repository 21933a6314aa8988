//! Canonical lineage graph types
//!
//! These are derived data: they are regenerated by a full rebuild or upserted
//! by the realtime path, never hand-edited.

use crate::raw::{LineContext, LineRange};
use serde::{Deserialize, Serialize};

/// Source label used when a qualified name carries no usable schema prefix
pub const UNKNOWN_SCHEMA: &str = "unknown_schema";

/// Transformation kind used when the worker reported none
pub const UNKNOWN_TRANSFORMATION: &str = "UNKNOWN";

/// The aggregated node for one short table id within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTable {
    /// Canonical short id (graph node key)
    pub short_id: String,

    /// Source-schema label (`unknown_schema` when not derivable)
    pub source: String,

    /// Merged column names, first-seen order
    pub columns: Vec<String>,

    /// Merged partition keys, first-seen order
    pub partition_keys: Vec<String>,
}

impl CanonicalTable {
    /// Create an empty table node
    pub fn new(short_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            short_id: short_id.into(),
            source: source.into(),
            columns: Vec::new(),
            partition_keys: Vec::new(),
        }
    }

    /// Number of known columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check whether a column is known
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Whether the source label is the placeholder
    pub fn has_unknown_source(&self) -> bool {
        self.source.is_empty() || self.source == UNKNOWN_SCHEMA
    }
}

/// Where in source code a table dependency was observed
///
/// Equality over all three fields is the deduplication key inside one
/// neighbor entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransformationProvenance {
    /// File id as recorded
    pub file_id: String,

    /// Line range of the transformation
    pub lines: LineRange,

    /// Transformation kind (`INSERT`, `MERGE`, ...)
    pub transformation_type: String,
}

impl TransformationProvenance {
    /// Create a provenance tuple
    pub fn new(
        file_id: impl Into<String>,
        lines: LineRange,
        transformation_type: impl Into<String>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            lines,
            transformation_type: transformation_type.into(),
        }
    }
}

/// One neighbor of a table with every place the dependency was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    /// Short id of the neighbor
    pub table: String,

    /// Deduplicated provenance tuples, insertion order
    pub transformations: Vec<TransformationProvenance>,
}

impl NeighborEntry {
    /// Create a neighbor without provenance
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            transformations: Vec::new(),
        }
    }

    /// Append a provenance tuple unless an identical one is present.
    ///
    /// Returns `true` if the tuple was added.
    pub fn attach(&mut self, provenance: TransformationProvenance) -> bool {
        if self.transformations.contains(&provenance) {
            return false;
        }
        self.transformations.push(provenance);
        true
    }
}

/// Side of an adjacency list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Tables feeding this one
    Upstream,

    /// Tables fed by this one
    Downstream,
}

impl Direction {
    /// The mirrored side
    pub fn opposite(&self) -> Self {
        match self {
            Self::Upstream => Self::Downstream,
            Self::Downstream => Self::Upstream,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream => write!(f, "upstream"),
            Self::Downstream => write!(f, "downstream"),
        }
    }
}

/// Adjacency record of one canonical table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRelationship {
    /// Short id of the table
    pub table: String,

    /// Tables this one reads from
    pub upstream: Vec<NeighborEntry>,

    /// Tables this one feeds
    pub downstream: Vec<NeighborEntry>,
}

impl TableRelationship {
    /// Create an empty adjacency record
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            upstream: Vec::new(),
            downstream: Vec::new(),
        }
    }

    /// Neighbors on one side
    pub fn neighbors(&self, direction: Direction) -> &[NeighborEntry] {
        match direction {
            Direction::Upstream => &self.upstream,
            Direction::Downstream => &self.downstream,
        }
    }

    /// Find a neighbor entry on one side
    pub fn neighbor(&self, direction: Direction, table: &str) -> Option<&NeighborEntry> {
        self.neighbors(direction).iter().find(|n| n.table == table)
    }

    /// Locate or create the neighbor entry for `table` on one side
    pub fn neighbor_mut(&mut self, direction: Direction, table: &str) -> &mut NeighborEntry {
        let list = match direction {
            Direction::Upstream => &mut self.upstream,
            Direction::Downstream => &mut self.downstream,
        };

        let index = match list.iter().position(|n| n.table == table) {
            Some(index) => index,
            None => {
                list.push(NeighborEntry::new(table));
                list.len() - 1
            }
        };
        &mut list[index]
    }

    /// Has at least one upstream neighbor
    pub fn has_upstream(&self) -> bool {
        !self.upstream.is_empty()
    }

    /// Has at least one downstream neighbor
    pub fn has_downstream(&self) -> bool {
        !self.downstream.is_empty()
    }

    /// Neither side has neighbors
    pub fn is_isolated(&self) -> bool {
        !self.has_upstream() && !self.has_downstream()
    }
}

/// Provenance of a column-level fact
///
/// Ordered field by field; the smallest provenance of a fact key is the one
/// kept in the graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnProvenance {
    /// File id as recorded
    pub file_id: String,

    /// Transformation kind (`UNKNOWN` if absent)
    pub transformation_type: String,

    /// Line range of the transformation
    pub lines: LineRange,

    /// Context lines captured around the range
    #[serde(default)]
    pub context: LineContext,

    /// Transformation snippet
    pub code: Option<String>,
}

impl ColumnProvenance {
    /// Table-level view of this provenance
    pub fn as_transformation(&self) -> TransformationProvenance {
        TransformationProvenance::new(
            self.file_id.clone(),
            self.lines,
            self.transformation_type.clone(),
        )
    }
}

/// Upstream side of a column fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRef {
    /// Upstream short table id
    pub table: String,

    /// Upstream column
    pub column: String,

    /// Where the dependency was observed
    pub provenance: ColumnProvenance,
}

/// One fine-grained edge: upstream column feeds downstream column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLineageFact {
    /// Downstream short table id
    pub downstream_table: String,

    /// Downstream column
    pub downstream_column: String,

    /// Upstream reference
    pub upstream: UpstreamRef,
}

impl ColumnLineageFact {
    /// Logical key of the fact within a run
    pub fn key(&self) -> ColumnFactKey {
        ColumnFactKey {
            downstream_table: self.downstream_table.clone(),
            downstream_column: self.downstream_column.clone(),
            upstream_table: self.upstream.table.clone(),
            upstream_column: self.upstream.column.clone(),
        }
    }
}

/// Key of a column fact (the run is implied by the graph holding it)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnFactKey {
    pub downstream_table: String,
    pub downstream_column: String,
    pub upstream_table: String,
    pub upstream_column: String,
}

impl std::fmt::Display for ColumnFactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} <- {}.{}",
            self.downstream_table, self.downstream_column, self.upstream_table, self.upstream_column
        )
    }
}
