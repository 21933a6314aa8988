//! The canonical lineage graph of one run
//!
//! `LineageGraph` owns the three derived collections (tables, column facts,
//! relationships) and the only code allowed to change them. The batch
//! builders and the store's incremental upserts both go through these merge
//! primitives, which is what makes the two paths converge.

use crate::aggregate::TableSighting;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlineage_core::{
    CanonicalTable, ColumnFactKey, ColumnLineageFact, ColumnMergePolicy, Direction,
    TableRelationship, TransformationProvenance, UNKNOWN_SCHEMA,
};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Outcome of folding one sighting into the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMerge {
    /// First sighting of the short id
    Created,

    /// Existing node updated; `added_columns` new columns were recorded
    Merged { added_columns: usize },
}

/// Canonical tables, column facts and relationships of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineageGraph {
    tables: BTreeMap<String, CanonicalTable>,
    column_facts: BTreeMap<ColumnFactKey, ColumnLineageFact>,
    relationships: BTreeMap<String, TableRelationship>,
}

impl LineageGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one table sighting into its canonical node, creating it if absent
    pub fn merge_table(
        &mut self,
        sighting: TableSighting,
        policy: ColumnMergePolicy,
    ) -> TableMerge {
        let Some(table) = self.tables.get_mut(&sighting.short_id) else {
            let mut table = CanonicalTable::new(sighting.short_id.clone(), sighting.source);
            table.columns = sighting.columns;
            table.partition_keys = sighting.partition_keys;
            self.tables.insert(sighting.short_id, table);
            return TableMerge::Created;
        };

        let before = table.columns.len();
        match policy {
            ColumnMergePolicy::Union => {
                for column in sighting.columns {
                    if !table.columns.contains(&column) {
                        table.columns.push(column);
                    }
                }
            }
            ColumnMergePolicy::LargestWins => {
                if sighting.columns.len() > table.columns.len() {
                    table.columns = sighting.columns;
                }
            }
        }

        for key in sighting.partition_keys {
            if !table.partition_keys.contains(&key) {
                table.partition_keys.push(key);
            }
        }

        if prefer_source(&table.source, &sighting.source) {
            table.source = sighting.source;
        }

        TableMerge::Merged {
            added_columns: table.columns.len().saturating_sub(before),
        }
    }

    /// Insert a column fact, keeping the smallest provenance per key.
    ///
    /// Returns `true` if the key was new. A fact for a known key replaces the
    /// stored one only when its provenance orders first, so the stored fact
    /// does not depend on arrival order.
    pub fn add_column_fact(&mut self, fact: ColumnLineageFact) -> bool {
        match self.column_facts.entry(fact.key()) {
            Entry::Vacant(slot) => {
                slot.insert(fact);
                true
            }
            Entry::Occupied(mut slot) => {
                if fact.upstream.provenance < slot.get().upstream.provenance {
                    slot.insert(fact);
                }
                false
            }
        }
    }

    /// Record that `upstream` feeds `downstream`, on both adjacency lists.
    ///
    /// The provenance tuple is appended to `downstream`'s upstream entry for
    /// `upstream` and to `upstream`'s downstream entry for `downstream`, each
    /// time unless an identical tuple is already there. Returns `true` if the
    /// tuple was new.
    pub fn link(
        &mut self,
        upstream: &str,
        downstream: &str,
        provenance: TransformationProvenance,
    ) -> bool {
        let added_up = self
            .relationships
            .entry(downstream.to_string())
            .or_insert_with(|| TableRelationship::new(downstream))
            .neighbor_mut(Direction::Upstream, upstream)
            .attach(provenance.clone());

        let added_down = self
            .relationships
            .entry(upstream.to_string())
            .or_insert_with(|| TableRelationship::new(upstream))
            .neighbor_mut(Direction::Downstream, downstream)
            .attach(provenance);

        debug_assert_eq!(added_up, added_down, "adjacency lists diverged");
        added_up || added_down
    }

    /// Check whether a canonical table exists
    pub fn contains_table(&self, short_id: &str) -> bool {
        self.tables.contains_key(short_id)
    }

    /// Get a canonical table
    pub fn table(&self, short_id: &str) -> Option<&CanonicalTable> {
        self.tables.get(short_id)
    }

    /// All canonical tables, ordered by short id
    pub fn tables(&self) -> impl Iterator<Item = &CanonicalTable> {
        self.tables.values()
    }

    /// All column facts, ordered by key
    pub fn column_facts(&self) -> impl Iterator<Item = &ColumnLineageFact> {
        self.column_facts.values()
    }

    /// Column facts whose downstream table is `short_id`
    pub fn column_facts_for<'a>(
        &'a self,
        short_id: &'a str,
    ) -> impl Iterator<Item = &'a ColumnLineageFact> + 'a {
        self.column_facts.values().filter(move |f| f.downstream_table == short_id)
    }

    /// Check whether a column fact with this key exists
    pub fn contains_column_fact(&self, key: &ColumnFactKey) -> bool {
        self.column_facts.contains_key(key)
    }

    /// Adjacency record of a table (absent for isolated tables)
    pub fn relationship(&self, short_id: &str) -> Option<&TableRelationship> {
        self.relationships.get(short_id)
    }

    /// All relationship rows, ordered by table
    pub fn relationships(&self) -> impl Iterator<Item = &TableRelationship> {
        self.relationships.values()
    }

    /// Number of canonical tables
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of column facts
    pub fn column_fact_count(&self) -> usize {
        self.column_facts.len()
    }

    /// Number of relationship rows
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Number of distinct table-to-table edges
    pub fn table_edge_count(&self) -> usize {
        self.relationships.values().map(|r| r.upstream.len()).sum()
    }

    /// Nothing has been derived yet
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.column_facts.is_empty() && self.relationships.is_empty()
    }

    /// Serializable copy of the graph
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            tables: self.tables.values().cloned().collect(),
            column_facts: self.column_facts.values().cloned().collect(),
            relationships: self.relationships.values().cloned().collect(),
        }
    }

    /// Fingerprint of the normalized snapshot; equal graphs hash equal
    /// whatever order their records arrived in
    pub fn fingerprint(&self) -> String {
        self.snapshot().normalized().fingerprint()
    }

    /// Rebuild a graph from a snapshot
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        Self {
            tables: snapshot.tables.into_iter().map(|t| (t.short_id.clone(), t)).collect(),
            column_facts: snapshot.column_facts.into_iter().map(|f| (f.key(), f)).collect(),
            relationships: snapshot
                .relationships
                .into_iter()
                .map(|r| (r.table.clone(), r))
                .collect(),
        }
    }
}

/// Whether `candidate` should replace `current` as a table's source label.
///
/// Concrete labels beat `unknown_schema`; among concrete labels the
/// lexicographically smallest wins.
fn prefer_source(current: &str, candidate: &str) -> bool {
    if candidate.is_empty() || candidate == UNKNOWN_SCHEMA {
        return false;
    }
    current.is_empty() || current == UNKNOWN_SCHEMA || candidate < current
}

/// Ordered, serializable form of a [`LineageGraph`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub tables: Vec<CanonicalTable>,
    pub column_facts: Vec<ColumnLineageFact>,
    pub relationships: Vec<TableRelationship>,
}

impl GraphSnapshot {
    /// Canonical ordering that ignores arrival order.
    ///
    /// Sorts columns, partition keys, neighbor entries and provenance tuples so
    /// graphs built from the same records in different orders compare equal.
    pub fn normalized(mut self) -> Self {
        for table in &mut self.tables {
            table.columns.sort();
            table.partition_keys.sort();
        }
        for relationship in &mut self.relationships {
            for side in [&mut relationship.upstream, &mut relationship.downstream] {
                side.sort_by(|a, b| a.table.cmp(&b.table));
                for entry in side.iter_mut() {
                    entry.transformations.sort();
                }
            }
        }
        self
    }

    /// SHA-256 hex digest of the JSON serialization
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
