//! Table aggregation
//!
//! Folds raw per-file table sightings into one canonical node per short id.

use crate::canonical::{canonicalize, CanonicalizeError};
use crate::graph::{LineageGraph, TableMerge};
use sqlineage_core::{ColumnMergePolicy, Diagnostic, DiagnosticCode, Location, RawTableRecord};

/// A raw table record after canonicalization and name normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSighting {
    /// Canonical short id
    pub short_id: String,

    /// Source-schema label
    pub source: String,

    /// Normalized column names, first-seen order
    pub columns: Vec<String>,

    /// Normalized partition keys, first-seen order
    pub partition_keys: Vec<String>,
}

impl TableSighting {
    /// Canonicalize a raw record
    pub fn from_record(record: &RawTableRecord) -> Result<Self, CanonicalizeError> {
        let name = canonicalize(&record.name)?;
        Ok(Self {
            short_id: name.short_id,
            source: name.source,
            columns: normalize_names(&record.columns),
            partition_keys: normalize_names(&record.partition_keys),
        })
    }
}

/// Trim and lower-case names, dropping blanks and repeats (first occurrence wins)
pub fn normalize_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref().trim().to_lowercase();
        if !name.is_empty() && !normalized.contains(&name) {
            normalized.push(name);
        }
    }
    normalized
}

/// Builds canonical tables from raw table records
#[derive(Debug, Clone, Copy, Default)]
pub struct TableAggregator {
    policy: ColumnMergePolicy,
}

impl TableAggregator {
    /// Create an aggregator with a column merge policy
    pub fn new(policy: ColumnMergePolicy) -> Self {
        Self { policy }
    }

    /// Column merge policy in use
    pub fn policy(&self) -> ColumnMergePolicy {
        self.policy
    }

    /// Fold one record into the graph
    pub fn apply(
        &self,
        record: &RawTableRecord,
        graph: &mut LineageGraph,
    ) -> Result<TableMerge, CanonicalizeError> {
        let sighting = TableSighting::from_record(record)?;
        Ok(graph.merge_table(sighting, self.policy))
    }

    /// Fold every record of a run into the graph.
    ///
    /// Records of every role contribute. Returns diagnostics for dropped records.
    pub fn aggregate<'a, I>(&self, records: I, graph: &mut LineageGraph) -> Vec<Diagnostic>
    where
        I: IntoIterator<Item = &'a RawTableRecord>,
    {
        let mut diagnostics = Vec::new();

        for record in records {
            match self.apply(record, graph) {
                Ok(TableMerge::Created) => {
                    tracing::trace!(
                        table = %record.name,
                        file_id = %record.file_id,
                        "canonical table created"
                    );
                }
                Ok(TableMerge::Merged { .. }) => {}
                Err(err) => {
                    tracing::warn!(
                        file_id = %record.file_id,
                        error = %err,
                        "dropping table record"
                    );
                    diagnostics.push(
                        Diagnostic::warn(DiagnosticCode::MalformedIdentifier, err.to_string())
                            .with_location(Location::new(record.file_id.clone()))
                            .with_subjects(vec![record.name.clone()]),
                    );
                }
            }
        }

        diagnostics
    }
}
