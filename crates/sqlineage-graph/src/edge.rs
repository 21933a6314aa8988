//! Edge endpoint resolution shared by the column and table builders

use crate::canonical::{canonicalize, CanonicalizeError};
use crate::graph::LineageGraph;
use sqlineage_core::{Diagnostic, DiagnosticCode, Location, RawEdgeRecord};

/// Why an edge record had no effect on the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeRejection {
    /// An endpoint name has no usable table segment
    Malformed(String),

    /// Endpoint short ids that are not canonical tables of the run
    Orphan { missing: Vec<String> },

    /// Column edge without columns on one side
    EmptyColumns,
}

impl From<CanonicalizeError> for EdgeRejection {
    fn from(err: CanonicalizeError) -> Self {
        match err {
            CanonicalizeError::MalformedIdentifier(raw) => Self::Malformed(raw),
        }
    }
}

impl EdgeRejection {
    /// Diagnostic code for this rejection
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Malformed(_) => DiagnosticCode::MalformedIdentifier,
            Self::Orphan { .. } => DiagnosticCode::OrphanEdge,
            Self::EmptyColumns => DiagnosticCode::EmptyColumnReference,
        }
    }

    /// Describe the rejection of `edge`
    pub fn to_diagnostic(&self, edge: &RawEdgeRecord) -> Diagnostic {
        let message = match self {
            Self::Malformed(raw) => format!("Identifier '{}' has no usable table segment", raw),
            Self::Orphan { missing } => format!(
                "{} edge {} -> {} references unrecorded table(s): {}",
                edge.kind.as_str(),
                edge.from_table,
                edge.to_table,
                missing.join(", ")
            ),
            Self::EmptyColumns => format!(
                "Column edge {} -> {} names no columns on one side",
                edge.from_table, edge.to_table
            ),
        };

        let range = edge.line_range();
        let location = Location::with_lines(edge.file_id.clone(), range.start_line, range.end_line);
        Diagnostic::warn(self.code(), message)
            .with_location(location)
            .with_subjects(vec![edge.from_table.clone(), edge.to_table.clone()])
    }

    /// Short ids whose arrival could make the edge applicable
    pub fn missing_tables(&self) -> &[String] {
        match self {
            Self::Orphan { missing } => missing,
            _ => &[],
        }
    }
}

/// An edge whose endpoints are both canonical tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdge {
    /// Short id of the table read from
    pub upstream: String,

    /// Short id of the table written to
    pub downstream: String,
}

impl ResolvedEdge {
    /// Canonicalize both endpoints and require both to be tables of `graph`
    pub fn resolve(edge: &RawEdgeRecord, graph: &LineageGraph) -> Result<Self, EdgeRejection> {
        Self::resolve_with(edge, |table| graph.contains_table(table))
    }

    /// Canonicalize both endpoints without checking that they exist
    pub fn canonical_endpoints(edge: &RawEdgeRecord) -> Result<(String, String), EdgeRejection> {
        Ok((
            canonicalize(&edge.from_table)?.short_id,
            canonicalize(&edge.to_table)?.short_id,
        ))
    }

    /// Like [`ResolvedEdge::resolve`], with table existence answered by `known`
    pub fn resolve_with<F>(edge: &RawEdgeRecord, known: F) -> Result<Self, EdgeRejection>
    where
        F: Fn(&str) -> bool,
    {
        let (upstream, downstream) = Self::canonical_endpoints(edge)?;

        let mut missing = Vec::new();
        for table in [&upstream, &downstream] {
            if !known(table) && !missing.contains(table) {
                missing.push(table.clone());
            }
        }

        if !missing.is_empty() {
            return Err(EdgeRejection::Orphan { missing });
        }

        Ok(Self { upstream, downstream })
    }
}
