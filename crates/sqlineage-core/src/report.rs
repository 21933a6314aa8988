//! Rebuild report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::raw::RunId;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Counts for one rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildSummary {
    /// Raw table sightings read
    pub raw_tables: usize,

    /// Raw edge sightings read
    pub raw_edges: usize,

    /// Canonical tables produced
    pub tables: usize,

    /// Column lineage facts produced
    pub column_facts: usize,

    /// Relationship rows produced (non-isolated tables)
    pub relationships: usize,

    /// Records that had no effect on the graph
    pub dropped: usize,

    /// Repeated facts or provenance tuples folded away
    pub duplicates: usize,
}

/// Result of a full rebuild of one run (`ReprocessRun`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildReport {
    /// Schema version
    pub version: ReportVersion,

    /// Run that was rebuilt
    pub run_id: RunId,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Summary statistics
    pub summary: RebuildSummary,

    /// Per-record diagnostics
    pub diagnostics: Vec<Diagnostic>,

    /// SHA-256 of the rebuilt graph
    pub fingerprint: String,
}

impl RebuildReport {
    /// Create an empty report for a run
    pub fn new(run_id: RunId) -> Self {
        Self {
            version: ReportVersion::CURRENT,
            run_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: RebuildSummary::default(),
            diagnostics: Vec::new(),
            fingerprint: String::new(),
        }
    }

    /// Add a diagnostic and count it
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        if diagnostic.code.is_drop() {
            self.summary.dropped += 1;
        } else if matches!(
            diagnostic.code,
            DiagnosticCode::DuplicateColumnFact | DiagnosticCode::DuplicateProvenance
        ) {
            self.summary.duplicates += 1;
        }

        self.diagnostics.push(diagnostic);
    }

    /// Add several diagnostics
    pub fn extend_diagnostics(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.add_diagnostic(diagnostic);
        }
    }

    /// Diagnostics with a given code
    pub fn diagnostics_with(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }

    /// Check if any record was dropped
    pub fn has_drops(&self) -> bool {
        self.summary.dropped > 0
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}
