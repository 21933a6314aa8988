//! Diagnostic codes for records the graph builders skip or fold
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Identifier issues (1xxx)
    /// Canonicalization left no usable short id
    MalformedIdentifier,

    // Edge issues (2xxx)
    /// Edge endpoint table was never recorded in the run
    OrphanEdge,

    /// Column edge without an upstream or downstream column
    EmptyColumnReference,

    /// Edge held back until its endpoint table arrives
    ParkedEdge,

    // Deduplication (3xxx)
    /// Identical table-level provenance was already attached
    DuplicateProvenance,

    /// Column lineage fact with the same key already exists
    DuplicateColumnFact,

    // Ingestion (4xxx)
    /// Worker payload entry rejected before storage
    RecordRejected,

    // General (9xxx)
    /// General informational message
    Info,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedIdentifier => "MALFORMED_IDENTIFIER",
            Self::OrphanEdge => "ORPHAN_EDGE",
            Self::EmptyColumnReference => "EMPTY_COLUMN_REFERENCE",
            Self::ParkedEdge => "PARKED_EDGE",
            Self::DuplicateProvenance => "DUPLICATE_PROVENANCE",
            Self::DuplicateColumnFact => "DUPLICATE_COLUMN_FACT",
            Self::RecordRejected => "RECORD_REJECTED",
            Self::Info => "INFO",
        }
    }

    /// Whether this code means the record had no effect on the graph
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            Self::MalformedIdentifier
                | Self::OrphanEdge
                | Self::EmptyColumnReference
                | Self::RecordRejected
        )
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - the record was dropped
    Warn,

    /// Error - the record could not be processed at all
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Source location of the record a diagnostic refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File id as recorded by the worker
    pub file: String,

    /// Optional start line (1-indexed)
    pub line: Option<u32>,

    /// Optional end line (for ranges)
    pub end_line: Option<u32>,
}

impl Location {
    /// Create a new location with just a file id
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            end_line: None,
        }
    }

    /// Create a location with a line range
    pub fn with_lines(file: impl Into<String>, line: Option<u32>, end_line: Option<u32>) -> Self {
        Self {
            file: file.into(),
            line,
            end_line,
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Raw identifiers involved (qualified names as reported)
    pub subjects: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            subjects: Vec::new(),
        }
    }

    /// Warning-level diagnostic, the usual shape for a dropped record
    pub fn warn(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warn, message)
    }

    /// Info-level diagnostic
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Info, message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the identifiers involved
    pub fn with_subjects(mut self, subjects: Vec<String>) -> Self {
        self.subjects = subjects;
        self
    }
}
