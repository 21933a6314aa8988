//! Worker event payloads
//!
//! The extraction worker reports progress and per-file results as JSON events.
//! This module turns a `file_extraction` event into raw table and edge records,
//! accepting the handful of payload shapes the worker has emitted over time.

use crate::diagnostic::{Diagnostic, DiagnosticCode, Location};
use crate::raw::{EdgeKind, RawEdgeRecord, RawTableRecord, RunId, RunInfo, TableRole};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One event as posted by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEvent {
    /// Event type (`file_extraction`, `extraction_run_completed`, ...)
    #[serde(alias = "eventType")]
    pub event_type: String,

    /// Run the event belongs to
    #[serde(alias = "runId")]
    pub run_id: String,

    /// Worker instance that sent the event
    #[serde(default, alias = "podId")]
    pub pod_id: Option<String>,

    /// Event-specific payload
    #[serde(default)]
    pub data: Value,

    /// Worker-side timestamp, passed through untouched
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Known event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    RunCompleted,
    RunFailed,
    FileExtraction,
    ProgressUpdate,
    JobStatusUpdate,
    Unknown,
}

impl EventKind {
    /// Parse the wire event type
    pub fn parse(value: &str) -> Self {
        match value {
            "extraction_run_started" => Self::RunStarted,
            "extraction_run_completed" => Self::RunCompleted,
            "extraction_run_failed" => Self::RunFailed,
            "file_extraction" => Self::FileExtraction,
            "progress_update" => Self::ProgressUpdate,
            "job_status_update" => Self::JobStatusUpdate,
            _ => Self::Unknown,
        }
    }
}

impl WorkerEvent {
    /// Parse an event from JSON
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        serde_json::from_str(json).map_err(|e| EventError::ParseError(e.to_string()))
    }

    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }

    /// Run id of this event
    pub fn run_id(&self) -> RunId {
        RunId::new(self.run_id.clone())
    }
}

/// Errors while reading worker events
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unexpected event type: expected {expected}, got {actual}")]
    UnexpectedEvent { expected: &'static str, actual: String },

    #[error("Event payload is not an object")]
    InvalidPayload,

    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

/// Payload of `extraction_run_started`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStarted {
    pub run: RunInfo,
}

impl RunStarted {
    /// Read a run registration from an event
    pub fn from_event(event: &WorkerEvent) -> Result<Self, EventError> {
        if event.kind() != EventKind::RunStarted {
            return Err(EventError::UnexpectedEvent {
                expected: "extraction_run_started",
                actual: event.event_type.clone(),
            });
        }

        let data = event.data.as_object();
        let repository = data
            .and_then(|d| string_field(d, &["repository_url", "repositoryUrl"]))
            .unwrap_or_else(|| "unknown".to_string());
        let branch = data
            .and_then(|d| string_field(d, &["branch"]))
            .unwrap_or_else(|| "main".to_string());

        Ok(Self {
            run: RunInfo::new(event.run_id(), repository, branch),
        })
    }
}

/// Raw records extracted from one `file_extraction` event
#[derive(Debug, Clone, PartialEq)]
pub struct FileExtraction {
    /// Run the file belongs to
    pub run_id: RunId,

    /// File id (path as reported by the worker)
    pub file_id: String,

    /// Table sightings in payload order
    pub tables: Vec<RawTableRecord>,

    /// Edge sightings in payload order
    pub edges: Vec<RawEdgeRecord>,

    /// Payload entries that could not become records
    pub rejected: Vec<Diagnostic>,
}

impl FileExtraction {
    /// Read table and edge records from a `file_extraction` event
    pub fn from_event(event: &WorkerEvent) -> Result<Self, EventError> {
        if event.kind() != EventKind::FileExtraction {
            return Err(EventError::UnexpectedEvent {
                expected: "file_extraction",
                actual: event.event_type.clone(),
            });
        }

        let data = event.data.as_object().ok_or(EventError::InvalidPayload)?;
        let file_id = string_field(data, &["file_path", "filePath"])
            .ok_or(EventError::MissingField("file_path"))?;
        let run_id = event.run_id();

        let mut extraction = Self {
            run_id,
            file_id,
            tables: Vec::new(),
            edges: Vec::new(),
            rejected: Vec::new(),
        };

        if let Some(Value::Array(tables)) = data.get("tables") {
            for table in tables.iter().filter_map(Value::as_object) {
                extraction.push_table(table);
            }
        }

        for (edge, implied) in collect_edges(data) {
            extraction.push_edge(edge, implied);
        }

        Ok(extraction)
    }

    fn push_table(&mut self, table: &Map<String, Value>) {
        let Some(name) = string_field(table, &["name", "table_name"]) else {
            self.reject("Table entry without a name", Vec::new());
            return;
        };

        let role = table
            .get("role")
            .and_then(Value::as_str)
            .map(TableRole::parse)
            .unwrap_or(TableRole::Intermediate);

        let record = RawTableRecord::new(self.run_id.clone(), self.file_id.clone(), name, role)
            .with_columns(column_names(table.get("columns")))
            .with_partition_keys(partition_keys(table.get("partition_keys")));

        self.tables.push(record);
    }

    fn push_edge(&mut self, edge: &Map<String, Value>, implied: Option<EdgeKind>) {
        let from_table = string_field(edge, &["from_table"]);
        let to_table = string_field(edge, &["to_table"]);

        let (Some(from_table), Some(to_table)) = (from_table, to_table) else {
            self.reject(
                "Lineage edge with missing table names",
                [edge.get("from_table"), edge.get("to_table")]
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            );
            return;
        };

        let kind = match edge.get("edge_type").and_then(Value::as_str) {
            Some(edge_type) => EdgeKind::parse(edge_type),
            None => implied.unwrap_or(EdgeKind::Table),
        };

        self.edges.push(RawEdgeRecord {
            run_id: self.run_id.clone(),
            file_id: self.file_id.clone(),
            kind,
            from_table,
            to_table,
            from_column: string_field(edge, &["from_column"]),
            to_column: string_field(edge, &["to_column"]),
            transformation_type: string_field(edge, &["transformation_type"]),
            transformation_lines: edge
                .get("transformation_lines")
                .filter(|v| v.is_object())
                .cloned(),
            transformation_code: string_field(edge, &["transformation_code"]),
        });
    }

    fn reject(&mut self, message: &str, subjects: Vec<String>) {
        self.rejected.push(
            Diagnostic::warn(DiagnosticCode::RecordRejected, message)
                .with_location(Location::new(self.file_id.clone()))
                .with_subjects(subjects),
        );
    }
}

/// Gather edge objects from every supported payload shape.
///
/// Shapes: a flat `lineageEdges` list; `table_edges` / `column_edges` at the
/// root; the same two lists nested under `lineage`. The second element is the
/// edge kind implied by the list the edge came from.
fn collect_edges(data: &Map<String, Value>) -> Vec<(&Map<String, Value>, Option<EdgeKind>)> {
    let mut edges = Vec::new();

    extend_edges(&mut edges, data.get("lineageEdges"), None);
    extend_edges(&mut edges, data.get("lineage_edges"), None);
    extend_edges(&mut edges, data.get("table_edges"), Some(EdgeKind::Table));
    extend_edges(&mut edges, data.get("column_edges"), Some(EdgeKind::Column));

    if let Some(Value::Object(lineage)) = data.get("lineage") {
        extend_edges(&mut edges, lineage.get("table_edges"), Some(EdgeKind::Table));
        extend_edges(&mut edges, lineage.get("column_edges"), Some(EdgeKind::Column));
    }

    edges
}

fn extend_edges<'a>(
    edges: &mut Vec<(&'a Map<String, Value>, Option<EdgeKind>)>,
    list: Option<&'a Value>,
    implied: Option<EdgeKind>,
) {
    if let Some(Value::Array(items)) = list {
        edges.extend(items.iter().filter_map(Value::as_object).map(|e| (e, implied)));
    }
}

/// First non-blank string among `keys`
fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Column names from either a list or a legacy `{column_1: name, ...}` object
fn column_names(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(Value::Object(map)) => {
            if let Some(nested) = map.get("columns") {
                return column_names(Some(nested));
            }

            let mut keyed: Vec<(&String, String)> = map
                .iter()
                .filter(|(k, _)| k.to_ascii_lowercase().starts_with("column_"))
                .filter_map(|(k, v)| scalar_to_string(v).map(|name| (k, name)))
                .collect();
            keyed.sort_by_key(|(k, _)| column_ordinal(k));
            keyed.into_iter().map(|(_, name)| name).collect()
        }
        _ => Vec::new(),
    }
}

/// Numeric suffix of a `column_N` key, for stable ordering
fn column_ordinal(key: &str) -> (usize, String) {
    let suffix = &key["column_".len()..];
    (suffix.parse().unwrap_or(usize::MAX), key.to_string())
}

/// Partition keys from `[{column_name: ..}]` or a plain list of names
fn partition_keys(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => map.get("column_name").and_then(scalar_to_string),
            other => scalar_to_string(other),
        })
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
