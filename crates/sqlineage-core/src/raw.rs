//! Raw extraction records reported by the SQL-parsing worker
//!
//! Raw records are immutable once stored and always scoped to a run and a file.
//! Names are kept exactly as reported (possibly templated); canonicalization
//! happens in the graph builders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier of one extraction run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Create a run id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One execution of the extraction worker over a repository snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Run identifier
    pub run_id: RunId,

    /// Repository that was scanned
    pub repository_url: String,

    /// Branch that was scanned
    pub branch: String,

    /// When the run was registered
    pub started_at: DateTime<Utc>,

    /// When the worker reported overall completion
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunInfo {
    /// Register a run starting now
    pub fn new(
        run_id: impl Into<RunId>,
        repository_url: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            repository_url: repository_url.into(),
            branch: branch.into(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Role of a table within the file that mentions it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableRole {
    /// Read by the file
    Source,

    /// Written by the file
    Target,

    /// CTEs, temp tables and other in-file intermediates
    Intermediate,
}

impl TableRole {
    /// Parse a worker role string (case-insensitive). Unknown roles are intermediate.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "source" => Self::Source,
            "target" => Self::Target,
            _ => Self::Intermediate,
        }
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
            Self::Intermediate => "intermediate",
        }
    }
}

/// Granularity of a lineage edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Table feeds table
    Table,

    /// Column feeds column
    Column,
}

impl EdgeKind {
    /// Parse a worker `edge_type` string.
    ///
    /// `COLUMN_EDGE` and `COLUMN_LINEAGE` (any case) are column edges;
    /// everything else is a table edge.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "COLUMN_EDGE" | "COLUMN_LINEAGE" | "COLUMN" => Self::Column,
            _ => Self::Table,
        }
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Column => "column",
        }
    }
}

/// Parse one line value from a `transformation_lines` payload.
///
/// Accepts bare integers and strings with an optional leading line marker
/// (`"L42"` -> 42). Zero, negative and unparsable values are absent.
pub fn parse_line_value(value: &Value) -> Option<u32> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            let digits = s.strip_prefix(|c: char| c == 'L' || c == 'l').unwrap_or(s);
            digits.trim().parse::<i64>().ok()
        }
        _ => None,
    }?;

    if parsed > 0 {
        u32::try_from(parsed).ok()
    } else {
        None
    }
}

/// Source line range of a transformation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    /// First line (1-indexed)
    pub start_line: Option<u32>,

    /// Last line (inclusive)
    pub end_line: Option<u32>,
}

impl LineRange {
    /// A fully known range
    pub fn new(start_line: u32, end_line: u32) -> Self {
        Self {
            start_line: Some(start_line),
            end_line: Some(end_line),
        }
    }

    /// Parse a `{start_line, end_line}` payload. Missing payload => empty range.
    pub fn from_payload(payload: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = payload else {
            return Self::default();
        };

        Self {
            start_line: map.get("start_line").and_then(parse_line_value),
            end_line: map.get("end_line").and_then(parse_line_value),
        }
    }

    /// Neither bound is known
    pub fn is_empty(&self) -> bool {
        self.start_line.is_none() && self.end_line.is_none()
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start_line, self.end_line) {
            (Some(s), Some(e)) => write!(f, "L{}-L{}", s, e),
            (Some(s), None) => write!(f, "L{}", s),
            (None, Some(e)) => write!(f, "..L{}", e),
            (None, None) => write!(f, "?"),
        }
    }
}

/// Number of context lines the worker captured around a transformation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineContext {
    /// Lines captured before `start_line`
    pub lines_before_start_line: u32,

    /// Lines captured after `end_line`
    pub lines_after_end_line: u32,
}

impl LineContext {
    /// Parse the context counts from a `transformation_lines` payload
    pub fn from_payload(payload: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = payload else {
            return Self::default();
        };

        let count = |keys: &[&str]| -> u32 {
            keys.iter()
                .find_map(|k| map.get(*k))
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(0)
        };

        Self {
            lines_before_start_line: count(&[
                "lines_before_start_line",
                "count_line_before_start_line",
            ]),
            lines_after_end_line: count(&["lines_after_end_line", "count_line_after_end_line"]),
        }
    }
}

/// One table sighting from one parsed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTableRecord {
    /// Run the sighting belongs to
    pub run_id: RunId,

    /// File the table was seen in (as recorded, never reinterpreted)
    pub file_id: String,

    /// Qualified name, possibly containing templating placeholders
    pub name: String,

    /// Role of the table in the file
    pub role: TableRole,

    /// Column names as reported
    #[serde(default)]
    pub columns: Vec<String>,

    /// Partition key column names as reported
    #[serde(default)]
    pub partition_keys: Vec<String>,
}

impl RawTableRecord {
    /// Create a sighting without columns
    pub fn new(
        run_id: impl Into<RunId>,
        file_id: impl Into<String>,
        name: impl Into<String>,
        role: TableRole,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            file_id: file_id.into(),
            name: name.into(),
            role,
            columns: Vec::new(),
            partition_keys: Vec::new(),
        }
    }

    /// Set the reported columns
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the reported partition keys
    pub fn with_partition_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// One relationship sighting from one parsed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdgeRecord {
    /// Run the sighting belongs to
    pub run_id: RunId,

    /// File the edge was seen in
    pub file_id: String,

    /// Table or column edge
    pub kind: EdgeKind,

    /// Upstream qualified table name
    pub from_table: String,

    /// Downstream qualified table name
    pub to_table: String,

    /// Upstream column (column edges; may hold several delimited names)
    pub from_column: Option<String>,

    /// Downstream column (column edges; may hold several delimited names)
    pub to_column: Option<String>,

    /// Transformation kind as reported (e.g. `INSERT`, `CAST`)
    pub transformation_type: Option<String>,

    /// Raw `{start_line, end_line}` payload; parsed by the builders
    pub transformation_lines: Option<Value>,

    /// Source snippet of the transformation
    pub transformation_code: Option<String>,
}

impl RawEdgeRecord {
    /// Create a table-level edge
    pub fn table_edge(
        run_id: impl Into<RunId>,
        file_id: impl Into<String>,
        from_table: impl Into<String>,
        to_table: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            file_id: file_id.into(),
            kind: EdgeKind::Table,
            from_table: from_table.into(),
            to_table: to_table.into(),
            from_column: None,
            to_column: None,
            transformation_type: None,
            transformation_lines: None,
            transformation_code: None,
        }
    }

    /// Create a column-level edge
    pub fn column_edge(
        run_id: impl Into<RunId>,
        file_id: impl Into<String>,
        from: (&str, &str),
        to: (&str, &str),
    ) -> Self {
        let mut edge = Self::table_edge(run_id, file_id, from.0, to.0);
        edge.kind = EdgeKind::Column;
        edge.from_column = Some(from.1.to_string());
        edge.to_column = Some(to.1.to_string());
        edge
    }

    /// Set the transformation kind
    pub fn with_transformation(mut self, kind: impl Into<String>) -> Self {
        self.transformation_type = Some(kind.into());
        self
    }

    /// Set the line payload from a known range
    pub fn with_lines(mut self, start_line: u32, end_line: u32) -> Self {
        self.transformation_lines = Some(serde_json::json!({
            "start_line": start_line,
            "end_line": end_line,
        }));
        self
    }

    /// Set the raw line payload as reported
    pub fn with_lines_payload(mut self, payload: Value) -> Self {
        self.transformation_lines = Some(payload);
        self
    }

    /// Set the transformation snippet
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.transformation_code = Some(code.into());
        self
    }

    /// Parsed line range of the transformation
    pub fn line_range(&self) -> LineRange {
        LineRange::from_payload(self.transformation_lines.as_ref())
    }

    /// Parsed context line counts
    pub fn line_context(&self) -> LineContext {
        LineContext::from_payload(self.transformation_lines.as_ref())
    }

    /// Transformation kind, `UNKNOWN` when absent or blank
    pub fn transformation_kind(&self) -> &str {
        match self.transformation_type.as_deref().map(str::trim) {
            Some(kind) if !kind.is_empty() => kind,
            _ => crate::lineage::UNKNOWN_TRANSFORMATION,
        }
    }
}
