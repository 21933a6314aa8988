//! Identifier canonicalization
//!
//! Turns a raw qualified name such as `analytics.{{ var('schema') }}.Orders`
//! into a short table id (`orders`) and a source-schema label.

use regex::Regex;
use sqlineage_core::UNKNOWN_SCHEMA;
use std::sync::OnceLock;

/// Canonical form of a qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalName {
    /// Last non-empty segment, lower-cased
    pub short_id: String,

    /// Segments before the short id, lower-cased, or `unknown_schema`
    pub source: String,
}

/// Canonicalization failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalizeError {
    #[error("Malformed identifier: '{0}' has no usable table segment")]
    MalformedIdentifier(String),
}

/// `{{ ... }}` expressions, `{% ... %}` statements and `{# ... #}` comments
fn template_spans() -> &'static Regex {
    static SPANS: OnceLock<Regex> = OnceLock::new();
    SPANS.get_or_init(|| {
        Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}|\{#.*?#\}").expect("template span pattern is valid")
    })
}

/// Remove templating spans and collapse the whitespace they leave behind
pub fn strip_templates(raw: &str) -> String {
    let stripped = template_spans().replace_all(raw, "");
    stripped
        .replace('\u{00A0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonicalize a raw qualified name.
///
/// The short id is the last non-empty `.` segment. The source label is the
/// join of the segments before it, or `unknown_schema` when there are none or
/// when the segment right before the short id was entirely templated.
pub fn canonicalize(raw: &str) -> Result<CanonicalName, CanonicalizeError> {
    let cleaned = strip_templates(raw).to_lowercase();
    let segments: Vec<&str> = cleaned.split('.').map(str::trim).collect();

    let Some(last) = segments.iter().rposition(|s| !s.is_empty()) else {
        return Err(CanonicalizeError::MalformedIdentifier(raw.to_string()));
    };

    let prefix = &segments[..last];
    let source = match prefix.last() {
        Some(schema) if !schema.is_empty() => prefix
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("."),
        _ => UNKNOWN_SCHEMA.to_string(),
    };

    Ok(CanonicalName {
        short_id: segments[last].to_string(),
        source,
    })
}
