//! Column lineage expansion
//!
//! A raw column edge may name several columns on either side in one delimited
//! value. It expands to the Cartesian product of upstream and downstream
//! columns, one fact per pair, each carrying the edge's provenance.

use crate::edge::{EdgeRejection, ResolvedEdge};
use crate::graph::LineageGraph;
use sqlineage_core::{
    ColumnLineageFact, ColumnProvenance, Diagnostic, DiagnosticCode, EdgeKind, Location,
    RawEdgeRecord, UpstreamRef,
};

/// Expands column edges into column lineage facts
#[derive(Debug, Clone)]
pub struct ColumnLineageBuilder {
    delimiter: String,
}

impl Default for ColumnLineageBuilder {
    fn default() -> Self {
        Self::new(",")
    }
}

impl ColumnLineageBuilder {
    /// Create a builder splitting multi-column values on `delimiter`
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    /// Split a column value into normalized column names
    pub fn parse_columns(&self, value: Option<&str>) -> Vec<String> {
        let Some(value) = value else {
            return Vec::new();
        };

        let parts: Vec<&str> = if self.delimiter.is_empty() {
            vec![value]
        } else {
            value.split(self.delimiter.as_str()).collect()
        };
        crate::aggregate::normalize_names(&parts)
    }

    /// Provenance carried by every fact of `edge`
    pub fn provenance(edge: &RawEdgeRecord) -> ColumnProvenance {
        ColumnProvenance {
            file_id: edge.file_id.clone(),
            transformation_type: edge.transformation_kind().to_string(),
            lines: edge.line_range(),
            context: edge.line_context(),
            code: edge.transformation_code.clone(),
        }
    }

    /// Facts of an edge whose endpoints are already resolved
    pub fn facts(
        &self,
        edge: &RawEdgeRecord,
        resolved: &ResolvedEdge,
    ) -> Result<Vec<ColumnLineageFact>, EdgeRejection> {
        let upstream_columns = self.parse_columns(edge.from_column.as_deref());
        let downstream_columns = self.parse_columns(edge.to_column.as_deref());
        if upstream_columns.is_empty() || downstream_columns.is_empty() {
            return Err(EdgeRejection::EmptyColumns);
        }

        let provenance = Self::provenance(edge);
        let mut facts = Vec::with_capacity(upstream_columns.len() * downstream_columns.len());
        for upstream_column in &upstream_columns {
            for downstream_column in &downstream_columns {
                facts.push(ColumnLineageFact {
                    downstream_table: resolved.downstream.clone(),
                    downstream_column: downstream_column.clone(),
                    upstream: UpstreamRef {
                        table: resolved.upstream.clone(),
                        column: upstream_column.clone(),
                        provenance: provenance.clone(),
                    },
                });
            }
        }

        Ok(facts)
    }

    /// Resolve an edge against `graph` and expand it
    pub fn expand(
        &self,
        edge: &RawEdgeRecord,
        graph: &LineageGraph,
    ) -> Result<Vec<ColumnLineageFact>, EdgeRejection> {
        if self.parse_columns(edge.from_column.as_deref()).is_empty()
            || self.parse_columns(edge.to_column.as_deref()).is_empty()
        {
            return Err(EdgeRejection::EmptyColumns);
        }

        let resolved = ResolvedEdge::resolve(edge, graph)?;
        self.facts(edge, &resolved)
    }

    /// Add the facts of every column edge to the graph.
    ///
    /// Table edges are ignored. Returns diagnostics for dropped edges and for
    /// facts whose key was already present.
    pub fn build<'a, I>(&self, edges: I, graph: &mut LineageGraph) -> Vec<Diagnostic>
    where
        I: IntoIterator<Item = &'a RawEdgeRecord>,
    {
        let mut diagnostics = Vec::new();

        for edge in edges.into_iter().filter(|e| e.kind == EdgeKind::Column) {
            let facts = match self.expand(edge, graph) {
                Ok(facts) => facts,
                Err(rejection) => {
                    tracing::debug!(
                        file_id = %edge.file_id,
                        code = %rejection.code(),
                        "dropping column edge"
                    );
                    diagnostics.push(rejection.to_diagnostic(edge));
                    continue;
                }
            };

            for fact in facts {
                let key = fact.key();
                if !graph.add_column_fact(fact) {
                    let message = format!("Column fact {} already recorded", key);
                    diagnostics.push(
                        Diagnostic::info(DiagnosticCode::DuplicateColumnFact, message)
                            .with_location(Location::new(edge.file_id.clone())),
                    );
                }
            }
        }

        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::TableAggregator;
    use sqlineage_core::{LineRange, RawTableRecord, TableRole};

    fn graph() -> LineageGraph {
        let mut graph = LineageGraph::new();
        let records = vec![
            RawTableRecord::new("run-1", "f.sql", "stg_orders", TableRole::Source)
                .with_columns(["id", "amount"]),
            RawTableRecord::new("run-1", "f.sql", "orders", TableRole::Target)
                .with_columns(["id", "total_amount"]),
        ];
        TableAggregator::default().aggregate(&records, &mut graph);
        graph
    }

    #[test]
    fn single_pair_with_provenance() {
        let mut graph = graph();
        let edge = RawEdgeRecord::column_edge(
            "run-1",
            "f.sql",
            ("stg_orders", "amount"),
            ("orders", "total_amount"),
        )
        .with_transformation("CAST")
        .with_lines_payload(serde_json::json!({
            "start_line": "L3",
            "end_line": 4,
            "lines_before_start_line": 1
        }))
        .with_code("CAST(amount AS DECIMAL)");

        let diagnostics = ColumnLineageBuilder::default().build([&edge], &mut graph);
        assert!(diagnostics.is_empty());

        let facts: Vec<_> = graph.column_facts_for("orders").collect();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].downstream_column, "total_amount");
        assert_eq!(facts[0].upstream.table, "stg_orders");
        assert_eq!(facts[0].upstream.column, "amount");

        let provenance = &facts[0].upstream.provenance;
        assert_eq!(provenance.transformation_type, "CAST");
        assert_eq!(provenance.lines, LineRange::new(3, 4));
        assert_eq!(provenance.context.lines_before_start_line, 1);
        assert_eq!(provenance.code.as_deref(), Some("CAST(amount AS DECIMAL)"));
    }

    #[test]
    fn delimited_columns_expand_to_product() {
        let graph = graph();
        let edge = RawEdgeRecord::column_edge(
            "run-1",
            "f.sql",
            ("stg_orders", "id, amount"),
            ("orders", "id,total_amount"),
        );

        let facts = ColumnLineageBuilder::default().expand(&edge, &graph).unwrap();
        assert_eq!(facts.len(), 4);
        assert!(facts.iter().all(|f| f.upstream.provenance.transformation_type == "UNKNOWN"));
    }

    #[test]
    fn orphan_upstream_is_dropped() {
        let mut graph = graph();
        let edge =
            RawEdgeRecord::column_edge("run-1", "f.sql", ("raw_stub", "id"), ("orders", "id"));

        let diagnostics = ColumnLineageBuilder::default().build([&edge], &mut graph);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::OrphanEdge);
        assert_eq!(graph.column_fact_count(), 0);
        assert!(!graph.contains_table("raw_stub"));
    }

    #[test]
    fn empty_column_is_dropped() {
        let graph = graph();
        let builder = ColumnLineageBuilder::default();
        let mut edge =
            RawEdgeRecord::column_edge("run-1", "f.sql", ("stg_orders", " "), ("orders", "id"));
        assert_eq!(builder.expand(&edge, &graph), Err(EdgeRejection::EmptyColumns));

        edge.from_column = None;
        assert_eq!(builder.expand(&edge, &graph), Err(EdgeRejection::EmptyColumns));
    }

    #[test]
    fn repeated_fact_across_files_is_reported() {
        let mut graph = graph();
        let a =
            RawEdgeRecord::column_edge("run-1", "a.sql", ("stg_orders", "id"), ("orders", "id"));
        let b =
            RawEdgeRecord::column_edge("run-1", "b.sql", ("stg_orders", "id"), ("orders", "id"));

        let diagnostics = ColumnLineageBuilder::default().build([&a, &b], &mut graph);
        assert_eq!(graph.column_fact_count(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::DuplicateColumnFact);
        assert_eq!(graph.column_facts().next().unwrap().upstream.provenance.file_id, "a.sql");

        let mut reversed = self::graph();
        ColumnLineageBuilder::default().build([&b, &a], &mut reversed);
        assert_eq!(reversed.column_facts().next().unwrap().upstream.provenance.file_id, "a.sql");
        assert_eq!(reversed.fingerprint(), graph.fingerprint());
    }

    #[test]
    fn custom_delimiter() {
        let builder = ColumnLineageBuilder::new("|");
        assert_eq!(builder.parse_columns(Some("a|B | a")), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(builder.parse_columns(Some("a,b")), vec!["a,b".to_string()]);
    }
}
