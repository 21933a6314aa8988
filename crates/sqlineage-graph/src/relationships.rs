//! Table relationship building
//!
//! Every table edge becomes a provenance tuple attached to both adjacency
//! lists: the downstream table's upstream entry and the upstream table's
//! downstream entry. Tables without neighbors get no relationship row.

use crate::edge::{EdgeRejection, ResolvedEdge};
use crate::graph::LineageGraph;
use sqlineage_core::{
    Diagnostic, DiagnosticCode, EdgeKind, Location, RawEdgeRecord, TransformationProvenance,
};

/// Builds symmetric table adjacency from table edges
#[derive(Debug, Clone, Copy, Default)]
pub struct TableRelationshipBuilder;

impl TableRelationshipBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Provenance tuple of a table edge
    pub fn provenance(edge: &RawEdgeRecord) -> TransformationProvenance {
        TransformationProvenance::new(
            edge.file_id.clone(),
            edge.line_range(),
            edge.transformation_kind(),
        )
    }

    /// Apply one edge. Returns `Ok(false)` when the tuple was already attached.
    pub fn apply(
        &self,
        edge: &RawEdgeRecord,
        graph: &mut LineageGraph,
    ) -> Result<bool, EdgeRejection> {
        let resolved = ResolvedEdge::resolve(edge, graph)?;
        Ok(graph.link(&resolved.upstream, &resolved.downstream, Self::provenance(edge)))
    }

    /// Apply every table edge. Column edges are ignored.
    pub fn build<'a, I>(&self, edges: I, graph: &mut LineageGraph) -> Vec<Diagnostic>
    where
        I: IntoIterator<Item = &'a RawEdgeRecord>,
    {
        let mut diagnostics = Vec::new();

        for edge in edges.into_iter().filter(|e| e.kind == EdgeKind::Table) {
            match self.apply(edge, graph) {
                Ok(true) => {}
                Ok(false) => {
                    let range = edge.line_range();
                    let message = format!(
                        "Edge {} -> {} at {} already attached",
                        edge.from_table, edge.to_table, range
                    );
                    let location = Location::with_lines(
                        edge.file_id.clone(),
                        range.start_line,
                        range.end_line,
                    );
                    diagnostics.push(
                        Diagnostic::info(DiagnosticCode::DuplicateProvenance, message)
                            .with_location(location),
                    );
                }
                Err(rejection) => {
                    tracing::debug!(
                        file_id = %edge.file_id,
                        code = %rejection.code(),
                        "dropping table edge"
                    );
                    diagnostics.push(rejection.to_diagnostic(edge));
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
    use pretty_assertions::assert_eq;
    use sqlineage_core::{Direction, LineRange, NeighborEntry, RawTableRecord, TableRole};

    fn graph(tables: &[&str]) -> LineageGraph {
        let mut graph = LineageGraph::new();
        let records: Vec<_> = tables
            .iter()
            .map(|t| RawTableRecord::new("run-1", "f.sql", *t, TableRole::Source))
            .collect();
        TableAggregator::default().aggregate(&records, &mut graph);
        graph
    }

    fn insert_edge(file: &str) -> RawEdgeRecord {
        RawEdgeRecord::table_edge("run-1", file, "stg_orders", "orders")
            .with_transformation("INSERT")
            .with_lines(5, 40)
    }

    #[test]
    fn adjacency_is_symmetric() {
        let mut graph = graph(&["stg_orders", "orders"]);
        let edge = insert_edge("models/orders.sql");
        let diagnostics = TableRelationshipBuilder::new().build([&edge], &mut graph);
        assert!(diagnostics.is_empty());

        let expected = NeighborEntry {
            table: "stg_orders".to_string(),
            transformations: vec![TransformationProvenance::new(
                "models/orders.sql",
                LineRange::new(5, 40),
                "INSERT",
            )],
        };
        let orders = graph.relationship("orders").unwrap();
        assert_eq!(orders.upstream, vec![expected.clone()]);
        assert!(orders.downstream.is_empty());

        let stg = graph.relationship("stg_orders").unwrap();
        assert_eq!(stg.downstream.len(), 1);
        assert_eq!(stg.downstream[0].table, "orders");
        assert_eq!(stg.downstream[0].transformations, expected.transformations);
    }

    #[test]
    fn duplicate_delivery_keeps_one_tuple() {
        let mut graph = graph(&["stg_orders", "orders"]);
        let edge = insert_edge("models/orders.sql");

        let diagnostics = TableRelationshipBuilder::new().build([&edge, &edge], &mut graph);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::DuplicateProvenance);

        let up = graph
            .relationship("orders")
            .unwrap()
            .neighbor(Direction::Upstream, "stg_orders")
            .unwrap();
        assert_eq!(up.transformations.len(), 1);
    }

    #[test]
    fn distinct_files_accumulate_provenance() {
        let mut graph = graph(&["stg_orders", "orders"]);
        let (a, b) = (insert_edge("a.sql"), insert_edge("b.sql"));
        TableRelationshipBuilder::new().build([&a, &b], &mut graph);

        let down = graph
            .relationship("stg_orders")
            .unwrap()
            .neighbor(Direction::Downstream, "orders")
            .unwrap();
        assert_eq!(down.transformations.len(), 2);
        assert_eq!(graph.table_edge_count(), 1);
    }

    #[test]
    fn isolated_tables_have_no_row() {
        let mut graph = graph(&["stg_orders", "orders", "lonely"]);
        TableRelationshipBuilder::new().build([&insert_edge("f.sql")], &mut graph);

        assert_eq!(graph.relationship_count(), 2);
        assert!(graph.relationship("lonely").is_none());
        assert!(graph.contains_table("lonely"));
    }

    #[test]
    fn orphan_edge_creates_nothing() {
        let mut graph = graph(&["orders"]);
        let edge = insert_edge("f.sql");
        let diagnostics = TableRelationshipBuilder::new().build([&edge], &mut graph);

        assert_eq!(diagnostics[0].code, DiagnosticCode::OrphanEdge);
        assert_eq!(graph.relationship_count(), 0);
        assert!(!graph.contains_table("stg_orders"));
    }
}
