//! Integration tests for lineage graph construction
//!
//! These tests run the three builders in sequence over a run's raw records,
//! the same order a full rebuild uses.

use pretty_assertions::assert_eq;
use sqlineage_core::{
    ColumnMergePolicy, DiagnosticCode, Direction, EdgeKind, LineRange, RawEdgeRecord,
    RawTableRecord, TableRole, TransformationProvenance, UNKNOWN_SCHEMA,
};
use sqlineage_graph::{
    canonicalize, ColumnLineageBuilder, LineageDag, LineageGraph, TableAggregator,
    TableRelationshipBuilder,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn build(
    tables: &[RawTableRecord],
    edges: &[RawEdgeRecord],
) -> (LineageGraph, Vec<DiagnosticCode>) {
    let mut graph = LineageGraph::new();
    let mut diagnostics = Vec::new();

    let aggregator = TableAggregator::new(ColumnMergePolicy::Union);
    diagnostics.extend(aggregator.aggregate(tables, &mut graph));
    diagnostics.extend(ColumnLineageBuilder::default().build(edges, &mut graph));
    diagnostics.extend(TableRelationshipBuilder::new().build(edges, &mut graph));

    let codes = diagnostics.into_iter().map(|d| d.code).collect();

    (graph, codes)
}

fn orders_scenario() -> (Vec<RawTableRecord>, Vec<RawEdgeRecord>) {
    let tables = vec![
        RawTableRecord::new("run-1", "f.sql", "stg_orders", TableRole::Source)
            .with_columns(["id", "amount"]),
        RawTableRecord::new("run-1", "f.sql", "orders", TableRole::Target)
            .with_columns(["id", "total_amount"]),
    ];
    let edges = vec![
        RawEdgeRecord::table_edge("run-1", "f.sql", "stg_orders", "orders")
            .with_transformation("INSERT")
            .with_lines(1, 9),
        RawEdgeRecord::column_edge(
            "run-1",
            "f.sql",
            ("stg_orders", "amount"),
            ("orders", "total_amount"),
        )
        .with_transformation("CAST"),
    ];
    (tables, edges)
}

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn end_to_end_orders_scenario() {
    let (tables, edges) = orders_scenario();
    let (graph, codes) = build(&tables, &edges);
    assert!(codes.is_empty());

    assert_eq!(graph.table_count(), 2);
    assert_eq!(graph.table("orders").unwrap().columns, vec!["id", "total_amount"]);

    let tuple = TransformationProvenance::new("f.sql", LineRange::new(1, 9), "INSERT");
    let up = graph
        .relationship("orders")
        .unwrap()
        .neighbor(Direction::Upstream, "stg_orders")
        .unwrap();
    let down = graph
        .relationship("stg_orders")
        .unwrap()
        .neighbor(Direction::Downstream, "orders")
        .unwrap();
    assert_eq!(up.transformations, vec![tuple.clone()]);
    assert_eq!(down.transformations, vec![tuple]);

    let facts: Vec<_> = graph.column_facts().collect();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].downstream_table, "orders");
    assert_eq!(facts[0].downstream_column, "total_amount");
    assert_eq!(facts[0].upstream.table, "stg_orders");
    assert_eq!(facts[0].upstream.column, "amount");
    assert_eq!(facts[0].upstream.provenance.transformation_type, "CAST");
}

#[test]
fn record_order_does_not_change_the_graph() {
    let (mut tables, mut edges) = orders_scenario();
    tables.push(
        RawTableRecord::new("run-1", "g.sql", "analytics.orders", TableRole::Source)
            .with_columns(["status"]),
    );
    edges.push(
        RawEdgeRecord::table_edge("run-1", "g.sql", "stg_orders", "orders")
            .with_transformation("MERGE"),
    );

    let (forward, _) = build(&tables, &edges);
    tables.reverse();
    edges.reverse();
    let (backward, _) = build(&tables, &edges);

    assert_eq!(forward.snapshot().normalized(), backward.snapshot().normalized());
    assert_eq!(
        forward.snapshot().normalized().fingerprint(),
        backward.snapshot().normalized().fingerprint()
    );
}

// =============================================================================
// Invariants
// =============================================================================

#[test]
fn templated_names_converge_on_one_node() {
    let tables = vec![
        RawTableRecord::new(
            "run-1",
            "a.sql",
            "analytics.{{ var('schema') }}.orders",
            TableRole::Target,
        )
        .with_columns(["id"]),
        RawTableRecord::new("run-1", "b.sql", "analytics.core.ORDERS", TableRole::Source)
            .with_columns(["Total"]),
    ];
    let (graph, _) = build(&tables, &[]);

    assert_eq!(graph.table_count(), 1);
    let orders = graph.table("orders").unwrap();
    assert_eq!(orders.columns, vec!["id", "total"]);
    assert_eq!(orders.source, "analytics.core");

    let name = canonicalize("analytics.{{ var('schema') }}.orders").unwrap();
    assert_eq!(name.source, UNKNOWN_SCHEMA);
}

#[test]
fn every_adjacency_entry_is_mirrored() {
    let tables: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|t| RawTableRecord::new("run-1", "f.sql", *t, TableRole::Source))
        .collect();
    let edges = vec![
        RawEdgeRecord::table_edge("run-1", "1.sql", "a", "b").with_lines(1, 2),
        RawEdgeRecord::table_edge("run-1", "2.sql", "a", "c").with_transformation("CTAS"),
        RawEdgeRecord::table_edge("run-1", "3.sql", "b", "d"),
        RawEdgeRecord::table_edge("run-1", "3.sql", "c", "d"),
        RawEdgeRecord::table_edge("run-1", "3.sql", "c", "d"),
    ];
    let (graph, codes) = build(&tables, &edges);
    assert_eq!(codes, vec![DiagnosticCode::DuplicateProvenance]);

    for relationship in graph.relationships() {
        for direction in [Direction::Upstream, Direction::Downstream] {
            for entry in relationship.neighbors(direction) {
                let mirror = graph
                    .relationship(&entry.table)
                    .and_then(|r| r.neighbor(direction.opposite(), &relationship.table))
                    .expect("mirrored entry");
                assert_eq!(mirror.transformations, entry.transformations);
            }
        }
    }
}

#[test]
fn orphans_leave_no_trace() {
    let tables = vec![
        RawTableRecord::new("run-1", "f.sql", "orders", TableRole::Target).with_columns(["id"]),
    ];
    let edges = vec![
        RawEdgeRecord::column_edge("run-1", "f.sql", ("raw_stub", "id"), ("orders", "id")),
        RawEdgeRecord::table_edge("run-1", "f.sql", "raw_stub", "orders"),
    ];
    let (graph, codes) = build(&tables, &edges);

    assert_eq!(codes, vec![DiagnosticCode::OrphanEdge, DiagnosticCode::OrphanEdge]);
    assert_eq!(graph.column_fact_count(), 0);
    assert_eq!(graph.relationship_count(), 0);
    assert!(!graph.contains_table("raw_stub"));
}

#[test]
fn builders_ignore_the_other_edge_kind() {
    let (tables, edges) = orders_scenario();
    let column_edges: Vec<_> = edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Column)
        .cloned()
        .collect();
    let (graph, _) = build(&tables, &column_edges);

    assert_eq!(graph.column_fact_count(), 1);
    assert_eq!(graph.relationship_count(), 0);
}

// =============================================================================
// Traversal
// =============================================================================

#[test]
fn impact_follows_table_edges() {
    let tables: Vec<_> = ["raw_orders", "stg_orders", "orders", "revenue"]
        .iter()
        .map(|t| RawTableRecord::new("run-1", "f.sql", *t, TableRole::Source))
        .collect();
    let edges = vec![
        RawEdgeRecord::table_edge("run-1", "a.sql", "raw_orders", "stg_orders"),
        RawEdgeRecord::table_edge("run-1", "b.sql", "stg_orders", "orders"),
        RawEdgeRecord::table_edge("run-1", "c.sql", "orders", "revenue"),
    ];
    let (graph, _) = build(&tables, &edges);
    let dag = LineageDag::from_graph(&graph);

    assert_eq!(dag.downstream("stg_orders"), vec!["orders", "revenue"]);
    assert_eq!(
        dag.topological_sort().unwrap(),
        vec!["raw_orders", "stg_orders", "orders", "revenue"]
    );
}
