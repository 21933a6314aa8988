//! Benchmarks for lineage graph derivation
//!
//! These benchmarks measure full rebuilds and realtime upserts over
//! generated runs with chained models and wide column lineage.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sqlineage_core::{
    AggregationConfig, Config, RawEdgeRecord, RawTableRecord, RunId, RunInfo, TableRole,
};
use sqlineage_engine::{build_graph, RealtimeCoordinator, RunLocks};
use sqlineage_graph::LineageDag;
use sqlineage_store::InMemoryStoreBuilder;
use std::sync::Arc;

const RUN: &str = "bench-run";

/// Generate a run with N models, each reading the previous two
fn generate_run(
    num_models: usize,
    num_columns: usize,
) -> (Vec<RawTableRecord>, Vec<RawEdgeRecord>) {
    let mut tables = Vec::new();
    let mut edges = Vec::new();
    let columns: Vec<String> = (0..num_columns).map(|c| format!("col_{}", c)).collect();

    for i in 0..num_models {
        let file = format!("models/model_{}.sql", i);
        let target = format!("analytics.model_{}", i);
        tables.push(
            RawTableRecord::new(RUN, file.as_str(), target.as_str(), TableRole::Target)
                .with_columns(columns.iter().cloned()),
        );

        for j in i.saturating_sub(2)..i {
            let source = format!("model_{}", j);
            let templated = format!("{{{{ target.schema }}}}.{}", source);
            tables.push(
                RawTableRecord::new(RUN, file.as_str(), templated, TableRole::Source)
                    .with_columns(columns.iter().take(num_columns / 2).cloned()),
            );
            edges.push(
                RawEdgeRecord::table_edge(RUN, file.as_str(), source.as_str(), target.as_str())
                    .with_transformation("CREATE_TABLE_AS")
                    .with_lines(1, 40),
            );
            for column in &columns {
                edges.push(RawEdgeRecord::column_edge(
                    RUN,
                    file.as_str(),
                    (source.as_str(), column.as_str()),
                    (target.as_str(), column.as_str()),
                ));
            }
        }
    }

    (tables, edges)
}

/// Benchmark a full rebuild of runs of increasing size
fn bench_full_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_rebuild");
    let config = AggregationConfig::default();
    let run_id = RunId::new(RUN);

    for num_models in [100, 500, 1000].iter() {
        let (tables, edges) = generate_run(*num_models, 10);

        group.bench_with_input(BenchmarkId::from_parameter(num_models), num_models, |b, _| {
            b.iter(|| black_box(build_graph(&run_id, &tables, &edges, &config)));
        });
    }

    group.finish();
}

/// Benchmark the realtime path applying a whole run record by record
fn bench_realtime_upserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("realtime_upserts");
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");

    for num_models in [50, 200].iter() {
        let (tables, edges) = generate_run(*num_models, 10);

        group.bench_with_input(BenchmarkId::from_parameter(num_models), num_models, |b, _| {
            b.iter(|| {
                runtime.block_on(async {
                    let store = InMemoryStoreBuilder::new()
                        .with_run(RunInfo::new(RUN, "repo", "main"))
                        .build();
                    let config = Config::default();
                    let coordinator =
                        RealtimeCoordinator::new(Arc::new(store), RunLocks::new(), &config);

                    // Edges first so every one of them is parked and replayed
                    for edge in &edges {
                        black_box(coordinator.on_raw_edge_written(edge).await.ok());
                    }
                    for table in &tables {
                        black_box(coordinator.on_raw_table_written(table).await.ok());
                    }
                })
            });
        });
    }

    group.finish();
}

/// Benchmark impact analysis over the derived graph
fn bench_impact_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("impact_analysis");
    let config = AggregationConfig::default();
    let run_id = RunId::new(RUN);

    for num_models in [100, 500, 1000].iter() {
        let (tables, edges) = generate_run(*num_models, 4);
        let (graph, _) = build_graph(&run_id, &tables, &edges, &config);
        let dag = LineageDag::from_graph(&graph);

        group.bench_with_input(BenchmarkId::from_parameter(num_models), num_models, |b, _| {
            b.iter(|| black_box(dag.downstream("model_0")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_full_rebuild, bench_realtime_upserts, bench_impact_analysis);
criterion_main!(benches);
