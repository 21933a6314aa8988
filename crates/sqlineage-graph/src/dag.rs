//! Table-level lineage DAG and traversal
//!
//! Builds forward and reverse table edges from a run's relationships for
//! impact analysis.

use crate::graph::LineageGraph;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Table-level dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default)]
pub struct LineageDag {
    /// table -> tables it reads from
    parents: BTreeMap<String, Vec<String>>,

    /// table -> tables that read from it
    children: BTreeMap<String, Vec<String>>,

    /// All canonical tables
    nodes: BTreeSet<String>,
}

impl LineageDag {
    /// Build the DAG of a lineage graph
    pub fn from_graph(graph: &LineageGraph) -> Self {
        let mut parents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut nodes: BTreeSet<String> = graph.tables().map(|t| t.short_id.clone()).collect();

        for relationship in graph.relationships() {
            nodes.insert(relationship.table.clone());

            for upstream in &relationship.upstream {
                nodes.insert(upstream.table.clone());
                parents
                    .entry(relationship.table.clone())
                    .or_default()
                    .push(upstream.table.clone());
                children
                    .entry(upstream.table.clone())
                    .or_default()
                    .push(relationship.table.clone());
            }
        }

        for list in parents.values_mut().chain(children.values_mut()) {
            list.sort();
            list.dedup();
        }

        Self {
            parents,
            children,
            nodes,
        }
    }

    /// All tables, ordered
    pub fn all_nodes(&self) -> Vec<&String> {
        self.nodes.iter().collect()
    }

    /// Immediate upstream tables
    pub fn parents(&self, table: &str) -> Vec<&String> {
        self.parents
            .get(table)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Immediate downstream tables
    pub fn children(&self, table: &str) -> Vec<&String> {
        self.children
            .get(table)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// All downstream tables (transitive closure of children), nearest first
    ///
    /// This is the blast radius: every table affected if `table` changes.
    pub fn downstream(&self, table: &str) -> Vec<String> {
        Self::closure(&self.children, table)
    }

    /// All upstream tables (transitive closure of parents), nearest first
    pub fn upstream(&self, table: &str) -> Vec<String> {
        Self::closure(&self.parents, table)
    }

    fn closure(edges: &BTreeMap<String, Vec<String>>, start: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<&String> = VecDeque::new();
        let mut result = Vec::new();

        if let Some(next) = edges.get(start) {
            queue.extend(next);
        }

        // BFS
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current.clone());

            if let Some(next) = edges.get(current) {
                queue.extend(next.iter().filter(|n| !visited.contains(n)));
            }
        }

        result
    }

    /// Check if `target` is reachable downstream of `source`
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        self.downstream(source).iter().any(|t| t == target)
    }

    /// Tables ordered so every table comes after its upstream tables.
    ///
    /// Returns `None` if the lineage contains a cycle.
    pub fn topological_sort(&self) -> Option<Vec<String>> {
        let mut in_degree: BTreeMap<&String, usize> = self.nodes.iter().map(|n| (n, 0)).collect();
        for (node, parents) in &self.parents {
            if let Some(degree) = in_degree.get_mut(node) {
                *degree = parents.len();
            }
        }

        // Kahn's algorithm
        let mut queue: VecDeque<&String> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            result.push(node.clone());

            if let Some(children) = self.children.get(node) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child);
                        }
                    }
                }
            }
        }

        // Any node left with a positive in-degree sits on a cycle
        if result.len() == self.nodes.len() {
            Some(result)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::TableSighting;
    use sqlineage_core::{ColumnMergePolicy, LineRange, TransformationProvenance};

    fn graph(edges: &[(&str, &str)]) -> LineageGraph {
        let mut graph = LineageGraph::new();
        for (up, down) in edges {
            for table in [up, down] {
                graph.merge_table(
                    TableSighting {
                        short_id: table.to_string(),
                        source: "analytics".to_string(),
                        columns: Vec::new(),
                        partition_keys: Vec::new(),
                    },
                    ColumnMergePolicy::Union,
                );
            }
            let provenance = TransformationProvenance::new("f.sql", LineRange::default(), "INSERT");
            graph.link(up, down, provenance);
        }
        graph
    }

    #[test]
    fn downstream_impact() {
        let dag = LineageDag::from_graph(&graph(&[
            ("raw_orders", "stg_orders"),
            ("stg_orders", "orders"),
            ("orders", "revenue"),
            ("raw_customers", "customers"),
        ]));

        assert_eq!(dag.downstream("raw_orders"), vec!["stg_orders", "orders", "revenue"]);
        assert_eq!(dag.upstream("revenue"), vec!["orders", "stg_orders", "raw_orders"]);
        assert!(dag.has_path("raw_orders", "revenue"));
        assert!(!dag.has_path("raw_customers", "revenue"));
        assert_eq!(dag.parents("orders"), vec!["stg_orders"]);
        assert_eq!(dag.children("raw_customers"), vec!["customers"]);
    }

    #[test]
    fn diamond_visits_each_table_once() {
        let dag = LineageDag::from_graph(&graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]));
        assert_eq!(dag.downstream("a"), vec!["b", "c", "d"]);
    }

    #[test]
    fn topological_order() {
        let dag = LineageDag::from_graph(&graph(&[("stg", "orders"), ("raw", "stg")]));
        assert_eq!(dag.topological_sort().unwrap(), vec!["raw", "stg", "orders"]);
    }

    #[test]
    fn cycle_has_no_topological_order() {
        let dag = LineageDag::from_graph(&graph(&[("a", "b"), ("b", "a")]));
        assert!(dag.topological_sort().is_none());
        // Traversal still terminates
        assert_eq!(dag.downstream("a"), vec!["b", "a"]);
    }
}
