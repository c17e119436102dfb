//! Field-level provenance: every chain of column edges into and out of a column.

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

use crate::config::{AnalyzerConfig, HARD_MAX_DEPTH};
use crate::lineage::{LineageGraph, NodeIdx};
use crate::types::{ColumnHop, ColumnLineagePath, ColumnLineageResult, NodeKey};

/// Upstream and downstream column paths of `table.column`.
///
/// A missing table or column is not an error: the result carries a warning
/// and no paths.
pub fn get_full_column_lineage(
    graph: &LineageGraph,
    table: &str,
    column: &str,
) -> ColumnLineageResult {
    get_full_column_lineage_with_config(graph, table, column, &AnalyzerConfig::default())
}

/// [`get_full_column_lineage`] with an explicit cap on paths per direction.
pub fn get_full_column_lineage_with_config(
    graph: &LineageGraph,
    table: &str,
    column: &str,
    config: &AnalyzerConfig,
) -> ColumnLineageResult {
    let mut result = ColumnLineageResult {
        table: table.to_string(),
        column: column.to_string(),
        ..Default::default()
    };

    let Some(parent) = graph.resolve(table).filter(|node| node.kind().is_relation()) else {
        #[cfg(feature = "tracing")]
        warn!(table, "column lineage requested for unknown table");
        result.warning = Some(format!("table '{table}' not found"));
        return result;
    };
    let key = NodeKey::column(&parent.key, column);
    let Some(start) = graph.index_of(&key) else {
        #[cfg(feature = "tracing")]
        warn!(table = %parent.key, column, "column lineage requested for unknown column");
        result.warning = Some(format!("column '{column}' not found in {}", parent.key));
        return result;
    };

    result.id = Some(key.id());
    result.upstream = column_paths(graph, start, true, config.max_column_paths);
    result.downstream = column_paths(graph, start, false, config.max_column_paths);
    #[cfg(feature = "tracing")]
    debug!(
        column = %key,
        upstream = result.upstream.len(),
        downstream = result.downstream.len(),
        "column lineage"
    );
    result
}

/// Maximal simple paths from `start`, found depth-first with an explicit stack.
///
/// A column is never repeated within one path, which is what stops cycles; a
/// column may still appear on several different paths.
fn column_paths(
    graph: &LineageGraph,
    start: NodeIdx,
    upstream: bool,
    max_paths: usize,
) -> Vec<ColumnLineagePath> {
    let mut paths = Vec::new();
    let mut stack: Vec<(Vec<NodeIdx>, Vec<usize>)> = vec![(vec![start], Vec::new())];

    while let Some((nodes, hops)) = stack.pop() {
        if paths.len() >= max_paths {
            break;
        }
        let Some(&last) = nodes.last() else {
            continue;
        };
        let next: Vec<(usize, NodeIdx)> = if hops.len() >= HARD_MAX_DEPTH {
            Vec::new()
        } else if upstream {
            graph.column_incoming(last).collect()
        } else {
            graph.column_outgoing(last).collect()
        };
        let next: Vec<(usize, NodeIdx)> = next
            .into_iter()
            .filter(|(_, idx)| !nodes.contains(idx))
            .collect();

        if next.is_empty() {
            if !hops.is_empty() {
                paths.push(to_path(graph, &nodes, &hops));
            }
            continue;
        }
        // Reversed so the first neighbor is explored first.
        for (edge, idx) in next.into_iter().rev() {
            let mut nodes = nodes.clone();
            let mut hops = hops.clone();
            nodes.push(idx);
            hops.push(edge);
            stack.push((nodes, hops));
        }
    }
    paths
}

fn to_path(graph: &LineageGraph, nodes: &[NodeIdx], hops: &[usize]) -> ColumnLineagePath {
    ColumnLineagePath {
        depth: hops.len(),
        nodes: nodes.iter().map(|&idx| graph.node_at(idx).key.id()).collect(),
        hops: hops
            .iter()
            .map(|&edge| {
                let edge = graph.column_edge_at(edge);
                ColumnHop {
                    from: edge.source.id(),
                    to: edge.target.id(),
                    transform: edge.transform,
                    expression: edge.expression.clone(),
                    file: edge.file.clone(),
                    line: edge.line,
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineageConfig;
    use crate::lineage::{build_lineage_graph_from_sources, SourceFile};
    use crate::types::{Dialect, TransformKind};

    fn graph(sql: &str) -> LineageGraph {
        build_lineage_graph_from_sources(
            &[SourceFile::new("model.sql", sql)],
            Dialect::Generic,
            &LineageConfig::default(),
        )
    }

    const MODEL: &str = "
        CREATE TABLE orders (id INT, amount INT, customer_id INT);
        CREATE VIEW order_totals AS
          SELECT customer_id, SUM(amount) AS total FROM orders GROUP BY customer_id;
        CREATE VIEW vip AS SELECT customer_id AS vip_id, total FROM order_totals WHERE total > 100;
    ";

    #[test]
    fn test_paths_in_both_directions() {
        let graph = graph(MODEL);
        let result = get_full_column_lineage(&graph, "order_totals", "total");
        assert_eq!(result.id.as_deref(), Some("column:order_totals.total"));
        assert!(result.warning.is_none());

        assert_eq!(result.upstream.len(), 1);
        let up = &result.upstream[0];
        assert_eq!(up.nodes, vec!["column:order_totals.total", "column:orders.amount"]);
        assert_eq!(up.hops[0].transform, TransformKind::Aggregated);
        assert_eq!(up.hops[0].expression.as_deref(), Some("SUM(amount)"));
        assert_eq!(up.hops[0].from, "column:orders.amount");

        assert_eq!(result.downstream.len(), 1);
        assert_eq!(result.downstream[0].nodes.last().unwrap(), "column:vip.total");
    }

    #[test]
    fn test_multi_hop_rename() {
        let graph = graph(MODEL);
        let result = get_full_column_lineage(&graph, "vip", "vip_id");
        let path = &result.upstream[0];
        assert_eq!(path.depth, 2);
        assert_eq!(path.hops[0].transform, TransformKind::Renamed);
        assert_eq!(path.hops[1].transform, TransformKind::Passthrough);
        assert_eq!(path.nodes.last().unwrap(), "column:orders.customer_id");
    }

    #[test]
    fn test_missing_names_warn() {
        let graph = graph(MODEL);
        let table = get_full_column_lineage(&graph, "nope", "id");
        assert!(table.warning.unwrap().contains("nope"));
        assert!(table.upstream.is_empty() && table.downstream.is_empty());

        let column = get_full_column_lineage(&graph, "orders", "nope");
        assert!(column.warning.unwrap().contains("table:orders"));
        assert!(column.id.is_none());
    }

    #[test]
    fn test_path_cap() {
        let graph = graph(
            "CREATE TABLE a (x INT);
             CREATE VIEW b1 AS SELECT x FROM a;
             CREATE VIEW b2 AS SELECT x FROM a;
             CREATE VIEW b3 AS SELECT x FROM a;",
        );
        let config = AnalyzerConfig {
            max_column_paths: 2,
            ..Default::default()
        };
        let result = get_full_column_lineage_with_config(&graph, "a", "x", &config);
        assert_eq!(result.downstream.len(), 2);
        assert!(result.upstream.is_empty());
    }
}
