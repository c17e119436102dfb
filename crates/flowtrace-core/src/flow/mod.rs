//! Per-statement execution flow graphs.
//!
//! A flow graph shows how rows move through one statement: relations feed joins,
//! joins feed filters and aggregates, and everything ends in a projection and a
//! `result` node. CTE and subquery bodies are nested graphs hanging off their
//! `cte` / `subquery` node.

mod builder;

#[cfg(feature = "tracing")]
use tracing::info_span;

use self::builder::FlowBuilder;
use crate::adapter::{adapt_sql, StatementIr};
use crate::error::FlowError;
use crate::types::{Dialect, FlowBatch, FlowGraph, StatementError, StatementFlow};

/// Builds the flow graph of one adapted statement.
///
/// Statements without a data-flow shape (DROP, SET, GRANT, ...) return
/// [`FlowError::UnsupportedStatement`].
pub fn build_flow_graph(statement: &StatementIr) -> Result<FlowGraph, FlowError> {
    #[cfg(feature = "tracing")]
    let _span = info_span!("build_flow_graph", index = statement.index).entered();
    FlowBuilder::new().statement(statement)
}

/// Parses `sql` and builds one flow graph per statement.
///
/// Parse failures and unsupported statements are recorded per statement; the
/// rest of the batch still gets built.
pub fn build_flow_batch(sql: &str, dialect: Dialect) -> FlowBatch {
    #[cfg(feature = "tracing")]
    let _span = info_span!("build_flow_batch", ?dialect).entered();

    let adapted = adapt_sql(sql, dialect);
    let mut batch = FlowBatch::default();

    for failure in adapted.failures {
        batch.errors.push(StatementError {
            index: failure.index,
            line: Some(failure.line),
            message: failure.error.to_string(),
        });
    }

    for statement in &adapted.statements {
        match build_flow_graph(statement) {
            Ok(graph) => batch.statements.push(StatementFlow {
                index: statement.index,
                statement: statement.kind(),
                lines: statement.lines,
                graph,
            }),
            Err(error) => batch.errors.push(StatementError {
                index: statement.index,
                line: Some(statement.lines.start),
                message: error.to_string(),
            }),
        }
    }

    batch.errors.sort_by_key(|error| error.index);
    batch.success_count = batch.statements.len();
    batch.error_count = batch.errors.len();
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClauseType, FlowNode, FlowNodeDetail, FlowNodeKind, JoinKind};
    use std::collections::HashSet;

    fn graph(sql: &str) -> FlowGraph {
        let batch = build_flow_batch(sql, Dialect::Generic);
        assert!(batch.errors.is_empty(), "unexpected errors: {:?}", batch.errors);
        batch.statements.into_iter().next().unwrap().graph
    }

    /// Walks from the output back through first inputs, collecting kinds.
    fn spine(graph: &FlowGraph) -> Vec<FlowNodeKind> {
        let mut kinds = Vec::new();
        let mut current = graph.output.clone();
        while let Some(id) = current {
            let node = graph.node(&id).unwrap();
            kinds.push(node.kind);
            current = graph.inputs_of(&id).first().map(|s| s.to_string());
        }
        kinds.reverse();
        kinds
    }

    fn collect_ids(graph: &FlowGraph, ids: &mut Vec<String>) {
        for node in &graph.nodes {
            ids.push(node.id.clone());
            ids.extend(node.annotations.iter().map(|a| a.id.clone()));
            if let Some(children) = &node.children {
                collect_ids(children, ids);
            }
        }
    }

    fn table_names(graph: &FlowGraph) -> Vec<String> {
        graph
            .nodes_of_kind(FlowNodeKind::Table)
            .filter_map(|node| match &node.detail {
                FlowNodeDetail::Table { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_select_pipeline_order() {
        let g = graph(
            "SELECT c.name, COUNT(o.id) AS n
             FROM customers c JOIN orders o ON o.customer_id = c.id
             WHERE o.status = 'paid'
             GROUP BY c.name
             HAVING COUNT(o.id) > 1
             ORDER BY n DESC
             LIMIT 10",
        );
        assert_eq!(
            spine(&g),
            vec![
                FlowNodeKind::Table,
                FlowNodeKind::Join,
                FlowNodeKind::Filter,
                FlowNodeKind::Aggregate,
                FlowNodeKind::Filter,
                FlowNodeKind::Sort,
                FlowNodeKind::Limit,
                FlowNodeKind::Projection,
                FlowNodeKind::Result,
            ]
        );

        let join = g.nodes_of_kind(FlowNodeKind::Join).next().unwrap();
        assert_eq!(
            join.detail,
            FlowNodeDetail::Join {
                join_type: JoinKind::Inner,
                condition: Some("o.customer_id = c.id".to_string()),
            }
        );
        let on_edge = g
            .edges
            .iter()
            .find(|e| e.target == join.id && e.clause_type == Some(ClauseType::On))
            .unwrap();
        assert_eq!(on_edge.clause.as_deref(), Some("o.customer_id = c.id"));

        let aggregate = g.nodes_of_kind(FlowNodeKind::Aggregate).next().unwrap();
        assert_eq!(aggregate.label, "GROUP BY c.name");
    }

    #[test]
    fn test_view_ends_in_result_with_target() {
        let g = graph(
            "CREATE VIEW customer_orders AS
             SELECT c.name, COUNT(o.id) FROM customers c JOIN orders o ON o.customer_id = c.id
             GROUP BY c.name",
        );
        let result = g.node(g.output.as_deref().unwrap()).unwrap();
        assert_eq!(result.label, "CREATE VIEW customer_orders");
        assert_eq!(table_names(&g), vec!["customers", "orders"]);
    }

    #[test]
    fn test_comma_from_items_become_cross_join() {
        let g = graph("SELECT * FROM a, b");
        let join = g.nodes_of_kind(FlowNodeKind::Join).next().unwrap();
        assert!(matches!(
            join.detail,
            FlowNodeDetail::Join {
                join_type: JoinKind::Cross,
                condition: None
            }
        ));
        assert_eq!(g.inputs_of(&join.id).len(), 2);
    }

    #[test]
    fn test_cte_node_feeds_every_reference() {
        let g = graph(
            "WITH recent AS (SELECT id FROM orders WHERE created_at > '2024-01-01')
             SELECT a.id FROM recent a JOIN recent b ON a.id = b.id",
        );
        let ctes: Vec<&FlowNode> = g.nodes_of_kind(FlowNodeKind::Cte).collect();
        assert_eq!(ctes.len(), 1);
        let cte = ctes[0];
        assert_eq!(g.edges.iter().filter(|e| e.source == cte.id).count(), 2);
        assert!(table_names(&g).is_empty());

        let body = cte.children.as_ref().unwrap();
        assert_eq!(table_names(body), vec!["orders"]);
        assert_eq!(
            spine(body),
            vec![
                FlowNodeKind::Table,
                FlowNodeKind::Filter,
                FlowNodeKind::Projection
            ]
        );
    }

    #[test]
    fn test_recursive_cte_self_reference_is_marked() {
        let g = graph(
            "WITH RECURSIVE tree AS (
                SELECT id, parent_id FROM nodes WHERE parent_id IS NULL
                UNION ALL
                SELECT n.id, n.parent_id FROM nodes n JOIN tree t ON n.parent_id = t.id
             )
             SELECT * FROM tree",
        );
        let cte = g.nodes_of_kind(FlowNodeKind::Cte).next().unwrap();
        assert!(matches!(
            cte.detail,
            FlowNodeDetail::Cte {
                recursive: true,
                ..
            }
        ));
        let body = cte.children.as_ref().unwrap();
        let set_op = body.nodes_of_kind(FlowNodeKind::SetOperation).next().unwrap();
        assert_eq!(set_op.label, "UNION ALL");
        assert!(body.nodes.iter().any(|node| matches!(
            &node.detail,
            FlowNodeDetail::Table { name, recursive: true, .. } if name == "tree"
        )));
    }

    #[test]
    fn test_sibling_cte_reference_links_cte_nodes() {
        let g = graph(
            "WITH a AS (SELECT id FROM t), b AS (SELECT id FROM a)
             SELECT * FROM b",
        );
        let ctes: Vec<&FlowNode> = g.nodes_of_kind(FlowNodeKind::Cte).collect();
        assert_eq!(ctes.len(), 2);
        assert!(g
            .edges
            .iter()
            .any(|e| e.source == ctes[0].id && e.target == ctes[1].id));
    }

    #[test]
    fn test_where_subquery_feeds_filter() {
        let g = graph("SELECT * FROM customers WHERE id IN (SELECT customer_id FROM orders)");
        let filter = g.nodes_of_kind(FlowNodeKind::Filter).next().unwrap();
        let subquery = g.nodes_of_kind(FlowNodeKind::Subquery).next().unwrap();
        let edge = g
            .edges
            .iter()
            .find(|e| e.source == subquery.id && e.target == filter.id)
            .unwrap();
        assert_eq!(edge.clause_type, Some(ClauseType::Filter));
        assert_eq!(
            table_names(subquery.children.as_ref().unwrap()),
            vec!["orders"]
        );
    }

    #[test]
    fn test_derived_table_is_nested() {
        let g = graph("SELECT t.total FROM (SELECT SUM(amount) AS total FROM orders) AS t");
        let subquery = g.nodes_of_kind(FlowNodeKind::Subquery).next().unwrap();
        assert_eq!(subquery.label, "t");
        let body = subquery.children.as_ref().unwrap();
        assert!(body.nodes_of_kind(FlowNodeKind::Aggregate).next().is_some());
    }

    #[test]
    fn test_window_and_case_are_annotations() {
        let g = graph(
            "SELECT id,
                    ROW_NUMBER() OVER (PARTITION BY region ORDER BY amount) AS rn,
                    CASE WHEN amount > 100 THEN 'big' ELSE 'small' END AS size
             FROM orders",
        );
        assert!(g.nodes_of_kind(FlowNodeKind::Window).next().is_none());
        let projection = g.nodes_of_kind(FlowNodeKind::Projection).next().unwrap();
        let kinds: Vec<FlowNodeKind> = projection.annotations.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![FlowNodeKind::Window, FlowNodeKind::Case]);
    }

    #[test]
    fn test_set_operation_then_query_level_sort() {
        let g = graph("SELECT id FROM a UNION SELECT id FROM b ORDER BY id");
        let set_op = g.nodes_of_kind(FlowNodeKind::SetOperation).next().unwrap();
        assert_eq!(set_op.label, "UNION");
        assert_eq!(g.inputs_of(&set_op.id).len(), 2);
        assert_eq!(
            spine(&g)[spine(&g).len() - 3..],
            [
                FlowNodeKind::SetOperation,
                FlowNodeKind::Sort,
                FlowNodeKind::Result
            ]
        );
    }

    #[test]
    fn test_reserved_word_alias_is_not_a_table() {
        let g = graph("SELECT \"select\".id FROM orders AS \"select\"");
        assert_eq!(table_names(&g), vec!["orders"]);
        let table = g.nodes_of_kind(FlowNodeKind::Table).next().unwrap();
        assert_eq!(table.label, "orders AS select");
    }

    #[test]
    fn test_dml_result_labels() {
        let batch = build_flow_batch(
            "INSERT INTO archive SELECT * FROM orders;
             UPDATE orders SET total = price * qty WHERE id = 1;
             DELETE FROM orders WHERE status = 'void';
             CREATE TABLE summary AS SELECT COUNT(*) AS n FROM orders",
            Dialect::Generic,
        );
        assert_eq!(batch.success_count, 4);
        let labels: Vec<String> = batch
            .statements
            .iter()
            .map(|s| {
                let g = &s.graph;
                g.node(g.output.as_deref().unwrap()).unwrap().label.clone()
            })
            .collect();
        assert_eq!(
            labels,
            vec![
                "INSERT INTO archive",
                "UPDATE orders",
                "DELETE FROM orders",
                "CREATE TABLE summary"
            ]
        );
    }

    #[test]
    fn test_node_ids_unique_across_nested_graphs() {
        let g = graph(
            "WITH x AS (SELECT id FROM (SELECT id FROM t) s)
             SELECT * FROM x WHERE id IN (SELECT id FROM u)",
        );
        let mut ids = Vec::new();
        collect_ids(&g, &mut ids);
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_batch_records_failures_and_continues() {
        let batch = build_flow_batch(
            "SELECT 1;\nSELEC broken;\nDROP TABLE t;\nSELECT * FROM orders",
            Dialect::Generic,
        );
        assert_eq!(batch.success_count, 2);
        assert_eq!(batch.error_count, 2);
        assert_eq!(batch.errors[0].index, 1);
        assert_eq!(batch.errors[0].line, Some(2));
        assert_eq!(batch.errors[1].index, 2);
        assert!(batch.errors[1].message.contains("DROP"));
        assert_eq!(
            batch.statements.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 3]
        );
    }
}
