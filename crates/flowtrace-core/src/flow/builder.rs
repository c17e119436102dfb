use std::collections::HashMap;
use std::mem;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::adapter::{
    CaseIr, DeleteIr, FromItemIr, JoinIr, PredicateIr, ProjectionItem, QueryIr, RelationIr,
    SelectIr, SetExprIr, StatementBody, StatementIr, TableRefIr, UpdateIr, WindowIr,
};
use crate::error::FlowError;
use crate::types::{
    ClauseType, FlowEdge, FlowGraph, FlowNode, FlowNodeDetail, FlowNodeKind, JoinKind, LineRange,
};

/// One graph under construction: the statement itself or a CTE/subquery body.
#[derive(Default)]
struct Scope {
    graph: FlowGraph,
    /// CTE name → id of its `cte` node in this graph.
    ctes: HashMap<String, String>,
    /// Set while building the body of a recursive CTE.
    recursive_self: Option<String>,
    /// CTEs of enclosing graphs referenced from this one.
    outer_refs: Vec<String>,
}

enum CteRef {
    Local(String),
    Outer,
    Recursive,
}

/// Builds one statement's flow graph. Node and edge ids are drawn from
/// counters shared by every nested graph of the statement.
pub(super) struct FlowBuilder {
    next_node: usize,
    next_edge: usize,
    current: Scope,
    enclosing: Vec<Scope>,
}

impl FlowBuilder {
    pub(super) fn new() -> Self {
        Self {
            next_node: 0,
            next_edge: 0,
            current: Scope::default(),
            enclosing: Vec::new(),
        }
    }

    pub(super) fn statement(mut self, statement: &StatementIr) -> Result<FlowGraph, FlowError> {
        let (upstream, target, label) = match &statement.body {
            StatementBody::Query(query) => (Some(self.query(query)), None, "RESULT".to_string()),
            StatementBody::Insert(insert) => (
                insert.source.as_ref().map(|query| self.query(query)),
                Some(insert.target.name.clone()),
                format!("INSERT INTO {}", insert.target.name),
            ),
            StatementBody::Update(update) => (
                Some(self.update(update)),
                Some(update.target.name.clone()),
                format!("UPDATE {}", update.target.name),
            ),
            StatementBody::Delete(delete) => {
                let targets = delete
                    .targets
                    .iter()
                    .map(|target| target.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    self.delete(delete),
                    Some(targets.clone()),
                    format!("DELETE FROM {targets}"),
                )
            }
            StatementBody::CreateTable(create) => (
                create.query.as_ref().map(|query| self.query(query)),
                Some(create.name.clone()),
                format!("CREATE TABLE {}", create.name),
            ),
            StatementBody::CreateView(view) => {
                let keyword = if view.materialized {
                    "CREATE MATERIALIZED VIEW"
                } else {
                    "CREATE VIEW"
                };
                (
                    Some(self.query(&view.query)),
                    Some(view.name.clone()),
                    format!("{keyword} {}", view.name),
                )
            }
            StatementBody::Unsupported { keyword } => {
                return Err(FlowError::UnsupportedStatement(keyword.clone()))
            }
        };

        let result = self.node(
            FlowNodeKind::Result,
            label,
            Some(statement.lines),
            FlowNodeDetail::Result {
                statement: statement.kind(),
                target,
            },
        );
        let result = self.stage(upstream, result);
        self.current.graph.output = Some(result);
        Ok(self.current.graph)
    }

    fn query(&mut self, query: &QueryIr) -> String {
        self.ctes(query);
        match &query.body {
            SetExprIr::Select(select) => {
                self.select(select, &query.order_by, query.limit.as_deref())
            }
            body => {
                let output = self.set_expr(body);
                self.sort_and_limit(Some(output.clone()), &query.order_by, query.limit.as_deref())
                    .unwrap_or(output)
            }
        }
    }

    fn ctes(&mut self, query: &QueryIr) {
        for cte in &query.ctes {
            self.enter(query.recursive.then(|| cte.name.clone()));
            let output = self.query(&cte.query);
            let (graph, refs) = self.leave(output);

            let recursive = query.recursive && has_recursive_leaf(&graph);
            let mut node = self.node(
                FlowNodeKind::Cte,
                cte.name.clone(),
                cte.lines,
                FlowNodeDetail::Cte {
                    name: cte.name.clone(),
                    recursive,
                    columns: cte.columns.clone(),
                },
            );
            node.children = Some(graph);
            let id = self.push(node);
            self.link_outer_refs(refs, &id);
            self.current.ctes.insert(cte.name.clone(), id);
        }
    }

    /// FROM → joins → WHERE → aggregate → HAVING → ORDER BY → LIMIT → projection.
    fn select(&mut self, select: &SelectIr, order_by: &[String], limit: Option<&str>) -> String {
        let mut upstream: Option<String> = None;
        for item in &select.from {
            let item_output = self.from_item(item);
            upstream = Some(match upstream {
                None => item_output,
                Some(left) => self.join(&left, &item_output, JoinKind::Cross, None, None),
            });
        }

        if let Some(filter) = &select.filter {
            upstream = Some(self.filter(upstream, filter, ClauseType::Where));
        }

        if select.is_aggregating() {
            let label = if select.group_by.is_empty() {
                "AGGREGATE".to_string()
            } else {
                format!("GROUP BY {}", select.group_by.join(", "))
            };
            let node = self.node(
                FlowNodeKind::Aggregate,
                label,
                None,
                FlowNodeDetail::Aggregate {
                    functions: select.aggregates.clone(),
                    group_by: select.group_by.clone(),
                },
            );
            upstream = Some(self.stage(upstream, node));
        }

        if let Some(having) = &select.having {
            upstream = Some(self.filter(upstream, having, ClauseType::Having));
        }

        upstream = self.sort_and_limit(upstream, order_by, limit);

        let columns = select
            .projection
            .iter()
            .map(|item| match item {
                ProjectionItem::Column(column) => column.name.clone(),
                ProjectionItem::Wildcard => "*".to_string(),
                ProjectionItem::QualifiedWildcard(qualifier) => format!("{qualifier}.*"),
            })
            .collect();
        let label = if select.distinct {
            "SELECT DISTINCT"
        } else {
            "SELECT"
        };
        let mut node = self.node(
            FlowNodeKind::Projection,
            label.to_string(),
            select.lines,
            FlowNodeDetail::Projection {
                columns,
                distinct: select.distinct,
            },
        );
        node.annotations = self.annotations(&select.windows, &select.cases);
        let id = self.stage(upstream, node);
        for subquery in &select.subqueries {
            self.subquery_into(subquery, &id, None);
        }
        id
    }

    fn set_expr(&mut self, expr: &SetExprIr) -> String {
        match expr {
            SetExprIr::Select(select) => self.select(select, &[], None),
            SetExprIr::SetOperation {
                operator,
                all,
                left,
                right,
            } => {
                let left = self.set_expr(left);
                let right = self.set_expr(right);
                let label = if *all {
                    format!("{operator} ALL")
                } else {
                    operator.clone()
                };
                let node = self.node(
                    FlowNodeKind::SetOperation,
                    label,
                    None,
                    FlowNodeDetail::SetOperation {
                        operator: operator.clone(),
                        all: *all,
                    },
                );
                let id = self.push(node);
                self.connect(&left, &id, None, None, None);
                self.connect(&right, &id, None, None, None);
                id
            }
            SetExprIr::Nested(query) => self.query(query),
            SetExprIr::Values { rows } => {
                let plural = if *rows == 1 { "" } else { "s" };
                self.leaf(format!("VALUES ({rows} row{plural})"), "values", None, None, false)
            }
            SetExprIr::Table { name } => self.table(&TableRefIr {
                name: name.clone(),
                alias: None,
                lines: None,
            }),
            SetExprIr::Other { keyword } => self.leaf(keyword.clone(), keyword, None, None, false),
        }
    }

    fn sort_and_limit(
        &mut self,
        mut upstream: Option<String>,
        order_by: &[String],
        limit: Option<&str>,
    ) -> Option<String> {
        if !order_by.is_empty() {
            let node = self.node(
                FlowNodeKind::Sort,
                format!("ORDER BY {}", order_by.join(", ")),
                None,
                FlowNodeDetail::Sort {
                    keys: order_by.to_vec(),
                },
            );
            upstream = Some(self.stage(upstream, node));
        }
        if let Some(limit) = limit {
            let node = self.node(
                FlowNodeKind::Limit,
                limit.to_string(),
                None,
                FlowNodeDetail::Limit {
                    clause: limit.to_string(),
                },
            );
            upstream = Some(self.stage(upstream, node));
        }
        upstream
    }

    fn from_item(&mut self, item: &FromItemIr) -> String {
        let upstream = self.relation(&item.relation);
        self.joins(upstream, &item.joins)
    }

    fn joins(&mut self, mut upstream: String, joins: &[JoinIr]) -> String {
        for join in joins {
            let right = self.relation(&join.relation);
            let condition = join.condition.as_ref().map(|c| c.text.clone()).or_else(|| {
                (!join.using.is_empty()).then(|| format!("USING ({})", join.using.join(", ")))
            });
            upstream = self.join(&upstream, &right, join.kind, condition, join.lines);
            if let Some(predicate) = &join.condition {
                for subquery in &predicate.subqueries {
                    self.subquery_into(subquery, &upstream, Some(ClauseType::On));
                }
            }
        }
        upstream
    }

    fn join(
        &mut self,
        left: &str,
        right: &str,
        kind: JoinKind,
        condition: Option<String>,
        lines: Option<LineRange>,
    ) -> String {
        let node = self.node(
            FlowNodeKind::Join,
            kind.as_sql().to_string(),
            lines,
            FlowNodeDetail::Join {
                join_type: kind,
                condition: condition.clone(),
            },
        );
        let id = self.push(node);
        self.connect(left, &id, None, Some(ClauseType::Join), None);
        let clause_type = if condition.is_some() {
            ClauseType::On
        } else {
            ClauseType::Join
        };
        self.connect(right, &id, condition, Some(clause_type), lines);
        id
    }

    fn relation(&mut self, relation: &RelationIr) -> String {
        match relation {
            RelationIr::Table(table) => self.table(table),
            RelationIr::Derived(derived) => {
                self.enter(None);
                let output = self.query(&derived.query);
                let (graph, refs) = self.leave(output);
                let mut node = self.node(
                    FlowNodeKind::Subquery,
                    derived
                        .alias
                        .clone()
                        .unwrap_or_else(|| "subquery".to_string()),
                    derived.lines,
                    FlowNodeDetail::Subquery {
                        alias: derived.alias.clone(),
                        lateral: derived.lateral,
                    },
                );
                node.children = Some(graph);
                let id = self.push(node);
                self.link_outer_refs(refs, &id);
                id
            }
            RelationIr::Nested { item, .. } => self.from_item(item),
            RelationIr::Function { text, alias, lines } => {
                self.leaf(text.clone(), text, alias.as_deref(), *lines, false)
            }
        }
    }

    /// A table reference. Only the table name is matched against CTEs; the
    /// alias is a scope-local name and never consulted here.
    fn table(&mut self, table: &TableRefIr) -> String {
        let reference = if table.name.contains('.') {
            None
        } else {
            self.resolve_cte(&table.name)
        };
        let label = match &table.alias {
            Some(alias) if *alias != table.name => format!("{} AS {alias}", table.name),
            _ => table.name.clone(),
        };
        match reference {
            Some(CteRef::Local(id)) => {
                #[cfg(feature = "tracing")]
                debug!(name = %table.name, node = %id, "relation resolved to CTE");
                id
            }
            Some(CteRef::Recursive) => self.leaf(
                label,
                &table.name,
                table.alias.as_deref(),
                table.lines,
                true,
            ),
            Some(CteRef::Outer) | None => self.leaf(
                label,
                &table.name,
                table.alias.as_deref(),
                table.lines,
                false,
            ),
        }
    }

    fn leaf(
        &mut self,
        label: String,
        name: &str,
        alias: Option<&str>,
        lines: Option<LineRange>,
        recursive: bool,
    ) -> String {
        let node = self.node(
            FlowNodeKind::Table,
            label,
            lines,
            FlowNodeDetail::Table {
                name: name.to_string(),
                alias: alias.map(str::to_string),
                recursive,
            },
        );
        self.push(node)
    }

    fn filter(
        &mut self,
        upstream: Option<String>,
        predicate: &PredicateIr,
        clause: ClauseType,
    ) -> String {
        let keyword = match clause {
            ClauseType::Having => "HAVING",
            _ => "WHERE",
        };
        let mut node = self.node(
            FlowNodeKind::Filter,
            keyword.to_string(),
            predicate.lines,
            FlowNodeDetail::Filter {
                clause,
                predicate: predicate.text.clone(),
            },
        );
        node.annotations = self.annotations(&[], &predicate.cases);
        let id = self.push(node);
        if let Some(upstream) = upstream {
            self.connect(
                &upstream,
                &id,
                Some(predicate.text.clone()),
                Some(clause),
                predicate.lines,
            );
        }
        for subquery in &predicate.subqueries {
            self.subquery_into(subquery, &id, Some(ClauseType::Filter));
        }
        id
    }

    fn subquery_into(&mut self, query: &QueryIr, target: &str, clause_type: Option<ClauseType>) {
        self.enter(None);
        let output = self.query(query);
        let (graph, refs) = self.leave(output);
        let mut node = self.node(
            FlowNodeKind::Subquery,
            "subquery".to_string(),
            query.lines,
            FlowNodeDetail::Subquery {
                alias: None,
                lateral: false,
            },
        );
        node.children = Some(graph);
        let id = self.push(node);
        self.link_outer_refs(refs, &id);
        self.connect(&id, target, None, clause_type, query.lines);
    }

    fn update(&mut self, update: &UpdateIr) -> String {
        let target = self.table(&update.target);
        let mut upstream = self.joins(target, &update.joins);
        for item in &update.from {
            let item_output = self.from_item(item);
            upstream = self.join(&upstream, &item_output, JoinKind::Cross, None, None);
        }
        let mut upstream = Some(upstream);
        if let Some(filter) = &update.filter {
            upstream = Some(self.filter(upstream, filter, ClauseType::Where));
        }

        let columns = update
            .assignments
            .iter()
            .map(|assignment| format!("{} = {}", assignment.column, assignment.expression))
            .collect();
        let node = self.node(
            FlowNodeKind::Projection,
            "SET".to_string(),
            None,
            FlowNodeDetail::Projection {
                columns,
                distinct: false,
            },
        );
        let id = self.stage(upstream, node);
        for assignment in &update.assignments {
            for subquery in &assignment.subqueries {
                self.subquery_into(subquery, &id, None);
            }
        }
        id
    }

    fn delete(&mut self, delete: &DeleteIr) -> Option<String> {
        let mut upstream: Option<String> = None;
        for item in &delete.sources {
            let item_output = self.from_item(item);
            upstream = Some(match upstream {
                None => item_output,
                Some(left) => self.join(&left, &item_output, JoinKind::Cross, None, None),
            });
        }
        if let Some(filter) = &delete.filter {
            upstream = Some(self.filter(upstream, filter, ClauseType::Where));
        }
        upstream
    }

    fn annotations(&mut self, windows: &[WindowIr], cases: &[CaseIr]) -> Vec<FlowNode> {
        let mut annotations = Vec::with_capacity(windows.len() + cases.len());
        for window in windows {
            annotations.push(self.node(
                FlowNodeKind::Window,
                window.function.clone(),
                None,
                FlowNodeDetail::Window {
                    function: window.function.clone(),
                    partition_by: window.partition_by.clone(),
                    order_by: window.order_by.clone(),
                    frame: window.frame.clone(),
                },
            ));
        }
        for case in cases {
            annotations.push(self.node(
                FlowNodeKind::Case,
                "CASE".to_string(),
                None,
                FlowNodeDetail::Case {
                    operand: case.operand.clone(),
                    branches: case.branches.clone(),
                    else_result: case.else_result.clone(),
                },
            ));
        }
        annotations
    }

    fn resolve_cte(&mut self, name: &str) -> Option<CteRef> {
        let reference = std::iter::once(&self.current)
            .chain(self.enclosing.iter().rev())
            .enumerate()
            .find_map(|(depth, scope)| match scope.ctes.get(name) {
                Some(id) if depth == 0 => Some(CteRef::Local(id.clone())),
                Some(_) => Some(CteRef::Outer),
                None if scope.recursive_self.as_deref() == Some(name) => Some(CteRef::Recursive),
                None => None,
            });
        if matches!(reference, Some(CteRef::Outer))
            && !self.current.outer_refs.iter().any(|r| r == name)
        {
            self.current.outer_refs.push(name.to_string());
        }
        reference
    }

    /// Connects CTEs referenced from a nested graph to the node holding it, or
    /// hands the reference further out when the CTE belongs to an outer graph.
    fn link_outer_refs(&mut self, refs: Vec<String>, container: &str) {
        for name in refs {
            if let Some(cte) = self.current.ctes.get(&name).cloned() {
                self.connect(&cte, container, None, None, None);
            } else if !self.current.outer_refs.contains(&name) {
                self.current.outer_refs.push(name);
            }
        }
    }

    fn enter(&mut self, recursive_self: Option<String>) {
        let parent = mem::replace(
            &mut self.current,
            Scope {
                recursive_self,
                ..Scope::default()
            },
        );
        self.enclosing.push(parent);
    }

    fn leave(&mut self, output: String) -> (FlowGraph, Vec<String>) {
        let parent = self.enclosing.pop().unwrap_or_default();
        let mut child = mem::replace(&mut self.current, parent);
        child.graph.output = Some(output);
        (child.graph, child.outer_refs)
    }

    fn node(
        &mut self,
        kind: FlowNodeKind,
        label: String,
        lines: Option<LineRange>,
        detail: FlowNodeDetail,
    ) -> FlowNode {
        self.next_node += 1;
        FlowNode {
            id: format!("n{}", self.next_node),
            kind,
            label,
            lines,
            detail,
            annotations: Vec::new(),
            children: None,
        }
    }

    fn push(&mut self, node: FlowNode) -> String {
        let id = node.id.clone();
        self.current.graph.nodes.push(node);
        id
    }

    /// Appends `node` as the next pipeline stage after `upstream`.
    fn stage(&mut self, upstream: Option<String>, node: FlowNode) -> String {
        let id = self.push(node);
        if let Some(upstream) = upstream {
            self.connect(&upstream, &id, None, None, None);
        }
        id
    }

    fn connect(
        &mut self,
        source: &str,
        target: &str,
        clause: Option<String>,
        clause_type: Option<ClauseType>,
        lines: Option<LineRange>,
    ) {
        self.next_edge += 1;
        self.current.graph.edges.push(FlowEdge {
            id: format!("e{}", self.next_edge),
            source: source.to_string(),
            target: target.to_string(),
            clause,
            clause_type,
            lines,
        });
    }
}

fn has_recursive_leaf(graph: &FlowGraph) -> bool {
    let mut stack = vec![graph];
    while let Some(graph) = stack.pop() {
        for node in &graph.nodes {
            if matches!(
                node.detail,
                FlowNodeDetail::Table {
                    recursive: true,
                    ..
                }
            ) {
                return true;
            }
            if let Some(children) = &node.children {
                stack.push(children);
            }
        }
    }
    false
}
