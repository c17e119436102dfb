//! Per-statement execution flow graph types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{LineRange, StatementKind};

/// Pipeline stage kind of a [`FlowNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeKind {
    Table,
    Filter,
    Join,
    Aggregate,
    Sort,
    Limit,
    Projection,
    Result,
    Cte,
    SetOperation,
    Subquery,
    Window,
    Case,
}

impl FlowNodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Filter => "filter",
            Self::Join => "join",
            Self::Aggregate => "aggregate",
            Self::Sort => "sort",
            Self::Limit => "limit",
            Self::Projection => "projection",
            Self::Result => "result",
            Self::Cte => "cte",
            Self::SetOperation => "set_operation",
            Self::Subquery => "subquery",
            Self::Window => "window",
            Self::Case => "case",
        }
    }
}

impl fmt::Display for FlowNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join operator flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Semi,
    Anti,
    Apply,
    AsOf,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
            Self::Semi => "SEMI JOIN",
            Self::Anti => "ANTI JOIN",
            Self::Apply => "APPLY",
            Self::AsOf => "ASOF JOIN",
        }
    }
}

/// Clause that introduced a [`FlowEdge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClauseType {
    Join,
    Where,
    Having,
    On,
    Filter,
}

/// One WHEN/THEN arm of a CASE expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaseBranch {
    pub condition: String,
    pub result: String,
}

/// Kind-specific payload of a [`FlowNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlowNodeDetail {
    #[serde(rename_all = "camelCase")]
    Table {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        /// Self-reference from inside a recursive CTE body.
        #[serde(default)]
        recursive: bool,
    },
    #[serde(rename_all = "camelCase")]
    Join {
        join_type: JoinKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Filter { clause: ClauseType, predicate: String },
    #[serde(rename_all = "camelCase")]
    Aggregate {
        functions: Vec<String>,
        group_by: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Sort { keys: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Limit { clause: String },
    #[serde(rename_all = "camelCase")]
    Projection { columns: Vec<String>, distinct: bool },
    #[serde(rename_all = "camelCase")]
    SetOperation { operator: String, all: bool },
    #[serde(rename_all = "camelCase")]
    Cte {
        name: String,
        recursive: bool,
        columns: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Subquery {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        #[serde(default)]
        lateral: bool,
    },
    #[serde(rename_all = "camelCase")]
    Window {
        function: String,
        partition_by: Vec<String>,
        order_by: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Case {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operand: Option<String>,
        branches: Vec<CaseBranch>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_result: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Result {
        statement: StatementKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
}

/// One pipeline stage of a statement's flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    /// Unique within the statement, nested child graphs included.
    pub id: String,
    pub kind: FlowNodeKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<LineRange>,
    pub detail: FlowNodeDetail,
    /// Window and CASE expressions evaluated by this stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<FlowNode>,
    /// Body of a CTE or subquery node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<FlowGraph>,
}

/// Directed data-flow connection between two nodes of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clause_type: Option<ClauseType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<LineRange>,
}

/// Flow graph for one statement (or one nested CTE/subquery body).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    /// Terminal node of this graph (the `result` node at the top level).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl FlowGraph {
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn nodes_of_kind(&self, kind: FlowNodeKind) -> impl Iterator<Item = &FlowNode> {
        self.nodes.iter().filter(move |node| node.kind == kind)
    }

    /// Ids of nodes with an edge into `id`.
    pub fn inputs_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|edge| edge.target == id)
            .map(|edge| edge.source.as_str())
            .collect()
    }
}

/// A statement in a batch that could not be turned into a flow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatementError {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

/// Flow graph of one statement in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatementFlow {
    pub index: usize,
    pub statement: StatementKind,
    pub lines: LineRange,
    pub graph: FlowGraph,
}

/// Result of building flow graphs for every statement of a SQL text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowBatch {
    pub statements: Vec<StatementFlow>,
    pub errors: Vec<StatementError>,
    pub success_count: usize,
    pub error_count: usize,
}
