//! Result types returned by the flow, impact and column analyzers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::lineage::{ColumnEdge, LineageEdge, LineageEdgeKind, LineageNode, NodeKind, TransformKind};

/// Traversal direction over the lineage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards the data sources of a node.
    Upstream,
    /// Towards the consumers of a node.
    Downstream,
    Both,
}

/// One concrete route through the graph, starting at the traversal origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowPath {
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
}

/// Output of an upstream/downstream traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowResult {
    pub start: String,
    pub direction: Direction,
    pub nodes: Vec<LineageNode>,
    pub edges: Vec<LineageEdge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_edges: Vec<ColumnEdge>,
    pub paths: Vec<FlowPath>,
    /// Deepest hop count actually reached.
    pub depth: usize,
    /// Hop bound applied to the walk; `None` when unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

impl FlowResult {
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|node| node.key.id() == id)
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.key.id()).collect()
    }
}

/// Proposed schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Modify,
    Rename,
    Drop,
    AddColumn,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modify => "modify",
            Self::Rename => "rename",
            Self::Drop => "drop",
            Self::AddColumn => "add_column",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an impact, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ImpactSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ImpactSeverity {
    /// Next tier down; `Low` stays `Low`.
    pub fn one_below(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ImpactSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a change is being proposed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImpactTarget {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    /// Owning relation when the target is a column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

/// One object affected by a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImpactItem {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    /// Hop distance from the changed object.
    pub depth: usize,
    pub severity: ImpactSeverity,
    /// Relation edge that reached this object, for table-level analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<LineageEdgeKind>,
    /// Column transform that reached this object, for column-level analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformKind>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// Counts of affected objects by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImpactSummary {
    pub tables: usize,
    pub views: usize,
    pub queries: usize,
    pub files: usize,
}

/// Blast radius of a proposed table or column change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    pub change_type: ChangeType,
    pub target: ImpactTarget,
    pub severity: ImpactSeverity,
    pub summary: ImpactSummary,
    pub direct: Vec<ImpactItem>,
    pub transitive: Vec<ImpactItem>,
    pub suggestions: Vec<String>,
}

/// One column-edge traversal step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHop {
    pub from: String,
    pub to: String,
    pub transform: TransformKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// A maximal chain of column hops away from the requested column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLineagePath {
    pub depth: usize,
    /// Column ids in traversal order, starting with the requested column.
    pub nodes: Vec<String>,
    pub hops: Vec<ColumnHop>,
}

/// Field-level provenance of one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLineageResult {
    pub table: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub upstream: Vec<ColumnLineagePath>,
    pub downstream: Vec<ColumnLineagePath>,
    /// Set when the column could not be found; both path lists are then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_and_steps_down() {
        assert!(ImpactSeverity::Critical > ImpactSeverity::High);
        assert!(ImpactSeverity::Medium > ImpactSeverity::Low);
        assert_eq!(ImpactSeverity::Critical.one_below(), ImpactSeverity::High);
        assert_eq!(ImpactSeverity::Low.one_below(), ImpactSeverity::Low);
    }

    #[test]
    fn change_type_uses_snake_case() {
        let json = serde_json::to_string(&ChangeType::AddColumn).unwrap();
        assert_eq!(json, "\"add_column\"");
    }
}
