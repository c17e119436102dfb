//! Workspace lineage graph types.
//!
//! Node identity is a typed [`NodeKey`]. The `"<kind>:<name>"` string form is only
//! produced and parsed at the public boundary (serialization and lookups by id).

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::common::StatementKind;

/// Kind of a lineage node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Table,
    View,
    Cte,
    Column,
    External,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Cte => "cte",
            Self::Column => "column",
            Self::External => "external",
        }
    }

    /// Kinds that own columns and take part in relation edges.
    pub fn is_relation(&self) -> bool {
        !matches!(self, Self::Column)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "view" => Ok(Self::View),
            "cte" => Ok(Self::Cte),
            "column" => Ok(Self::Column),
            "external" => Ok(Self::External),
            other => Err(format!("unknown node kind '{other}'")),
        }
    }
}

/// Typed identity of a lineage node.
///
/// `name` is always normalized: lower-cased, quote characters removed, parts joined
/// with `.`. Column names are `<relation name>.<column>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub name: String,
}

impl NodeKey {
    pub fn new(kind: NodeKind, name: &str) -> Self {
        Self {
            kind,
            name: normalize_name(name),
        }
    }

    pub fn table(name: &str) -> Self {
        Self::new(NodeKind::Table, name)
    }

    pub fn view(name: &str) -> Self {
        Self::new(NodeKind::View, name)
    }

    pub fn external(name: &str) -> Self {
        Self::new(NodeKind::External, name)
    }

    /// Key of `column` owned by the relation `parent`.
    pub fn column(parent: &NodeKey, column: &str) -> Self {
        Self {
            kind: NodeKind::Column,
            name: format!("{}.{}", parent.name, normalize_name(column)),
        }
    }

    /// Same name under a different kind.
    pub fn with_kind(&self, kind: NodeKind) -> Self {
        Self {
            kind,
            name: self.name.clone(),
        }
    }

    /// Last dotted segment of the name (the column name for column keys).
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Schema/relation prefix of the name, if qualified.
    pub fn qualifier(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(prefix, _)| prefix)
    }

    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

impl FromStr for NodeKey {
    type Err = String;

    /// Parses `"<kind>:<name>"`. A string with no recognised kind prefix is an error;
    /// bare-name lookups are handled by the graph, which knows which kinds exist.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once(':')
            .ok_or_else(|| format!("node id '{s}' has no kind prefix"))?;
        let kind = kind.parse::<NodeKind>()?;
        if name.trim().is_empty() {
            return Err(format!("node id '{s}' has an empty name"));
        }
        Ok(Self::new(kind, name))
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Single normalization rule for every name stored in a [`NodeKey`].
pub fn normalize_name(name: &str) -> String {
    name.split('.')
        .map(|part| {
            part.trim()
                .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
                .to_lowercase()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Declared column metadata carried by column nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    pub nullable: bool,
    pub primary_key: bool,
}

/// A table, view, CTE, column or unresolved external reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineageNode {
    #[serde(rename = "id")]
    #[schemars(with = "String")]
    pub key: NodeKey,
    /// Owning relation of a column node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub parent: Option<NodeKey>,
    /// Column nodes owned by a relation node, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<String>")]
    pub columns: Vec<NodeKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ColumnMeta>,
}

impl LineageNode {
    pub fn new(key: NodeKey) -> Self {
        Self {
            key,
            parent: None,
            columns: Vec::new(),
            file: None,
            line: None,
            meta: None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn is_external(&self) -> bool {
        self.key.kind == NodeKind::External
    }
}

/// Relationship recorded by a [`LineageEdge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LineageEdgeKind {
    DirectSelect,
    Join,
    Insert,
    Update,
    Delete,
}

impl LineageEdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectSelect => "direct_select",
            Self::Join => "join",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

impl fmt::Display for LineageEdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed relation-level edge: `source` feeds `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineageEdge {
    pub id: String,
    #[schemars(with = "String")]
    pub source: NodeKey,
    #[schemars(with = "String")]
    pub target: NodeKey,
    pub kind: LineageEdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// How an output column is derived from a source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Passthrough,
    Renamed,
    Aggregated,
    Calculated,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Renamed => "renamed",
            Self::Aggregated => "aggregated",
            Self::Calculated => "calculated",
        }
    }

    /// Whether the expression text is worth recording on the edge.
    pub fn carries_expression(&self) -> bool {
        matches!(self, Self::Aggregated | Self::Calculated)
    }

    /// Transform seen through two hops folded into one (outer applied on top of inner).
    pub fn compose(self, outer: TransformKind) -> TransformKind {
        match (self, outer) {
            (inner, TransformKind::Passthrough) => inner,
            (TransformKind::Passthrough, outer) => outer,
            (TransformKind::Renamed, TransformKind::Renamed) => TransformKind::Renamed,
            (TransformKind::Aggregated, _) | (_, TransformKind::Aggregated) => {
                TransformKind::Aggregated
            }
            _ => TransformKind::Calculated,
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed column-level edge: `source` column feeds `target` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnEdge {
    pub id: String,
    #[schemars(with = "String")]
    pub source: NodeKey,
    #[schemars(with = "String")]
    pub target: NodeKey,
    pub transform: TransformKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// A relation read or written by a statement that defines no object of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryReference {
    #[schemars(with = "String")]
    pub node: NodeKey,
    pub statement: StatementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// Node and edge counts of a lineage graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub tables: usize,
    pub views: usize,
    pub ctes: usize,
    pub columns: usize,
    pub externals: usize,
    pub edges: usize,
    pub column_edges: usize,
    pub query_references: usize,
    pub files: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_quotes_and_lowercases() {
        assert_eq!(normalize_name("\"Sales\".\"Orders\""), "sales.orders");
        assert_eq!(normalize_name("[dbo].[Users]"), "dbo.users");
        assert_eq!(normalize_name(" `proj`.ds.T "), "proj.ds.t");
    }

    #[test]
    fn node_key_round_trips_through_id() {
        let key = NodeKey::view("Analytics.Daily_Orders");
        assert_eq!(key.id(), "view:analytics.daily_orders");
        assert_eq!("view:analytics.daily_orders".parse::<NodeKey>(), Ok(key));
    }

    #[test]
    fn column_key_is_derived_from_parent() {
        let parent = NodeKey::table("orders");
        let column = NodeKey::column(&parent, "Customer_ID");
        assert_eq!(column.id(), "column:orders.customer_id");
        assert_eq!(column.simple_name(), "customer_id");
        assert_eq!(column.qualifier(), Some("orders"));
    }

    #[test]
    fn node_key_rejects_missing_prefix() {
        assert!("orders".parse::<NodeKey>().is_err());
        assert!("widget:orders".parse::<NodeKey>().is_err());
        assert!("table:".parse::<NodeKey>().is_err());
    }

    #[test]
    fn transform_composition_keeps_strongest() {
        use TransformKind::*;
        assert_eq!(Passthrough.compose(Renamed), Renamed);
        assert_eq!(Aggregated.compose(Passthrough), Aggregated);
        assert_eq!(Renamed.compose(Calculated), Calculated);
        assert_eq!(Calculated.compose(Aggregated), Aggregated);
    }

    #[test]
    fn node_key_serializes_as_string() {
        let edge = LineageEdge {
            id: "e0".to_string(),
            source: NodeKey::table("orders"),
            target: NodeKey::view("customer_orders"),
            kind: LineageEdgeKind::Join,
            file: None,
            line: Some(3),
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["source"], "table:orders");
        assert_eq!(json["kind"], "join");
        let back: LineageEdge = serde_json::from_value(json).unwrap();
        assert_eq!(back, edge);
    }
}
