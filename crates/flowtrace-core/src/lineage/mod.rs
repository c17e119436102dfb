//! Workspace-wide lineage graph.
//!
//! Nodes live in an arena indexed by [`NodeKey`]; edges refer to nodes by arena
//! index through adjacency lists, so traversals never clone keys. The graph is
//! built wholesale by [`build_lineage_graph`] and is immutable afterwards.

mod builder;
mod suggest;
mod workspace;

pub use builder::{build_lineage_graph, build_lineage_graph_from_sources, FileStatements, SourceFile};
pub use workspace::LineageWorkspace;

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
#[cfg(feature = "tracing")]
use tracing::debug;

use crate::error::LookupError;
use crate::types::{
    normalize_name, ColumnEdge, ColumnMeta, GraphStats, LineageEdge, LineageEdgeKind,
    LineageNode, NodeKey, NodeKind, QueryReference, TransformKind,
};

/// Arena index of a node.
pub(crate) type NodeIdx = usize;

#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    nodes: Vec<LineageNode>,
    index: HashMap<NodeKey, NodeIdx>,
    edges: Vec<LineageEdge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    edge_keys: HashSet<(NodeIdx, NodeIdx, LineageEdgeKind, Option<String>)>,
    column_edges: Vec<ColumnEdge>,
    column_outgoing: Vec<Vec<usize>>,
    column_incoming: Vec<Vec<usize>>,
    column_edge_keys: HashSet<(NodeIdx, NodeIdx, Option<String>)>,
    query_references: Vec<QueryReference>,
    files: BTreeSet<String>,
    default_schema: Option<String>,
}

impl LineageGraph {
    pub(crate) fn new(default_schema: Option<String>) -> Self {
        Self {
            default_schema: default_schema.map(|schema| normalize_name(&schema)),
            ..Self::default()
        }
    }

    pub fn nodes(&self) -> &[LineageNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[LineageEdge] {
        &self.edges
    }

    pub fn column_edges(&self) -> &[ColumnEdge] {
        &self.column_edges
    }

    pub fn query_references(&self) -> &[QueryReference] {
        &self.query_references
    }

    /// Every file that contributed at least one statement.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, key: &NodeKey) -> Option<&LineageNode> {
        self.index.get(key).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.index.contains_key(key)
    }

    pub(crate) fn index_of(&self, key: &NodeKey) -> Option<NodeIdx> {
        self.index.get(key).copied()
    }

    pub(crate) fn node_at(&self, idx: NodeIdx) -> &LineageNode {
        &self.nodes[idx]
    }

    pub(crate) fn edge_at(&self, edge: usize) -> &LineageEdge {
        &self.edges[edge]
    }

    pub(crate) fn column_edge_at(&self, edge: usize) -> &ColumnEdge {
        &self.column_edges[edge]
    }

    /// Relation edges leaving `idx`, as `(edge index, target index)`.
    pub(crate) fn outgoing(&self, idx: NodeIdx) -> impl Iterator<Item = (usize, NodeIdx)> + '_ {
        self.outgoing[idx]
            .iter()
            .filter_map(move |&edge| Some((edge, self.index_of(&self.edges[edge].target)?)))
    }

    /// Relation edges entering `idx`, as `(edge index, source index)`.
    pub(crate) fn incoming(&self, idx: NodeIdx) -> impl Iterator<Item = (usize, NodeIdx)> + '_ {
        self.incoming[idx]
            .iter()
            .filter_map(move |&edge| Some((edge, self.index_of(&self.edges[edge].source)?)))
    }

    pub(crate) fn column_outgoing(
        &self,
        idx: NodeIdx,
    ) -> impl Iterator<Item = (usize, NodeIdx)> + '_ {
        self.column_outgoing[idx].iter().filter_map(move |&edge| {
            Some((edge, self.index_of(&self.column_edges[edge].target)?))
        })
    }

    pub(crate) fn column_incoming(
        &self,
        idx: NodeIdx,
    ) -> impl Iterator<Item = (usize, NodeIdx)> + '_ {
        self.column_incoming[idx].iter().filter_map(move |&edge| {
            Some((edge, self.index_of(&self.column_edges[edge].source)?))
        })
    }

    /// Relation edges ending at `key`.
    pub fn edges_into(&self, key: &NodeKey) -> Vec<&LineageEdge> {
        self.index_of(key)
            .map(|idx| self.incoming[idx].iter().map(|&e| &self.edges[e]).collect())
            .unwrap_or_default()
    }

    /// Relation edges starting at `key`.
    pub fn edges_from(&self, key: &NodeKey) -> Vec<&LineageEdge> {
        self.index_of(key)
            .map(|idx| self.outgoing[idx].iter().map(|&e| &self.edges[e]).collect())
            .unwrap_or_default()
    }

    /// Query references recorded against `key`.
    pub fn references_to(&self, key: &NodeKey) -> impl Iterator<Item = &QueryReference> {
        let key = key.clone();
        self.query_references
            .iter()
            .filter(move |reference| reference.node == key)
    }

    /// Resolves a public node id.
    ///
    /// Accepts `"<kind>:<name>"` or a bare name. A miss on `table:` retries
    /// `view:` (and the reverse), then `external:`. Bare names try every
    /// relation kind, then a unique schema-qualified match.
    pub fn resolve(&self, id: &str) -> Option<&LineageNode> {
        match id.parse::<NodeKey>() {
            Ok(key) => self.resolve_key(&key),
            Err(_) => self.resolve_bare(id),
        }
    }

    /// [`LineageGraph::resolve`], with ranked suggestions on a miss.
    pub fn lookup(&self, id: &str, suggestion_limit: usize) -> Result<&LineageNode, LookupError> {
        self.resolve(id).ok_or_else(|| LookupError {
            query: id.to_string(),
            suggestions: suggest::suggest(id, &self.nodes, suggestion_limit),
        })
    }

    /// Column `column` of the relation `table`, either given by id or bare name.
    pub fn resolve_column(&self, table: &str, column: &str) -> Option<&LineageNode> {
        let parent = self.resolve(table)?;
        if !parent.kind().is_relation() {
            return None;
        }
        self.node(&NodeKey::column(&parent.key, column))
    }

    pub(crate) fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        suggest::suggest(query, &self.nodes, limit)
    }

    fn resolve_key(&self, key: &NodeKey) -> Option<&LineageNode> {
        if let Some(node) = self.node(key) {
            return Some(node);
        }
        let fallbacks: &[NodeKind] = match key.kind {
            NodeKind::Table => &[NodeKind::View, NodeKind::External],
            NodeKind::View => &[NodeKind::Table, NodeKind::External],
            NodeKind::Column => {
                let (parent, column) = key.name.rsplit_once('.')?;
                return self.resolve_column(parent, column);
            }
            NodeKind::Cte | NodeKind::External => &[],
        };
        for kind in fallbacks {
            if let Some(node) = self.node(&key.with_kind(*kind)) {
                #[cfg(feature = "tracing")]
                debug!(requested = %key, resolved = %node.key, "node lookup fell back to another kind");
                return Some(node);
            }
        }
        self.unique_qualified(&key.name, key.kind)
    }

    fn resolve_bare(&self, name: &str) -> Option<&LineageNode> {
        let name = normalize_name(name);
        if name.is_empty() {
            return None;
        }
        for kind in [
            NodeKind::Table,
            NodeKind::View,
            NodeKind::Cte,
            NodeKind::External,
        ] {
            if let Some(node) = self.node(&NodeKey { kind, name: name.clone() }) {
                return Some(node);
            }
        }
        if let Some(node) = self.unique_qualified(&name, NodeKind::Table) {
            return Some(node);
        }
        // `orders.id` as a bare name is a column of `orders`.
        let (parent, column) = name.rsplit_once('.')?;
        self.resolve_column(parent, column)
    }

    /// Schema-aware match for a name that is not stored verbatim: an unqualified
    /// name matches the single relation with that simple name, or the one under
    /// the default schema; `<default_schema>.<name>` matches a bare definition.
    fn unique_qualified(&self, name: &str, preferred: NodeKind) -> Option<&LineageNode> {
        let relations = || {
            self.nodes
                .iter()
                .filter(|node| node.kind().is_relation() && node.kind() != NodeKind::Cte)
        };

        if let Some((schema, simple)) = name.rsplit_once('.') {
            if self.default_schema.as_deref() == Some(schema) {
                return relations()
                    .filter(|node| node.name() == simple)
                    .min_by_key(|node| node.kind() != preferred);
            }
            return None;
        }

        if let Some(schema) = &self.default_schema {
            let qualified = format!("{schema}.{name}");
            if let Some(node) = relations()
                .filter(|node| node.name() == qualified)
                .min_by_key(|node| node.kind() != preferred)
            {
                return Some(node);
            }
        }

        let mut matches = relations().filter(|node| {
            node.key.qualifier().is_some() && node.key.simple_name() == name
        });
        let first = matches.next()?;
        match matches.next() {
            None => Some(first),
            Some(_) => None,
        }
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            edges: self.edges.len(),
            column_edges: self.column_edges.len(),
            query_references: self.query_references.len(),
            files: self.files.len(),
            ..GraphStats::default()
        };
        for node in &self.nodes {
            match node.kind() {
                NodeKind::Table => stats.tables += 1,
                NodeKind::View => stats.views += 1,
                NodeKind::Cte => stats.ctes += 1,
                NodeKind::Column => stats.columns += 1,
                NodeKind::External => stats.externals += 1,
            }
        }
        stats
    }

    // Construction. Only the builder mutates a graph.

    pub(crate) fn record_file(&mut self, path: &str) {
        self.files.insert(path.to_string());
    }

    /// Inserts `node` unless its key exists; returns the arena index either way.
    pub(crate) fn add_node(&mut self, node: LineageNode) -> NodeIdx {
        if let Some(&idx) = self.index.get(&node.key) {
            let existing = &mut self.nodes[idx];
            if existing.file.is_none() {
                existing.file = node.file;
                existing.line = node.line;
            }
            if existing.meta.is_none() {
                existing.meta = node.meta;
            }
            return idx;
        }
        let idx = self.nodes.len();
        self.index.insert(node.key.clone(), idx);
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.column_outgoing.push(Vec::new());
        self.column_incoming.push(Vec::new());
        idx
    }

    /// Adds (or returns) the column `name` of `parent`.
    pub(crate) fn add_column(
        &mut self,
        parent: NodeIdx,
        name: &str,
        meta: Option<ColumnMeta>,
    ) -> NodeIdx {
        let parent_key = self.nodes[parent].key.clone();
        let key = NodeKey::column(&parent_key, name);
        if let Some(idx) = self.index_of(&key) {
            if meta.is_some() && self.nodes[idx].meta.is_none() {
                self.nodes[idx].meta = meta;
            }
            return idx;
        }
        let mut node = LineageNode::new(key.clone());
        node.parent = Some(parent_key);
        node.file = self.nodes[parent].file.clone();
        node.line = self.nodes[parent].line;
        node.meta = meta;
        let idx = self.add_node(node);
        self.nodes[parent].columns.push(key);
        idx
    }

    /// Simple names of the columns `idx` owns, in declaration order.
    pub(crate) fn column_names(&self, idx: NodeIdx) -> Vec<String> {
        self.nodes[idx]
            .columns
            .iter()
            .map(|key| key.simple_name().to_string())
            .collect()
    }

    /// Adds a relation edge; duplicates of (source, target, kind, file) are dropped.
    pub(crate) fn add_edge(
        &mut self,
        source: NodeIdx,
        target: NodeIdx,
        kind: LineageEdgeKind,
        file: Option<&str>,
        line: Option<usize>,
    ) {
        let dedup = (source, target, kind, file.map(str::to_string));
        if !self.edge_keys.insert(dedup) {
            return;
        }
        let edge = self.edges.len();
        self.edges.push(LineageEdge {
            id: format!("e{edge}"),
            source: self.nodes[source].key.clone(),
            target: self.nodes[target].key.clone(),
            kind,
            file: file.map(str::to_string),
            line,
        });
        self.outgoing[source].push(edge);
        self.incoming[target].push(edge);
    }

    /// Adds a column edge; the first edge per (source, target, file) wins.
    pub(crate) fn add_column_edge(
        &mut self,
        source: NodeIdx,
        target: NodeIdx,
        transform: TransformKind,
        expression: Option<String>,
        file: Option<&str>,
        line: Option<usize>,
    ) {
        let dedup = (source, target, file.map(str::to_string));
        if !self.column_edge_keys.insert(dedup) {
            return;
        }
        let edge = self.column_edges.len();
        self.column_edges.push(ColumnEdge {
            id: format!("c{edge}"),
            source: self.nodes[source].key.clone(),
            target: self.nodes[target].key.clone(),
            transform,
            expression: expression.filter(|_| transform.carries_expression()),
            file: file.map(str::to_string),
            line,
        });
        self.column_outgoing[source].push(edge);
        self.column_incoming[target].push(edge);
    }

    pub(crate) fn add_query_reference(&mut self, reference: QueryReference) {
        if !self.query_references.contains(&reference) {
            self.query_references.push(reference);
        }
    }
}

impl Serialize for LineageGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LineageGraph", 5)?;
        state.serialize_field("nodes", &self.nodes)?;
        state.serialize_field("edges", &self.edges)?;
        state.serialize_field("columnEdges", &self.column_edges)?;
        state.serialize_field("queryReferences", &self.query_references)?;
        state.serialize_field("stats", &self.stats())?;
        state.end()
    }
}
