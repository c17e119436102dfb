//! Upstream/downstream reachability over the lineage graph.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
#[cfg(feature = "tracing")]
use tracing::debug;

use super::traversal::{traverse, Layer, Traversal};
use crate::config::{AnalyzerConfig, HARD_MAX_DEPTH, UNBOUNDED_DEPTH};
use crate::error::LookupError;
use crate::lineage::{LineageGraph, NodeIdx};
use crate::types::{Direction, FlowPath, FlowResult, NodeKind};

/// Per-request traversal options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowOptions {
    /// Requested hop bound. A positive integer bounds the walk (at most
    /// [`HARD_MAX_DEPTH`]), `-1` removes the bound, and anything else falls
    /// back to the configured default depth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<f64>,
    /// Drop external nodes from the result. The walk still passes through them.
    pub exclude_external: bool,
}

impl FlowOptions {
    pub fn with_depth(mut self, depth: f64) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn unbounded(self) -> Self {
        self.with_depth(UNBOUNDED_DEPTH as f64)
    }

    pub fn excluding_external(mut self) -> Self {
        self.exclude_external = true;
        self
    }
}

/// Effective hop bound for a requested depth; `None` means unbounded.
pub fn normalize_depth(requested: Option<f64>, default_depth: usize) -> Option<usize> {
    match requested {
        Some(depth) if depth == UNBOUNDED_DEPTH as f64 => None,
        Some(depth) if depth.is_finite() && depth >= 1.0 && depth.fract() == 0.0 => {
            Some((depth.min(HARD_MAX_DEPTH as f64)) as usize)
        }
        _ => Some(default_depth.clamp(1, HARD_MAX_DEPTH)),
    }
}

/// Answers "what feeds X" and "what does X feed".
///
/// Relation nodes are walked over relation edges, column nodes over column
/// edges. Every call keeps its own visited set, so one analyzer can serve
/// concurrent requests over a shared graph.
#[derive(Debug, Clone)]
pub struct FlowAnalyzer<'g> {
    graph: &'g LineageGraph,
    config: AnalyzerConfig,
}

impl<'g> FlowAnalyzer<'g> {
    pub fn new(graph: &'g LineageGraph) -> Self {
        Self::with_config(graph, AnalyzerConfig::default())
    }

    pub fn with_config(graph: &'g LineageGraph, config: AnalyzerConfig) -> Self {
        Self { graph, config }
    }

    pub fn get_upstream(
        &self,
        node_id: &str,
        options: &FlowOptions,
    ) -> Result<FlowResult, LookupError> {
        self.get_lineage(node_id, Direction::Upstream, options)
    }

    pub fn get_downstream(
        &self,
        node_id: &str,
        options: &FlowOptions,
    ) -> Result<FlowResult, LookupError> {
        self.get_lineage(node_id, Direction::Downstream, options)
    }

    pub fn get_lineage(
        &self,
        node_id: &str,
        direction: Direction,
        options: &FlowOptions,
    ) -> Result<FlowResult, LookupError> {
        let start = self.graph.lookup(node_id, self.config.suggestion_limit)?;
        let start_idx = self.graph.index_of(&start.key).ok_or_else(|| LookupError {
            query: node_id.to_string(),
            suggestions: Vec::new(),
        })?;
        let max_depth = normalize_depth(options.max_depth, self.config.default_depth());
        #[cfg(feature = "tracing")]
        debug!(start = %start.key, ?direction, requested = ?options.max_depth, ?max_depth, "lineage walk");

        let layer = if start.kind() == NodeKind::Column {
            Layer::Columns
        } else {
            Layer::Relations
        };
        let walk = |upstream: bool| {
            let traversal = traverse(self.graph, start_idx, upstream, layer, max_depth);
            self.to_result(&traversal, direction, layer, max_depth, options.exclude_external)
        };
        Ok(match direction {
            Direction::Upstream => walk(true),
            Direction::Downstream => walk(false),
            Direction::Both => merge(walk(true), walk(false)),
        })
    }

    fn to_result(
        &self,
        traversal: &Traversal,
        direction: Direction,
        layer: Layer,
        max_depth: Option<usize>,
        exclude_external: bool,
    ) -> FlowResult {
        let keep = |idx: NodeIdx| !(exclude_external && self.graph.node_at(idx).is_external());

        let mut node_indices: Vec<NodeIdx> = Vec::new();
        if traversal.start_in_cycle {
            node_indices.push(traversal.start);
        }
        node_indices.extend(traversal.reached.iter().map(|r| r.idx));
        let nodes = node_indices
            .into_iter()
            .filter(|&idx| keep(idx))
            .map(|idx| self.graph.node_at(idx).clone())
            .collect();

        let crossed: Vec<usize> = traversal
            .edges
            .iter()
            .filter(|c| keep(c.source) && keep(c.target))
            .map(|c| c.edge)
            .collect();
        let kept_edges: HashSet<usize> = crossed.iter().copied().collect();
        let (edges, column_edges) = match layer {
            Layer::Relations => (
                crossed
                    .iter()
                    .map(|&e| self.graph.edge_at(e).clone())
                    .collect(),
                Vec::new(),
            ),
            Layer::Columns => (
                Vec::new(),
                crossed
                    .iter()
                    .map(|&e| self.graph.column_edge_at(e).clone())
                    .collect(),
            ),
        };
        let edge_id = |e: usize| match layer {
            Layer::Relations => self.graph.edge_at(e).id.clone(),
            Layer::Columns => self.graph.column_edge_at(e).id.clone(),
        };

        let mut paths: Vec<FlowPath> = Vec::new();
        for (path_nodes, path_edges) in traversal.tree_paths() {
            let path = FlowPath {
                nodes: path_nodes
                    .into_iter()
                    .filter(|&idx| keep(idx))
                    .map(|idx| self.graph.node_at(idx).key.id())
                    .collect(),
                edges: path_edges
                    .into_iter()
                    .filter(|e| kept_edges.contains(e))
                    .map(edge_id)
                    .collect(),
            };
            if path.nodes.len() > 1 && !paths.contains(&path) {
                paths.push(path);
            }
        }

        FlowResult {
            start: self.graph.node_at(traversal.start).key.id(),
            direction,
            nodes,
            edges,
            column_edges,
            paths,
            depth: traversal.depth,
            max_depth,
        }
    }
}

/// Union of an upstream and a downstream result, deduplicated by node id,
/// edge id and path.
fn merge(mut upstream: FlowResult, downstream: FlowResult) -> FlowResult {
    for node in downstream.nodes {
        if !upstream.nodes.iter().any(|n| n.key == node.key) {
            upstream.nodes.push(node);
        }
    }
    for edge in downstream.edges {
        if !upstream.edges.iter().any(|e| e.id == edge.id) {
            upstream.edges.push(edge);
        }
    }
    for edge in downstream.column_edges {
        if !upstream.column_edges.iter().any(|e| e.id == edge.id) {
            upstream.column_edges.push(edge);
        }
    }
    for path in downstream.paths {
        if !upstream.paths.contains(&path) {
            upstream.paths.push(path);
        }
    }
    upstream.direction = Direction::Both;
    upstream.depth = upstream.depth.max(downstream.depth);
    upstream
}
