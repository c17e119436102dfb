//! Breadth-first reachability shared by the flow and impact analyzers.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::lineage::{LineageGraph, NodeIdx};

/// Which edge set a walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layer {
    Relations,
    Columns,
}

/// A node reached by a walk, with the tree edge that first reached it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reached {
    pub(crate) idx: NodeIdx,
    pub(crate) depth: usize,
    pub(crate) parent: NodeIdx,
    pub(crate) edge: usize,
}

/// A crossed edge in graph orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Crossed {
    pub(crate) edge: usize,
    pub(crate) source: NodeIdx,
    pub(crate) target: NodeIdx,
}

#[derive(Debug, Clone)]
pub(crate) struct Traversal {
    pub(crate) start: NodeIdx,
    /// Reached nodes in visit order; the start is never listed.
    pub(crate) reached: Vec<Reached>,
    pub(crate) edges: Vec<Crossed>,
    /// The start lies on a cycle (recursive CTE, circular views).
    pub(crate) start_in_cycle: bool,
    /// Deepest hop count reached.
    pub(crate) depth: usize,
}

impl Traversal {
    /// One path per leaf of the visit tree, each from the start outwards.
    pub(crate) fn tree_paths(&self) -> Vec<(Vec<NodeIdx>, Vec<usize>)> {
        let parents: HashSet<NodeIdx> = self.reached.iter().map(|r| r.parent).collect();
        let by_node: HashMap<NodeIdx, &Reached> = self.reached.iter().map(|r| (r.idx, r)).collect();

        let mut paths = Vec::new();
        for leaf in self.reached.iter().filter(|r| !parents.contains(&r.idx)) {
            let mut nodes = vec![leaf.idx];
            let mut edges = vec![leaf.edge];
            let mut current = leaf.parent;
            while let Some(step) = by_node.get(&current) {
                nodes.push(step.idx);
                edges.push(step.edge);
                current = step.parent;
            }
            nodes.push(self.start);
            nodes.reverse();
            edges.reverse();
            paths.push((nodes, edges));
        }
        paths
    }
}

/// Visits everything reachable from `start`, up to `max_depth` hops
/// (`None` = unbounded). Each node is expanded at most once.
pub(crate) fn traverse(
    graph: &LineageGraph,
    start: NodeIdx,
    upstream: bool,
    layer: Layer,
    max_depth: Option<usize>,
) -> Traversal {
    let mut traversal = Traversal {
        start,
        reached: Vec::new(),
        edges: Vec::new(),
        start_in_cycle: false,
        depth: 0,
    };
    let mut visited: HashSet<NodeIdx> = HashSet::from([start]);
    let mut crossed: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<(NodeIdx, usize)> = VecDeque::from([(start, 0)]);

    while let Some((idx, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        let neighbors: Vec<(usize, NodeIdx)> = match (layer, upstream) {
            (Layer::Relations, true) => graph.incoming(idx).collect(),
            (Layer::Relations, false) => graph.outgoing(idx).collect(),
            (Layer::Columns, true) => graph.column_incoming(idx).collect(),
            (Layer::Columns, false) => graph.column_outgoing(idx).collect(),
        };
        for (edge, next) in neighbors {
            if crossed.insert(edge) {
                let (source, target) = if upstream { (next, idx) } else { (idx, next) };
                traversal.edges.push(Crossed {
                    edge,
                    source,
                    target,
                });
            }
            if next == start {
                traversal.start_in_cycle = true;
                continue;
            }
            if visited.insert(next) {
                traversal.reached.push(Reached {
                    idx: next,
                    depth: depth + 1,
                    parent: idx,
                    edge,
                });
                traversal.depth = traversal.depth.max(depth + 1);
                queue.push_back((next, depth + 1));
            }
        }
    }
    traversal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineageConfig;
    use crate::lineage::{build_lineage_graph_from_sources, SourceFile};
    use crate::types::{Dialect, NodeKey};

    fn chain() -> LineageGraph {
        build_lineage_graph_from_sources(
            &[SourceFile::new(
                "chain.sql",
                "CREATE TABLE a (id INT);
                 CREATE VIEW b AS SELECT id FROM a;
                 CREATE VIEW c AS SELECT id FROM b;
                 CREATE VIEW d AS SELECT id FROM b;",
            )],
            Dialect::Generic,
            &LineageConfig::default(),
        )
    }

    #[test]
    fn test_depth_bound_and_tree_paths() {
        let graph = chain();
        let a = graph.index_of(&NodeKey::table("a")).unwrap();

        let one = traverse(&graph, a, false, Layer::Relations, Some(1));
        assert_eq!(one.reached.len(), 1);
        assert_eq!(one.depth, 1);

        let all = traverse(&graph, a, false, Layer::Relations, None);
        assert_eq!(all.reached.len(), 3);
        assert_eq!(all.depth, 2);
        let paths = all.tree_paths();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|(nodes, edges)| nodes.len() == 3 && edges.len() == 2));
        assert!(!all.start_in_cycle);
    }

    #[test]
    fn test_upstream_edges_keep_graph_orientation() {
        let graph = chain();
        let c = graph.index_of(&NodeKey::view("c")).unwrap();
        let b = graph.index_of(&NodeKey::view("b")).unwrap();
        let walk = traverse(&graph, c, true, Layer::Relations, None);
        assert_eq!(walk.edges[0].source, b);
        assert_eq!(walk.edges[0].target, c);
    }
}
