use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "tracing")]
use tracing::warn;

use super::builder::{build_lineage_graph_from_sources, SourceFile};
use super::LineageGraph;
use crate::config::LineageConfig;

/// Holder of the current lineage graph for a changing file set.
///
/// Readers take an `Arc<LineageGraph>` snapshot and traverse it without
/// holding any lock. [`LineageWorkspace::rebuild`] builds a complete new graph
/// first and only then swaps it in, so a reader sees either the old graph or
/// the new one.
#[derive(Debug)]
pub struct LineageWorkspace {
    config: LineageConfig,
    current: RwLock<Arc<LineageGraph>>,
}

impl LineageWorkspace {
    pub fn new(config: LineageConfig) -> Self {
        let empty = LineageGraph::new(config.default_schema.clone());
        Self {
            config,
            current: RwLock::new(Arc::new(empty)),
        }
    }

    /// Builds a workspace from `sources` in one step.
    pub fn from_sources(sources: &[SourceFile], config: LineageConfig) -> Self {
        let workspace = Self::new(config);
        workspace.rebuild(sources);
        workspace
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    /// Current graph.
    pub fn snapshot(&self) -> Arc<LineageGraph> {
        let guard = self.current.read().unwrap_or_else(|poisoned| {
            #[cfg(feature = "tracing")]
            warn!("lineage workspace lock was poisoned; reading last published graph");
            PoisonError::into_inner(poisoned)
        });
        Arc::clone(&*guard)
    }

    /// Replaces the graph with one built from `sources` and returns it.
    pub fn rebuild(&self, sources: &[SourceFile]) -> Arc<LineageGraph> {
        let graph = Arc::new(build_lineage_graph_from_sources(
            sources,
            self.config.dialect,
            &self.config,
        ));
        let mut guard = self.current.write().unwrap_or_else(|poisoned| {
            #[cfg(feature = "tracing")]
            warn!("lineage workspace lock was poisoned; replacing graph anyway");
            PoisonError::into_inner(poisoned)
        });
        *guard = Arc::clone(&graph);
        graph
    }
}

impl Default for LineageWorkspace {
    fn default() -> Self {
        Self::new(LineageConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKey;
    use std::thread;

    #[test]
    fn test_snapshots_survive_rebuild() {
        let workspace = LineageWorkspace::from_sources(
            &[SourceFile::new("a.sql", "CREATE TABLE a (id INT)")],
            LineageConfig::default(),
        );
        let before = workspace.snapshot();
        workspace.rebuild(&[SourceFile::new("b.sql", "CREATE TABLE b (id INT)")]);
        let after = workspace.snapshot();

        assert!(before.contains(&NodeKey::table("a")));
        assert!(!before.contains(&NodeKey::table("b")));
        assert!(after.contains(&NodeKey::table("b")));
        assert!(!after.contains(&NodeKey::table("a")));
    }

    #[test]
    fn test_readers_see_whole_graphs_during_rebuilds() {
        let workspace = Arc::new(LineageWorkspace::default());
        let small = vec![SourceFile::new("s.sql", "CREATE TABLE t (id INT)")];
        let large = vec![SourceFile::new(
            "l.sql",
            "CREATE TABLE t (id INT); CREATE VIEW v AS SELECT id FROM t",
        )];
        workspace.rebuild(&small);

        let writer = {
            let workspace = Arc::clone(&workspace);
            thread::spawn(move || {
                for i in 0..20 {
                    workspace.rebuild(if i % 2 == 0 { &large } else { &small });
                }
            })
        };
        for _ in 0..50 {
            let graph = workspace.snapshot();
            let has_view = graph.contains(&NodeKey::view("v"));
            assert_eq!(has_view, !graph.edges().is_empty());
        }
        writer.join().unwrap();
    }
}
