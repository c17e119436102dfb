use flowtrace_core::{
    build_lineage_graph_from_sources, Dialect, FlowAnalyzer, FlowOptions, LineageConfig,
    LineageWorkspace, SourceFile,
};
use proptest::prelude::*;

/// A chain-with-branches workspace: view `v{i}` reads from one or two earlier
/// relations, and `t0` is the only base table.
fn workspace_sql(parents: &[(usize, Option<usize>)]) -> Vec<SourceFile> {
    let mut files = vec![SourceFile::new("t0.sql", "CREATE TABLE t0 (id INT, val INT)")];
    for (i, (left, right)) in parents.iter().enumerate() {
        let name = i + 1;
        let left = left % name;
        let relation = |idx: usize| {
            if idx == 0 {
                "t0".to_string()
            } else {
                format!("v{idx}")
            }
        };
        let sql = match right.map(|r| r % name) {
            Some(right) if right != left => format!(
                "CREATE VIEW v{name} AS SELECT a.id, b.val FROM {} a JOIN {} b ON a.id = b.id",
                relation(left),
                relation(right)
            ),
            _ => format!("CREATE VIEW v{name} AS SELECT id, val FROM {}", relation(left)),
        };
        files.push(SourceFile::new(format!("v{name}.sql"), sql));
    }
    files
}

fn parents_strategy() -> impl Strategy<Value = Vec<(usize, Option<usize>)>> {
    prop::collection::vec((0usize..32, prop::option::of(0usize..32)), 1..12)
}

proptest! {
    #[test]
    fn every_edge_is_reachable_both_ways(parents in parents_strategy()) {
        let graph = build_lineage_graph_from_sources(
            &workspace_sql(&parents),
            Dialect::Generic,
            &LineageConfig::default(),
        );
        let analyzer = FlowAnalyzer::new(&graph);
        let options = FlowOptions::default().unbounded();

        for edge in graph.edges() {
            let down = analyzer.get_downstream(&edge.source.id(), &options).unwrap();
            prop_assert!(down.contains(&edge.target.id()));
            let up = analyzer.get_upstream(&edge.target.id(), &options).unwrap();
            prop_assert!(up.contains(&edge.source.id()));
        }
    }

    #[test]
    fn deeper_walks_never_lose_nodes(parents in parents_strategy(), depth in 1u32..8) {
        let graph = build_lineage_graph_from_sources(
            &workspace_sql(&parents),
            Dialect::Generic,
            &LineageConfig::default(),
        );
        let analyzer = FlowAnalyzer::new(&graph);
        let shallow = analyzer
            .get_downstream("t0", &FlowOptions::default().with_depth(f64::from(depth)))
            .unwrap();
        let deep = analyzer
            .get_downstream("t0", &FlowOptions::default().with_depth(f64::from(depth + 1)))
            .unwrap();
        for id in shallow.node_ids() {
            prop_assert!(deep.contains(&id));
        }
        prop_assert!(shallow.depth <= depth as usize);
    }

    #[test]
    fn circular_views_terminate(size in 2usize..8) {
        // v0 reads v{size-1}, every other view reads its predecessor.
        let files: Vec<SourceFile> = (0..size)
            .map(|i| {
                let source = if i == 0 { size - 1 } else { i - 1 };
                SourceFile::new(
                    format!("v{i}.sql"),
                    format!("CREATE VIEW v{i} AS SELECT id FROM v{source}"),
                )
            })
            .collect();
        let graph = build_lineage_graph_from_sources(&files, Dialect::Generic, &LineageConfig::default());
        let result = FlowAnalyzer::new(&graph)
            .get_downstream("v0", &FlowOptions::default().unbounded())
            .unwrap();
        prop_assert_eq!(result.nodes.len(), size);
        prop_assert!(result.contains("view:v0"));
    }

    #[test]
    fn rebuilding_the_same_files_is_idempotent(parents in parents_strategy()) {
        let files = workspace_sql(&parents);
        let workspace = LineageWorkspace::new(LineageConfig::default());
        let first = workspace.rebuild(&files);
        let second = workspace.rebuild(&files);
        prop_assert_eq!(first.stats(), second.stats());
        prop_assert_eq!(
            serde_json::to_value(&*first).unwrap(),
            serde_json::to_value(&*second).unwrap()
        );
    }
}
