//! Fuzz target for the workspace lineage builder and analyzers.
//!
//! Arbitrary file sets must build a graph, and every node of that graph must
//! be traversable in both directions without panicking.

#![no_main]

use arbitrary::Arbitrary;
use flowtrace_core::{
    build_lineage_graph_from_sources, Dialect, Direction, FlowAnalyzer, FlowOptions,
    LineageConfig, SourceFile,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    files: Vec<String>,
    depth: i8,
}

fuzz_target!(|input: FuzzInput| {
    let sources: Vec<SourceFile> = input
        .files
        .iter()
        .enumerate()
        .map(|(i, sql)| SourceFile::new(format!("f{i}.sql"), sql.as_str()))
        .collect();
    let graph =
        build_lineage_graph_from_sources(&sources, Dialect::Generic, &LineageConfig::default());

    let analyzer = FlowAnalyzer::new(&graph);
    let options = FlowOptions::default().with_depth(f64::from(input.depth));
    for node in graph.nodes() {
        let _ = analyzer.get_lineage(&node.key.id(), Direction::Both, &options);
    }
});
