use flowtrace_core::{
    build_lineage_graph_from_sources, Dialect, LineageConfig, LineageGraph, SourceFile,
};
use std::fs;
use std::path::PathBuf;

pub fn fixtures_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Every `.sql` file of a fixture directory, sorted by file name.
pub fn load_fixture_sources(name: &str) -> Vec<SourceFile> {
    let dir = fixtures_root().join(name);
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .expect("failed to list fixtures")
        .map(|entry| entry.expect("fixture entry").path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    paths.sort();
    paths
        .into_iter()
        .map(|path| {
            let content = fs::read_to_string(&path).expect("read fixture");
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            SourceFile::new(name, content)
        })
        .collect()
}

pub fn fixture_graph(name: &str) -> LineageGraph {
    build_lineage_graph_from_sources(
        &load_fixture_sources(name),
        Dialect::Generic,
        &LineageConfig::default(),
    )
}

pub fn graph_from(files: &[(&str, &str)]) -> LineageGraph {
    let sources: Vec<SourceFile> = files
        .iter()
        .map(|(path, sql)| SourceFile::new(*path, *sql))
        .collect();
    build_lineage_graph_from_sources(&sources, Dialect::Generic, &LineageConfig::default())
}
