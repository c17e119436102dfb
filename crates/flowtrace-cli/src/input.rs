//! Input handling for files, directories and stdin.

use anyhow::{Context, Result};
use flowtrace_core::SourceFile;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Read SQL input from files, directories or stdin.
///
/// Directories are walked recursively for `*.sql` files, in sorted order.
/// If no paths are provided, reads from stdin.
pub fn read_input(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    if paths.is_empty() {
        read_from_stdin()
    } else {
        read_from_paths(paths)
    }
}

/// Read SQL from stdin
fn read_from_stdin() -> Result<Vec<SourceFile>> {
    let mut content = String::new();
    io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read from stdin")?;

    Ok(vec![SourceFile::new("<stdin>", content)])
}

fn read_from_paths(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            for file in sql_files_in(path)? {
                sources.push(read_file(&file)?);
            }
        } else {
            sources.push(read_file(path)?);
        }
    }
    Ok(sources)
}

fn sql_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", dir.display()))?;
        let is_sql = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"));
        if entry.file_type().is_file() && is_sql {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn read_file(path: &Path) -> Result<SourceFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(SourceFile::new(path.display().to_string(), content))
}
