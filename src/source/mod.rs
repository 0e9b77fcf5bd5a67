//! Source parsing: per-file function spans and include edges.
//!
//! Two interchangeable strategies sit behind the [`SourceParser`] trait: a
//! semantic one driven by libclang and a compilation database, and a
//! syntax-only one driven by tree-sitter. Full-project parses go through a
//! cache keyed by git commit (clean tree) or file mtimes.

mod clang;
mod treesitter;

pub mod cache;
pub mod spans_yaml;

pub use self::clang::ClangStrategy;
pub use self::treesitter::TreeSitterStrategy;

use crate::error::SourceResult;
use crate::types::FileFunctionSpans;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

/// Everything a strategy extracts from a set of source files.
#[derive(Debug, Default, Clone)]
pub struct ParsedSources {
    pub function_spans: Vec<FileFunctionSpans>,
    /// Absolute `(including, included)` pairs. Empty for the tree-sitter
    /// strategy, which cannot see the preprocessor.
    pub include_relations: BTreeSet<(PathBuf, PathBuf)>,
}

/// Common interface for the span extraction strategies.
pub trait SourceParser: Send {
    fn parse(&mut self, files: &[PathBuf]) -> SourceResult<ParsedSources>;

    /// Whether this strategy produces include edges.
    fn provides_includes(&self) -> bool;
}

/// Which backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceParserKind {
    Clang,
    TreeSitter,
}

/// Build a parser for the requested backend.
///
/// The clang backend resolves its compilation database here: an explicit
/// `--compile-commands` path, or `compile_commands.json` at the project
/// root.
pub fn create_parser(
    kind: SourceParserKind,
    project_path: &Path,
    compile_commands: Option<&Path>,
    workers: usize,
) -> SourceResult<Box<dyn SourceParser>> {
    match kind {
        SourceParserKind::Clang => Ok(Box::new(ClangStrategy::new(
            project_path,
            compile_commands,
        )?)),
        SourceParserKind::TreeSitter => Ok(Box::new(TreeSitterStrategy::new(workers))),
    }
}

/// Recursively collect `.c` and `.h` files under a folder.
pub fn scan_source_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("c") | Some("h")
            )
        })
        .collect();
    files.sort();
    files
}

/// Parse a whole project folder, consulting the parser cache first.
pub fn parse_project(
    parser: &mut dyn SourceParser,
    folder: &Path,
    cache_spec: Option<&Path>,
) -> SourceResult<ParsedSources> {
    let cache = cache::ParserCache::new(folder, cache_spec);
    if let Some(parsed) = cache.load_if_valid() {
        return Ok(parsed);
    }

    info!("No valid parser cache; parsing source files");
    let files = scan_source_files(folder);
    let parsed = parser.parse(&files)?;
    info!("Finished parsing {} source files", files.len());
    cache.save(&parsed);
    Ok(parsed)
}

/// Parse a specific file list without caching (incremental updates).
pub fn parse_files(
    parser: &mut dyn SourceParser,
    files: &[PathBuf],
) -> SourceResult<ParsedSources> {
    info!("Parsing {} specific files (no cache)", files.len());
    parser.parse(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_finds_only_c_and_h() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.c"), "int x;").unwrap();
        fs::write(dir.path().join("src/a.h"), "int x;").unwrap();
        fs::write(dir.path().join("src/notes.txt"), "x").unwrap();
        fs::write(dir.path().join("build.py"), "x").unwrap();

        let files = scan_source_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.c", "a.h"]);
    }
}
