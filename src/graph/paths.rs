//! Project path discovery and normalization.
//!
//! Every definition and declaration URI of every symbol contributes its
//! project-relative path (POSIX separators) to the file set, and every
//! strict-prefix ancestor to the folder set. The output feeds FOLDER/FILE
//! node creation and CONTAINS edges: top-level entries hang off the PROJECT
//! node (keyed by the absolute project path), the rest off their parent
//! folder.

use crate::index::SymbolTable;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct PathModel {
    project_path: PathBuf,
}

/// Discovered project-relative paths.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PathSets {
    pub files: BTreeSet<String>,
    pub folders: BTreeSet<String>,
}

fn to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

impl PathModel {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
        }
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn project_path_str(&self) -> String {
        self.project_path.to_string_lossy().into_owned()
    }

    pub fn project_name(&self) -> String {
        self.project_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Project")
            .to_string()
    }

    /// Absolute filesystem path for a `file://` URI.
    pub fn uri_to_abs_path(uri: &str) -> Option<PathBuf> {
        url::Url::parse(uri).ok()?.to_file_path().ok()
    }

    pub fn is_within_project(&self, path: &Path) -> bool {
        path.starts_with(&self.project_path)
    }

    /// Project-relative POSIX path for a URI inside the project.
    pub fn uri_to_relative(&self, uri: &str) -> Option<String> {
        let abs = Self::uri_to_abs_path(uri)?;
        self.relative_posix(&abs)
    }

    /// Project-relative POSIX path for an absolute path inside the project.
    pub fn relative_posix(&self, abs: &Path) -> Option<String> {
        let relative = abs.strip_prefix(&self.project_path).ok()?;
        let posix = to_posix(relative);
        (!posix.is_empty()).then_some(posix)
    }

    /// Join a project-relative path back to an absolute path.
    pub fn to_absolute(&self, relative: &str) -> PathBuf {
        self.project_path.join(relative)
    }

    /// Collect file and folder paths referenced by symbol locations.
    pub fn discover(&self, table: &SymbolTable) -> PathSets {
        let mut sets = PathSets::default();
        for symbol in table.symbols.values() {
            for location in [&symbol.definition, &symbol.declaration]
                .into_iter()
                .flatten()
            {
                let Some(relative) = self.uri_to_relative(&location.file_uri) else {
                    continue;
                };
                add_with_ancestors(&mut sets, &relative);
            }
        }
        info!(
            "Discovered {} files and {} folders",
            sets.files.len(),
            sets.folders.len()
        );
        sets
    }

    /// Rows for FOLDER nodes plus their CONTAINS parents, shallow first so
    /// parents exist before children.
    pub fn folder_rows(&self, folders: &BTreeSet<String>) -> Vec<Value> {
        let mut ordered: Vec<&String> = folders.iter().collect();
        ordered.sort_by_key(|path| (path.matches('/').count(), path.as_str()));
        ordered
            .into_iter()
            .map(|path| self.containment_row(path))
            .collect()
    }

    /// Rows for FILE nodes plus their CONTAINS parents.
    pub fn file_rows(&self, files: &BTreeSet<String>) -> Vec<Value> {
        files.iter().map(|path| self.containment_row(path)).collect()
    }

    fn containment_row(&self, relative: &str) -> Value {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        let parent_path = match relative.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => self.project_path_str(),
        };
        json!({
            "path": relative,
            "name": name,
            "parent_path": parent_path,
        })
    }
}

impl PathSets {
    /// Register a file and every ancestor folder.
    pub fn add_file(&mut self, relative: &str) {
        self.files.insert(relative.to_string());
        let mut rest = relative;
        while let Some((parent, _)) = rest.rsplit_once('/') {
            self.folders.insert(parent.to_string());
            rest = parent;
        }
    }
}

fn add_with_ancestors(sets: &mut PathSets, relative: &str) {
    sets.add_file(relative);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::parse_str;

    fn model() -> PathModel {
        PathModel::new("/proj")
    }

    #[test]
    fn uri_resolution_and_relativization() {
        let m = model();
        assert_eq!(
            m.uri_to_relative("file:///proj/src/core/io.c"),
            Some("src/core/io.c".to_string())
        );
        // Percent-encoded URIs resolve through the url crate.
        assert_eq!(
            m.uri_to_relative("file:///proj/src/my%20file.c"),
            Some("src/my file.c".to_string())
        );
        // Outside the project root.
        assert_eq!(m.uri_to_relative("file:///usr/include/stdio.h"), None);
        // Not a file URI.
        assert_eq!(m.uri_to_relative("https://example.com/a.c"), None);
    }

    #[test]
    fn discovery_adds_all_ancestors() {
        let index = r#"--- !Symbol
ID: 00000000000000AA
Name: io_read
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///proj/src/core/io.c'
  Start: { Line: 0, Column: 0 }
  End: { Line: 0, Column: 1 }
CanonicalDeclaration:
  FileURI: 'file:///proj/include/io.h'
  Start: { Line: 0, Column: 0 }
  End: { Line: 0, Column: 1 }
--- !Symbol
ID: 00000000000000BB
Name: external
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///usr/lib/libc.c'
  Start: { Line: 0, Column: 0 }
  End: { Line: 0, Column: 1 }
"#;
        let table = parse_str(index).unwrap();
        let sets = model().discover(&table);

        assert_eq!(
            sets.files,
            BTreeSet::from(["src/core/io.c".to_string(), "include/io.h".to_string()])
        );
        assert_eq!(
            sets.folders,
            BTreeSet::from(["src".to_string(), "src/core".to_string(), "include".to_string()])
        );
    }

    #[test]
    fn folder_rows_are_shallow_first_with_project_parent() {
        let folders = BTreeSet::from(["src/core".to_string(), "src".to_string()]);
        let rows = model().folder_rows(&folders);
        assert_eq!(rows[0]["path"], "src");
        assert_eq!(rows[0]["parent_path"], "/proj");
        assert_eq!(rows[1]["path"], "src/core");
        assert_eq!(rows[1]["parent_path"], "src");
        assert_eq!(rows[1]["name"], "core");
    }

    #[test]
    fn file_rows_point_at_their_folder() {
        let files = BTreeSet::from(["src/core/io.c".to_string(), "main.c".to_string()]);
        let rows = model().file_rows(&files);
        let main = rows.iter().find(|r| r["path"] == "main.c").unwrap();
        assert_eq!(main["parent_path"], "/proj");
        let io = rows.iter().find(|r| r["path"] == "src/core/io.c").unwrap();
        assert_eq!(io["parent_path"], "src/core");
    }

    #[test]
    fn no_relative_path_contains_dotdot() {
        let m = model();
        let sets = PathSets {
            files: BTreeSet::from(["src/a.c".to_string()]),
            folders: BTreeSet::from(["src".to_string()]),
        };
        for row in m.file_rows(&sets.files).iter().chain(m.folder_rows(&sets.folders).iter()) {
            let path = row["path"].as_str().unwrap();
            assert!(!path.contains(".."));
            assert!(!path.contains('\\'));
        }
    }
}
