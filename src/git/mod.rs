//! Git change classification for incremental updates.
//!
//! Diffs two commits with copy detection at 100% similarity (the diff-tree
//! `--find-copies-harder -M100% -C100%` discipline): exact renames flatten
//! to delete(old) + add(new), exact copies to add(new). Only `.c` and `.h`
//! paths are kept.

use crate::error::{UpdateError, UpdateResult};
use git2::{Delta, DiffFindOptions, Repository, StatusOptions};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Categorized source file changes, project-relative with POSIX separators.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangedFiles {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

impl ChangedFiles {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Headers among the modified and deleted sets, whose dependents must
    /// be re-ingested.
    pub fn changed_headers(&self) -> Vec<String> {
        self.modified
            .iter()
            .chain(self.deleted.iter())
            .filter(|p| p.ends_with(".h"))
            .cloned()
            .collect()
    }
}

fn is_source_path(path: &str) -> bool {
    path.ends_with(".c") || path.ends_with(".h")
}

pub struct GitContext {
    repo: Repository,
}

impl GitContext {
    /// Open the repository containing `path`.
    pub fn open(path: &Path) -> UpdateResult<Self> {
        let repo = Repository::discover(path).map_err(|_| UpdateError::NotARepository {
            path: path.to_path_buf(),
        })?;
        let inside = match (repo.workdir(), path.canonicalize()) {
            (Some(workdir), Ok(canonical)) => canonical.starts_with(workdir),
            _ => false,
        };
        if !inside {
            return Err(UpdateError::NotARepository {
                path: path.to_path_buf(),
            });
        }
        Ok(Self { repo })
    }

    pub fn head_commit_hash(&self) -> UpdateResult<String> {
        Ok(self.repo.head()?.peel_to_commit()?.id().to_string())
    }

    pub fn is_dirty(&self) -> bool {
        let mut options = StatusOptions::new();
        options.include_untracked(true);
        self.repo
            .statuses(Some(&mut options))
            .map(|s| !s.is_empty())
            .unwrap_or(true)
    }

    /// Classify source file changes between two revisions.
    pub fn classify_changes(&self, old: &str, new: &str) -> UpdateResult<ChangedFiles> {
        let old_tree = self.repo.revparse_single(old)?.peel_to_commit()?.tree()?;
        let new_tree = self.repo.revparse_single(new)?.peel_to_commit()?.tree()?;

        let mut diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;

        // Exact renames and copies only, with unmodified files as copy
        // sources.
        let mut find = DiffFindOptions::new();
        find.renames(true)
            .copies(true)
            .copies_from_unmodified(true)
            .rename_threshold(100)
            .copy_threshold(100);
        diff.find_similar(Some(&mut find))?;

        let mut changes = ChangedFiles::default();
        for delta in diff.deltas() {
            let old_path = delta.old_file().path().map(path_to_posix);
            let new_path = delta.new_file().path().map(path_to_posix);

            match delta.status() {
                Delta::Added => {
                    if let Some(path) = new_path.filter(|p| is_source_path(p)) {
                        changes.added.insert(path);
                    }
                }
                Delta::Deleted => {
                    if let Some(path) = old_path.filter(|p| is_source_path(p)) {
                        changes.deleted.insert(path);
                    }
                }
                Delta::Modified => {
                    if let Some(path) = new_path.filter(|p| is_source_path(p)) {
                        changes.modified.insert(path);
                    }
                }
                // An exact rename keeps the symbol ids alive under the new
                // path; the FILE node changes by delete-plus-create.
                Delta::Renamed => {
                    if let Some(path) = old_path.filter(|p| is_source_path(p)) {
                        changes.deleted.insert(path);
                    }
                    if let Some(path) = new_path.filter(|p| is_source_path(p)) {
                        changes.added.insert(path);
                    }
                }
                Delta::Copied => {
                    if let Some(path) = new_path.filter(|p| is_source_path(p)) {
                        changes.added.insert(path);
                    }
                }
                _ => {}
            }
        }

        info!(
            "Changes {old}..{new}: {} added, {} modified, {} deleted",
            changes.added.len(),
            changes.modified.len(),
            changes.deleted.len()
        );
        Ok(changes)
    }
}

fn path_to_posix(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;

    struct TestRepo {
        _dir: tempfile::TempDir,
        repo_path: PathBuf,
    }

    impl TestRepo {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let repo_path = dir.path().to_path_buf();
            Repository::init(&repo_path).unwrap();
            Self {
                _dir: dir,
                repo_path,
            }
        }

        fn commit_files(&self, files: &[(&str, &str)], remove: &[&str]) -> String {
            let repo = Repository::open(&self.repo_path).unwrap();
            for (path, content) in files {
                let full = self.repo_path.join(path);
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(full, content).unwrap();
            }
            for path in remove {
                let _ = fs::remove_file(self.repo_path.join(path));
            }

            let mut index = repo.index().unwrap();
            index
                .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
                .unwrap();
            for path in remove {
                let _ = index.remove_path(Path::new(path));
            }
            index.write().unwrap();

            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let signature = Signature::now("test", "test@example.com").unwrap();
            let parent = repo
                .head()
                .ok()
                .and_then(|h| h.peel_to_commit().ok());
            let parents: Vec<&git2::Commit> = parent.iter().collect();
            repo.commit(Some("HEAD"), &signature, &signature, "commit", &tree, &parents)
                .unwrap()
                .to_string()
        }
    }

    #[test]
    fn classifies_add_modify_delete() {
        let test_repo = TestRepo::new();
        let old = test_repo.commit_files(
            &[("a.c", "int a;\n"), ("b.c", "int b;\n"), ("notes.md", "x")],
            &[],
        );
        let new = test_repo.commit_files(
            &[("a.c", "int a2;\n"), ("c.h", "int c;\n"), ("notes.md", "y")],
            &["b.c"],
        );

        let git = GitContext::open(&test_repo.repo_path).unwrap();
        let changes = git.classify_changes(&old, &new).unwrap();

        assert_eq!(changes.added, BTreeSet::from(["c.h".to_string()]));
        assert_eq!(changes.modified, BTreeSet::from(["a.c".to_string()]));
        assert_eq!(changes.deleted, BTreeSet::from(["b.c".to_string()]));
    }

    #[test]
    fn exact_rename_becomes_delete_plus_add() {
        let test_repo = TestRepo::new();
        let content = "int stable_content(void) { return 7; }\n";
        let old = test_repo.commit_files(&[("old_name.c", content)], &[]);
        let new = test_repo.commit_files(&[("new_name.c", content)], &["old_name.c"]);

        let git = GitContext::open(&test_repo.repo_path).unwrap();
        let changes = git.classify_changes(&old, &new).unwrap();

        assert_eq!(changes.deleted, BTreeSet::from(["old_name.c".to_string()]));
        assert_eq!(changes.added, BTreeSet::from(["new_name.c".to_string()]));
        assert!(changes.modified.is_empty());
    }

    #[test]
    fn non_source_files_are_filtered() {
        let test_repo = TestRepo::new();
        let old = test_repo.commit_files(&[("README.md", "a")], &[]);
        let new = test_repo.commit_files(&[("README.md", "b"), ("Makefile", "all:")], &[]);

        let git = GitContext::open(&test_repo.repo_path).unwrap();
        let changes = git.classify_changes(&old, &new).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn changed_headers_come_from_modified_and_deleted() {
        let changes = ChangedFiles {
            added: BTreeSet::from(["new.h".to_string()]),
            modified: BTreeSet::from(["shared.h".to_string(), "a.c".to_string()]),
            deleted: BTreeSet::from(["gone.h".to_string()]),
        };
        let mut headers = changes.changed_headers();
        headers.sort();
        assert_eq!(headers, vec!["gone.h".to_string(), "shared.h".to_string()]);
    }

    #[test]
    fn open_rejects_non_repositories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitContext::open(dir.path()),
            Err(UpdateError::NotARepository { .. })
        ));
    }

    #[test]
    fn head_and_dirtiness() {
        let test_repo = TestRepo::new();
        let hash = test_repo.commit_files(&[("a.c", "int a;\n")], &[]);
        let git = GitContext::open(&test_repo.repo_path).unwrap();
        assert_eq!(git.head_commit_hash().unwrap(), hash);
        assert!(!git.is_dirty());

        fs::write(test_repo.repo_path.join("scratch.c"), "int s;\n").unwrap();
        assert!(git.is_dirty());
    }
}
