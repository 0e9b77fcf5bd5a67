//! Cache for parsed source data (spans and include relations).
//!
//! The cache file is `parser_cache_<project>.pkl`. When the project is a
//! clean git work tree the cache is keyed by commit hash; otherwise every
//! source file's mtime is compared against the cache mtime.

use super::{ParsedSources, scan_source_files};
use crate::types::FileFunctionSpans;
use git2::Repository;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
enum CacheTag {
    Git { commit_hash: String },
    Mtime,
}

#[derive(Serialize, Deserialize)]
struct CachePayload {
    version: u32,
    tag: CacheTag,
    function_spans: Vec<FileFunctionSpans>,
    include_relations: Vec<(PathBuf, PathBuf)>,
}

pub struct ParserCache {
    folder: PathBuf,
    cache_path: PathBuf,
}

/// Repository containing `folder`, if any.
fn discover_repo(folder: &Path) -> Option<Repository> {
    let repo = Repository::discover(folder).ok()?;
    let workdir = repo.workdir()?.to_path_buf();
    folder.canonicalize().ok()?.starts_with(&workdir).then_some(repo)
}

fn head_commit_hash(repo: &Repository) -> Option<String> {
    Some(repo.head().ok()?.peel_to_commit().ok()?.id().to_string())
}

fn is_clean(repo: &Repository) -> bool {
    let mut options = git2::StatusOptions::new();
    options.include_untracked(true);
    repo.statuses(Some(&mut options))
        .map(|s| s.is_empty())
        .unwrap_or(false)
}

impl ParserCache {
    pub fn new(folder: &Path, cache_spec: Option<&Path>) -> Self {
        let base_name = folder
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project")
            .to_string();
        let cache_path = match cache_spec {
            None => PathBuf::from(format!("parser_cache_{base_name}.pkl")),
            Some(spec) if spec.is_dir() => spec.join(format!("parser_cache_{base_name}.pkl")),
            Some(spec) => spec.with_extension("parser_cache.pkl"),
        };
        Self {
            folder: folder.to_path_buf(),
            cache_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    /// Load the cache when it is present and still valid.
    pub fn load_if_valid(&self) -> Option<ParsedSources> {
        let bytes = fs::read(&self.cache_path).ok()?;
        let payload: CachePayload = match bincode::deserialize(&bytes) {
            Ok(p) => p,
            Err(_) => {
                warn!("Parser cache {} is corrupted; ignoring", self.cache_path.display());
                return None;
            }
        };
        if payload.version != CACHE_VERSION {
            return None;
        }

        let repo = discover_repo(&self.folder);
        let valid = match (&payload.tag, &repo) {
            (CacheTag::Git { commit_hash }, Some(repo)) if is_clean(repo) => {
                head_commit_hash(repo).as_deref() == Some(commit_hash.as_str())
            }
            _ => self.mtimes_older_than_cache(),
        };
        if !valid {
            return None;
        }

        info!("Parser cache {} is valid", self.cache_path.display());
        Some(ParsedSources {
            function_spans: payload.function_spans,
            include_relations: payload.include_relations.into_iter().collect(),
        })
    }

    fn mtimes_older_than_cache(&self) -> bool {
        let Ok(cache_mtime) = fs::metadata(&self.cache_path).and_then(|m| m.modified()) else {
            return false;
        };
        for file in scan_source_files(&self.folder) {
            match fs::metadata(&file).and_then(|m| m.modified()) {
                Ok(mtime) if mtime <= cache_mtime => {}
                _ => {
                    info!("Parser cache stale: {} is newer", file.display());
                    return false;
                }
            }
        }
        true
    }

    pub fn save(&self, parsed: &ParsedSources) {
        let tag = match discover_repo(&self.folder) {
            Some(repo) if is_clean(&repo) => match head_commit_hash(&repo) {
                Some(commit_hash) => CacheTag::Git { commit_hash },
                None => CacheTag::Mtime,
            },
            _ => CacheTag::Mtime,
        };
        let payload = CachePayload {
            version: CACHE_VERSION,
            tag,
            function_spans: parsed.function_spans.clone(),
            include_relations: parsed.include_relations.iter().cloned().collect(),
        };
        match bincode::serialize(&payload) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&self.cache_path, bytes) {
                    warn!("Could not write parser cache {}: {e}", self.cache_path.display());
                } else {
                    info!("Saved parser cache {}", self.cache_path.display());
                }
            }
            Err(e) => warn!("Could not serialize parser cache: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FunctionSpan, RelativeLocation};
    use std::collections::BTreeSet;

    fn sample_parsed() -> ParsedSources {
        ParsedSources {
            function_spans: vec![FileFunctionSpans {
                file_uri: "file:///proj/a.c".into(),
                functions: vec![FunctionSpan {
                    name: "foo".into(),
                    name_location: RelativeLocation::new(0, 4, 0, 7),
                    body_location: RelativeLocation::new(0, 0, 2, 1),
                }],
            }],
            include_relations: BTreeSet::from([(
                PathBuf::from("/proj/a.c"),
                PathBuf::from("/proj/a.h"),
            )]),
        }
    }

    #[test]
    fn mtime_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.c"), "int foo(void) { return 1; }\n").unwrap();
        let cache_path = dir.path().join("cache");
        std::fs::create_dir(&cache_path).unwrap();

        let cache = ParserCache::new(dir.path(), Some(&cache_path));
        assert!(cache.load_if_valid().is_none());

        let parsed = sample_parsed();
        cache.save(&parsed);
        let loaded = cache.load_if_valid().expect("cache should be valid");
        assert_eq!(loaded.function_spans, parsed.function_spans);
        assert_eq!(loaded.include_relations, parsed.include_relations);
    }

    #[test]
    fn modified_source_invalidates_mtime_cache() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.c");
        std::fs::write(&source, "int foo(void) { return 1; }\n").unwrap();
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir(&cache_dir).unwrap();

        let cache = ParserCache::new(dir.path(), Some(&cache_dir));
        cache.save(&sample_parsed());

        // Push the source mtime past the cache mtime.
        let future = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::open(&source).unwrap().set_modified(future).unwrap();

        assert!(cache.load_if_valid().is_none());
    }

    #[test]
    fn corrupted_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParserCache::new(dir.path(), Some(dir.path()));
        std::fs::write(cache.path(), b"garbage").unwrap();
        assert!(cache.load_if_valid().is_none());
    }
}
