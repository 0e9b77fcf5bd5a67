//! INCLUDES edges: materialization and reverse-impact queries.
//!
//! Edges are stored with project-relative endpoints; pairs where either
//! side escapes the project are dropped before ingestion. The impact query
//! walks `INCLUDES*` backwards from a changed header to every file that
//! transitively includes it.

use super::database::GraphDatabase;
use crate::error::StoreResult;
use crate::graph::PathModel;
use crate::types::IncludeRelation;
use neo4rs::query;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use tracing::info;

const IMPACTED_QUERY: &str = "\
MATCH (f:FILE)-[:INCLUDES*]->(:FILE {path: $header_path})
RETURN DISTINCT f.path AS path";

/// Convert absolute include pairs to project-relative relations, dropping
/// pairs that leave the project.
pub fn relative_relations(
    relations: &BTreeSet<(PathBuf, PathBuf)>,
    paths: &PathModel,
) -> Vec<IncludeRelation> {
    let mut result: Vec<IncludeRelation> = relations
        .iter()
        .filter_map(|(including, included)| {
            Some(IncludeRelation {
                including_path: paths.relative_posix(including)?,
                included_path: paths.relative_posix(included)?,
            })
        })
        .collect();
    result.sort();
    result.dedup();
    result
}

/// Edge rows for the ingestor.
pub fn include_rows(relations: &[IncludeRelation]) -> Vec<Value> {
    relations
        .iter()
        .map(|r| {
            json!({
                "including_path": r.including_path,
                "included_path": r.included_path,
            })
        })
        .collect()
}

/// Every relative file path touched by the relations (both endpoints).
/// Used so include-only files still get FILE nodes and CONTAINS parents.
pub fn endpoint_paths(relations: &[IncludeRelation]) -> BTreeSet<String> {
    relations
        .iter()
        .flat_map(|r| [r.including_path.clone(), r.included_path.clone()])
        .collect()
}

/// Project-relative paths of every file that transitively includes one of
/// the given headers, per the materialized graph.
pub fn impacted_files(
    db: &GraphDatabase,
    header_paths: &[String],
) -> StoreResult<BTreeSet<String>> {
    let mut impacted = BTreeSet::new();
    let mut seen = HashSet::new();
    for header in header_paths {
        if !seen.insert(header) {
            continue;
        }
        let files = db.string_column(
            query(IMPACTED_QUERY).param("header_path", header.as_str()),
            "path",
        )?;
        impacted.extend(files);
    }
    info!(
        "Found {} files impacted by {} changed headers",
        impacted.len(),
        header_paths.len()
    );
    Ok(impacted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abs(pairs: &[(&str, &str)]) -> BTreeSet<(PathBuf, PathBuf)> {
        pairs
            .iter()
            .map(|(a, b)| (PathBuf::from(a), PathBuf::from(b)))
            .collect()
    }

    #[test]
    fn external_endpoints_are_dropped() {
        let paths = PathModel::new("/proj");
        let relations = abs(&[
            ("/proj/src/a.c", "/proj/include/shared.h"),
            ("/proj/src/a.c", "/usr/include/stdio.h"),
            ("/other/b.c", "/proj/include/shared.h"),
        ]);

        let relative = relative_relations(&relations, &paths);
        assert_eq!(relative.len(), 1);
        assert_eq!(relative[0].including_path, "src/a.c");
        assert_eq!(relative[0].included_path, "include/shared.h");
    }

    #[test]
    fn rows_and_endpoints() {
        let relations = vec![IncludeRelation {
            including_path: "src/a.c".into(),
            included_path: "include/shared.h".into(),
        }];
        let rows = include_rows(&relations);
        assert_eq!(rows[0]["including_path"], "src/a.c");
        assert_eq!(rows[0]["included_path"], "include/shared.h");

        let endpoints = endpoint_paths(&relations);
        assert_eq!(
            endpoints,
            BTreeSet::from(["src/a.c".to_string(), "include/shared.h".to_string()])
        );
    }

    #[test]
    fn impact_query_walks_reverse_transitively() {
        assert!(IMPACTED_QUERY.contains("[:INCLUDES*]"));
        assert!(IMPACTED_QUERY.contains("DISTINCT"));
    }
}
