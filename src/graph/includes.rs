//! In-memory include impact analysis.
//!
//! Given raw `(including, included)` pairs and a set of seed headers,
//! computes the source files that transitively include each header by a
//! reverse BFS. Include graphs can be cyclic, so the walk tracks visited
//! nodes.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

const SOURCE_EXTENSIONS: [&str; 4] = ["c", "cpp", "cc", "cxx"];

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
}

/// For each header, the sorted set of source files that reach it through
/// the reverse include graph.
pub fn impacted_sources(
    relations: &BTreeSet<(PathBuf, PathBuf)>,
    headers: &[PathBuf],
) -> HashMap<PathBuf, Vec<PathBuf>> {
    let mut reverse: HashMap<&Path, Vec<&Path>> = HashMap::new();
    for (including, included) in relations {
        reverse.entry(included.as_path()).or_default().push(including.as_path());
    }

    let mut results = HashMap::new();
    for header in headers {
        let mut impacted: BTreeSet<&Path> = BTreeSet::new();
        let mut visited: HashSet<&Path> = HashSet::from([header.as_path()]);
        let mut queue: VecDeque<&Path> = VecDeque::from([header.as_path()]);

        while let Some(current) = queue.pop_front() {
            for &dependent in reverse.get(current).into_iter().flatten() {
                if visited.insert(dependent) {
                    impacted.insert(dependent);
                    queue.push_back(dependent);
                }
            }
        }

        let sources: Vec<PathBuf> = impacted
            .into_iter()
            .filter(|p| is_source_file(p))
            .map(Path::to_path_buf)
            .collect();
        results.insert(header.clone(), sources);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn relations(pairs: &[(&str, &str)]) -> BTreeSet<(PathBuf, PathBuf)> {
        pairs.iter().map(|(a, b)| (p(a), p(b))).collect()
    }

    #[test]
    fn transitive_impact_reaches_through_headers() {
        // a.c -> util.h -> shared.h ; b.c -> shared.h
        let rels = relations(&[
            ("/p/a.c", "/p/util.h"),
            ("/p/util.h", "/p/shared.h"),
            ("/p/b.c", "/p/shared.h"),
        ]);
        let results = impacted_sources(&rels, &[p("/p/shared.h")]);
        assert_eq!(
            results[&p("/p/shared.h")],
            vec![p("/p/a.c"), p("/p/b.c")]
        );
    }

    #[test]
    fn intermediate_headers_are_walked_but_not_reported() {
        let rels = relations(&[("/p/a.c", "/p/util.h"), ("/p/util.h", "/p/shared.h")]);
        let results = impacted_sources(&rels, &[p("/p/shared.h")]);
        // util.h is reached but filtered out of the report.
        assert_eq!(results[&p("/p/shared.h")], vec![p("/p/a.c")]);
    }

    #[test]
    fn cyclic_includes_terminate() {
        let rels = relations(&[
            ("/p/x.h", "/p/y.h"),
            ("/p/y.h", "/p/x.h"),
            ("/p/main.c", "/p/x.h"),
        ]);
        let results = impacted_sources(&rels, &[p("/p/y.h")]);
        assert_eq!(results[&p("/p/y.h")], vec![p("/p/main.c")]);
    }

    #[test]
    fn unknown_header_yields_empty_set() {
        let rels = relations(&[("/p/a.c", "/p/util.h")]);
        let results = impacted_sources(&rels, &[p("/p/nothere.h")]);
        assert!(results[&p("/p/nothere.h")].is_empty());
    }

    #[test]
    fn cpp_sources_count_as_sources() {
        let rels = relations(&[
            ("/p/a.cpp", "/p/s.h"),
            ("/p/b.cc", "/p/s.h"),
            ("/p/c.cxx", "/p/s.h"),
            ("/p/d.txt", "/p/s.h"),
        ]);
        let results = impacted_sources(&rels, &[p("/p/s.h")]);
        assert_eq!(
            results[&p("/p/s.h")],
            vec![p("/p/a.cpp"), p("/p/b.cc"), p("/p/c.cxx")]
        );
    }
}
