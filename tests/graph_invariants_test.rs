//! Structural invariants over the rows the ingestor would write: relative
//! POSIX paths everywhere, containment parents consistent with dirname, and
//! DEFINES rows implying an in-project definition.

use clangraph::graph::PathModel;
use clangraph::index::parse_str;
use clangraph::store::build_symbol_rows;

const INDEX: &str = r#"--- !Symbol
ID: 00000000000000A1
Name: io_read
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///proj/src/core/io.c'
  Start: { Line: 12, Column: 4 }
  End: { Line: 12, Column: 11 }
CanonicalDeclaration:
  FileURI: 'file:///proj/include/io.h'
  Start: { Line: 2, Column: 4 }
  End: { Line: 2, Column: 11 }
--- !Symbol
ID: 00000000000000B2
Name: buffer
SymInfo: { Kind: Struct, Lang: C }
Definition:
  FileURI: 'file:///proj/include/io.h'
  Start: { Line: 5, Column: 7 }
  End: { Line: 5, Column: 13 }
--- !Symbol
ID: 00000000000000C3
Name: printf
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///usr/include/stdio.h'
  Start: { Line: 300, Column: 4 }
  End: { Line: 300, Column: 10 }
"#;

#[test]
fn discovered_paths_are_relative_posix_without_dotdot() {
    let table = parse_str(INDEX).unwrap();
    let paths = PathModel::new("/proj");
    let sets = paths.discover(&table);

    for path in sets.files.iter().chain(sets.folders.iter()) {
        assert!(!path.contains(".."), "path escapes the project: {path}");
        assert!(!path.contains('\\'), "non-POSIX separator: {path}");
        assert!(!path.starts_with('/'), "path is not relative: {path}");
    }
    // The external stdio.h contributes nothing.
    assert!(!sets.files.iter().any(|p| p.contains("stdio")));
}

#[test]
fn every_file_row_parent_is_its_dirname() {
    let table = parse_str(INDEX).unwrap();
    let paths = PathModel::new("/proj");
    let sets = paths.discover(&table);

    for row in paths.file_rows(&sets.files) {
        let path = row["path"].as_str().unwrap();
        let parent = row["parent_path"].as_str().unwrap();
        match path.rsplit_once('/') {
            Some((dirname, _)) => assert_eq!(parent, dirname),
            // Top-level entries hang off the PROJECT node.
            None => assert_eq!(parent, "/proj"),
        }
        // Every non-root parent appears in the folder set, so the CONTAINS
        // MATCH will find it.
        if parent != "/proj" {
            assert!(sets.folders.contains(parent));
        }
    }
}

#[test]
fn defines_rows_imply_resolvable_in_project_definitions() {
    let table = parse_str(INDEX).unwrap();
    let paths = PathModel::new("/proj");
    let sets = paths.discover(&table);
    let rows = build_symbol_rows(&table, &paths);

    assert!(!rows.defines.is_empty());
    for row in &rows.defines {
        let file_path = row["file_path"].as_str().unwrap();
        assert!(
            sets.files.contains(file_path),
            "DEFINES references a file with no FILE node: {file_path}"
        );
    }
    // The out-of-project printf yields no DEFINES row.
    assert!(
        !rows
            .defines
            .iter()
            .any(|r| r["id"] == "00000000000000C3")
    );
}

#[test]
fn node_ids_are_unique_per_label() {
    let table = parse_str(INDEX).unwrap();
    let paths = PathModel::new("/proj");
    let rows = build_symbol_rows(&table, &paths);

    let mut function_ids: Vec<&str> = rows
        .functions
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    function_ids.sort_unstable();
    let before = function_ids.len();
    function_ids.dedup();
    assert_eq!(before, function_ids.len());
}
