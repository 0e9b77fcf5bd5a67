//! End-to-end span extraction on real source text: tree-sitter parses a
//! temp C file, the matcher attaches bodies to index symbols, and the
//! containment builder attributes the call. This is the full fallback path
//! for a legacy index.

use clangraph::graph;
use clangraph::index::parse_str;
use clangraph::source::{SourceParser, TreeSitterStrategy};
use clangraph::types::SymbolId;
use std::fs;

const SOURCE: &str = "\
static int helper(int a) {
    return a + 1;
}

int main(void) {
    return helper(41);
}
";

fn index_for(uri: &str) -> String {
    // Positions mirror SOURCE: helper's identifier at (0, 11), main's at
    // (4, 4); helper is referenced at (5, 11).
    format!(
        r#"--- !Symbol
ID: 00000000000000AA
Name: helper
SymInfo: {{ Kind: Function, Lang: C }}
Definition:
  FileURI: '{uri}'
  Start: {{ Line: 0, Column: 11 }}
  End: {{ Line: 0, Column: 17 }}
--- !Symbol
ID: 00000000000000BB
Name: main
SymInfo: {{ Kind: Function, Lang: C }}
Definition:
  FileURI: '{uri}'
  Start: {{ Line: 4, Column: 4 }}
  End: {{ Line: 4, Column: 8 }}
--- !Refs
ID: 00000000000000AA
References:
  - Kind: 12
    Location:
      FileURI: '{uri}'
      Start: {{ Line: 5, Column: 11 }}
      End: {{ Line: 5, Column: 17 }}
"#
    )
}

#[test]
fn legacy_index_resolves_calls_through_parsed_spans() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.c");
    fs::write(&path, SOURCE).unwrap();
    let uri = url::Url::from_file_path(&path).unwrap().to_string();

    let mut strategy = TreeSitterStrategy::new(2);
    let parsed = strategy.parse(&[path]).unwrap();
    assert_eq!(parsed.function_spans.len(), 1);

    let mut table = parse_str(&index_for(&uri)).unwrap();
    assert!(!table.has_container_field);

    let span_index = graph::attach_spans(&mut table, &parsed.function_spans);
    assert_eq!(span_index.len(), 2);

    // The body text read back for summarization starts at the signature.
    let body = span_index
        .read_source(&SymbolId::new("00000000000000AA"))
        .unwrap();
    assert!(body.starts_with("static int helper"));

    let relations = graph::extract_calls(&table);
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].caller_name, "main");
    assert_eq!(relations[0].callee_name, "helper");
}
