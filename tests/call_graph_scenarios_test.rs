//! Acceptance scenarios for call-graph extraction: the container-aware path
//! and the containment fallback must attribute the same minimal index the
//! same way.

use clangraph::graph;
use clangraph::index::parse_str;
use clangraph::types::{FileFunctionSpans, FunctionSpan, RelativeLocation, SymbolId};

/// Two functions in src/only.c; bar's reference list carries one call with
/// container A and kind 28.
const CONTAINER_AWARE_INDEX: &str = r#"--- !Symbol
ID: 000000000000000A
Name: foo
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///proj/src/only.c'
  Start: { Line: 10, Column: 4 }
  End: { Line: 10, Column: 7 }
--- !Symbol
ID: 000000000000000B
Name: bar
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///proj/src/only.c'
  Start: { Line: 30, Column: 4 }
  End: { Line: 30, Column: 7 }
--- !Refs
ID: 000000000000000B
References:
  - Kind: 28
    Location:
      FileURI: 'file:///proj/src/only.c'
      Start: { Line: 15, Column: 8 }
      End: { Line: 15, Column: 11 }
    Container:
      ID: 000000000000000A
"#;

/// The same index with containers stripped and legacy kind 12.
const LEGACY_INDEX: &str = r#"--- !Symbol
ID: 000000000000000A
Name: foo
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///proj/src/only.c'
  Start: { Line: 10, Column: 4 }
  End: { Line: 10, Column: 7 }
--- !Symbol
ID: 000000000000000B
Name: bar
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///proj/src/only.c'
  Start: { Line: 30, Column: 4 }
  End: { Line: 30, Column: 7 }
--- !Refs
ID: 000000000000000B
References:
  - Kind: 12
    Location:
      FileURI: 'file:///proj/src/only.c'
      Start: { Line: 15, Column: 8 }
      End: { Line: 15, Column: 11 }
"#;

fn spans_with_foo_body() -> Vec<FileFunctionSpans> {
    vec![FileFunctionSpans {
        file_uri: "file:///proj/src/only.c".into(),
        functions: vec![FunctionSpan {
            name: "foo".into(),
            name_location: RelativeLocation::new(10, 4, 10, 7),
            body_location: RelativeLocation::new(10, 0, 20, 1),
        }],
    }]
}

#[test]
fn minimal_single_file_container_aware() {
    let table = parse_str(CONTAINER_AWARE_INDEX).unwrap();
    assert!(table.has_container_field);
    assert!(table.has_call_kind);

    let relations = graph::extract_calls(&table);
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].caller_id, SymbolId::new("000000000000000A"));
    assert_eq!(relations[0].callee_id, SymbolId::new("000000000000000B"));
}

#[test]
fn containment_fallback_matches_container_result() {
    let mut table = parse_str(LEGACY_INDEX).unwrap();
    assert!(!table.has_container_field);
    assert!(!table.has_call_kind);

    // Span matching attaches foo's body covering lines 10..20; the call
    // reference at line 15 must land in it.
    let span_index = graph::attach_spans(&mut table, &spans_with_foo_body());
    assert_eq!(span_index.len(), 1);

    let relations = graph::extract_calls(&table);
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].caller_id, SymbolId::new("000000000000000A"));
    assert_eq!(relations[0].callee_id, SymbolId::new("000000000000000B"));
    assert_eq!(relations[0].call_location.start_line, 15);
}

#[test]
fn containment_emits_nothing_without_spans() {
    let table = parse_str(LEGACY_INDEX).unwrap();
    assert!(graph::extract_calls(&table).is_empty());
}

#[test]
fn reference_ending_exactly_at_body_end_is_attributed() {
    let mut table = parse_str(LEGACY_INDEX).unwrap();
    // Move the reference so it ends exactly at the body end (20, 1).
    {
        let bar = table
            .symbols
            .get_mut(&SymbolId::new("000000000000000B"))
            .unwrap();
        let location = &mut bar.references[0].location;
        location.start_line = 20;
        location.start_column = 0;
        location.end_line = 20;
        location.end_column = 1;
    }
    graph::attach_spans(&mut table, &spans_with_foo_body());

    let relations = graph::extract_calls(&table);
    assert_eq!(relations.len(), 1, "end-inclusive boundary must count as inside");
}

#[test]
fn both_algorithms_emit_self_calls() {
    let index = r#"--- !Symbol
ID: 000000000000000A
Name: spin
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///proj/src/only.c'
  Start: { Line: 10, Column: 4 }
  End: { Line: 10, Column: 8 }
--- !Refs
ID: 000000000000000A
References:
  - Kind: 28
    Location:
      FileURI: 'file:///proj/src/only.c'
      Start: { Line: 15, Column: 8 }
      End: { Line: 15, Column: 12 }
    Container:
      ID: 000000000000000A
"#;
    let table = parse_str(index).unwrap();
    let relations = graph::extract_calls(&table);
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].caller_id, relations[0].callee_id);

    let stats = graph::call_statistics(&table, &relations);
    assert_eq!(stats.recursive_calls, 1);
}
