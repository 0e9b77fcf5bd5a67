//! Attaches parsed body spans to function symbols.
//!
//! A span matches a symbol when name, file URI, and the name's start
//! position all agree. Unmatched functions keep a null body span and are
//! thereby excluded from containment-based caller attribution.

use crate::index::SymbolTable;
use crate::types::{BodySpan, FileFunctionSpans, SymbolId};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Body spans resolved to on-disk paths, for source snippet extraction.
#[derive(Debug, Default)]
pub struct SpanIndex {
    body_spans: HashMap<SymbolId, BodySpan>,
}

impl SpanIndex {
    pub fn body_span(&self, id: &SymbolId) -> Option<&BodySpan> {
        self.body_spans.get(id)
    }

    pub fn matched_ids(&self) -> impl Iterator<Item = &SymbolId> {
        self.body_spans.keys()
    }

    pub fn len(&self) -> usize {
        self.body_spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body_spans.is_empty()
    }

    /// Read the function's source text (whole lines of the body span).
    pub fn read_source(&self, id: &SymbolId) -> Option<String> {
        let span = self.body_spans.get(id)?;
        let content = match fs::read_to_string(&span.file_path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not read {}: {e}", span.file_path.display());
                return None;
            }
        };
        let start = span.location.start_line as usize;
        let end = span.location.end_line as usize;
        let lines: Vec<&str> = content
            .lines()
            .skip(start)
            .take(end.saturating_sub(start) + 1)
            .collect();
        if lines.is_empty() {
            return None;
        }
        Some(lines.join("\n"))
    }
}

fn uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri).ok()?.to_file_path().ok()
}

/// Set `body_location` on every function symbol with a matching span, and
/// build the [`SpanIndex`] for later source reads.
pub fn attach_spans(table: &mut SymbolTable, spans: &[FileFunctionSpans]) -> SpanIndex {
    let mut lookup: HashMap<(&str, &str, u32, u32), &crate::types::FunctionSpan> = HashMap::new();
    for file in spans {
        for span in &file.functions {
            lookup.insert(
                (
                    span.name.as_str(),
                    file.file_uri.as_str(),
                    span.name_location.start_line,
                    span.name_location.start_column,
                ),
                span,
            );
        }
    }

    let function_ids: Vec<SymbolId> = table.function_ids().to_vec();
    let mut body_spans = HashMap::new();
    let mut matched = 0usize;

    for id in function_ids {
        let Some(symbol) = table.symbols.get_mut(&id) else {
            continue;
        };
        let Some(definition) = &symbol.definition else {
            continue;
        };
        let key = (
            symbol.name.as_str(),
            definition.file_uri.as_str(),
            definition.start_line,
            definition.start_column,
        );
        let Some(span) = lookup.get(&key) else {
            continue;
        };
        let body_location = span.body_location;
        let file_path = uri_to_path(&definition.file_uri);

        symbol.body_location = Some(body_location);
        if let Some(file_path) = file_path {
            body_spans.insert(
                id.clone(),
                BodySpan {
                    file_path,
                    location: body_location,
                },
            );
        }
        matched += 1;
    }

    info!(
        "Matched {matched} of {} functions with body spans",
        table.function_count()
    );
    SpanIndex { body_spans }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::parse_str;
    use crate::types::{FunctionSpan, RelativeLocation};

    fn index_for(path: &str) -> String {
        format!(
            r#"--- !Symbol
ID: 00000000000000AA
Name: foo
SymInfo: {{ Kind: Function, Lang: C }}
Definition:
  FileURI: 'file://{path}'
  Start: {{ Line: 0, Column: 4 }}
  End: {{ Line: 0, Column: 7 }}
--- !Symbol
ID: 00000000000000BB
Name: unmatched
SymInfo: {{ Kind: Function, Lang: C }}
Definition:
  FileURI: 'file://{path}'
  Start: {{ Line: 9, Column: 4 }}
  End: {{ Line: 9, Column: 13 }}
"#
        )
    }

    fn spans_for(path: &str) -> Vec<FileFunctionSpans> {
        vec![FileFunctionSpans {
            file_uri: format!("file://{path}"),
            functions: vec![FunctionSpan {
                name: "foo".into(),
                name_location: RelativeLocation::new(0, 4, 0, 7),
                body_location: RelativeLocation::new(0, 0, 2, 1),
            }],
        }]
    }

    #[test]
    fn matching_attaches_body_and_indexes_it() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("only.c");
        std::fs::write(&source, "int foo(void) {\n    return 1;\n}\n").unwrap();
        let path = source.to_str().unwrap();

        let mut table = parse_str(&index_for(path)).unwrap();
        let index = attach_spans(&mut table, &spans_for(path));

        let foo = table.get(&SymbolId::new("00000000000000AA")).unwrap();
        assert_eq!(foo.body_location, Some(RelativeLocation::new(0, 0, 2, 1)));

        let other = table.get(&SymbolId::new("00000000000000BB")).unwrap();
        assert!(other.body_location.is_none());

        assert_eq!(index.len(), 1);
        let text = index.read_source(&SymbolId::new("00000000000000AA")).unwrap();
        assert!(text.starts_with("int foo(void)"));
        assert!(text.ends_with('}'));
    }

    #[test]
    fn position_mismatch_does_not_match() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("only.c");
        std::fs::write(&source, "int foo(void) { return 1; }\n").unwrap();
        let path = source.to_str().unwrap();

        let mut spans = spans_for(path);
        spans[0].functions[0].name_location.start_column = 5;

        let mut table = parse_str(&index_for(path)).unwrap();
        let index = attach_spans(&mut table, &spans);
        assert!(index.is_empty());
    }
}
