//! Value-level parsing of index documents.
//!
//! The index is a multi-document YAML stream where every document carries a
//! custom tag (`!Symbol`, `!Refs`, ...). Tags are informational only and are
//! stripped, leaving plain mappings. A document with `ID` and `SymInfo` is a
//! symbol; a document with `ID` and `References` is a reference set.

use crate::error::{IndexError, IndexResult};
use crate::types::{Location, Reference, Symbol, SymbolId};
use serde::Deserialize;
use serde_yml::{Mapping, Value};
use std::collections::HashMap;

/// Reference documents before they are attached to their target symbol.
#[derive(Debug, Clone)]
pub struct UnlinkedRefs {
    pub target: SymbolId,
    pub references: Vec<Reference>,
}

/// Symbols and unlinked references parsed from one chunk.
pub type ChunkOutput = (HashMap<SymbolId, Symbol>, Vec<UnlinkedRefs>);

/// Strip document tags, exposing the underlying mapping.
fn untag(value: Value) -> Value {
    match value {
        Value::Tagged(tagged) => untag(tagged.value),
        other => other,
    }
}

fn str_field(map: &Mapping, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u32_field(map: &Mapping, key: &str) -> Option<u32> {
    map.get(key).and_then(Value::as_u64).map(|v| v as u32)
}

fn point(map: &Mapping, key: &str) -> Option<(u32, u32)> {
    let p = map.get(key)?.as_mapping()?;
    Some((u32_field(p, "Line")?, u32_field(p, "Column")?))
}

fn location(value: &Value) -> Option<Location> {
    let map = value.as_mapping()?;
    let (start_line, start_column) = point(map, "Start")?;
    let (end_line, end_column) = point(map, "End")?;
    Some(Location {
        file_uri: str_field(map, "FileURI")?,
        start_line,
        start_column,
        end_line,
        end_column,
    })
}

fn reference(value: &Value) -> Option<Reference> {
    let map = value.as_mapping()?;
    // Both fields are required; partial records are dropped.
    let kind = u32_field(map, "Kind")?;
    let loc = location(map.get("Location")?)?;
    let container_id = map
        .get("Container")
        .and_then(Value::as_mapping)
        .and_then(|c| str_field(c, "ID"))
        .filter(|id| !id.is_empty())
        .map(SymbolId::new);
    Some(Reference {
        kind,
        location: loc,
        container_id,
    })
}

fn symbol(map: &Mapping) -> Option<Symbol> {
    let sym_info = map.get("SymInfo").and_then(Value::as_mapping);
    Some(Symbol {
        id: SymbolId::new(str_field(map, "ID")?),
        name: str_field(map, "Name").unwrap_or_default(),
        kind: sym_info.and_then(|s| str_field(s, "Kind")).unwrap_or_default(),
        declaration: map.get("CanonicalDeclaration").and_then(location),
        definition: map.get("Definition").and_then(location),
        references: Vec::new(),
        scope: str_field(map, "Scope").unwrap_or_default(),
        language: sym_info.and_then(|s| str_field(s, "Lang")).unwrap_or_default(),
        signature: str_field(map, "Signature").unwrap_or_default(),
        return_type: str_field(map, "ReturnType").unwrap_or_default(),
        type_name: str_field(map, "Type").unwrap_or_default(),
        body_location: None,
    })
}

/// Parse one sanitized chunk string into symbols and unlinked references.
pub fn parse_chunk(chunk_index: usize, content: &str) -> IndexResult<ChunkOutput> {
    let mut symbols = HashMap::new();
    let mut unlinked = Vec::new();

    for document in serde_yml::Deserializer::from_str(content) {
        let value = Value::deserialize(document).map_err(|e| IndexError::ChunkParse {
            chunk: chunk_index,
            reason: e.to_string(),
        })?;
        let value = untag(value);
        let Some(map) = value.as_mapping() else {
            continue;
        };

        if map.contains_key("ID") && map.contains_key("SymInfo") {
            if let Some(sym) = symbol(map) {
                // Last writer wins on id collision.
                symbols.insert(sym.id.clone(), sym);
            }
        } else if let (Some(id), Some(refs)) = (str_field(map, "ID"), map.get("References")) {
            let references = refs
                .as_sequence()
                .map(|seq| seq.iter().filter_map(reference).collect())
                .unwrap_or_default();
            unlinked.push(UnlinkedRefs {
                target: SymbolId::new(id),
                references,
            });
        }
    }

    Ok((symbols, unlinked))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYMBOL_DOC: &str = r#"--- !Symbol
ID: 4FE9A04DAD0B7521
Name: foo
Scope: ''
SymInfo:
  Kind: Function
  Lang: C
CanonicalDeclaration:
  FileURI: 'file:///proj/src/only.h'
  Start: { Line: 3, Column: 4 }
  End: { Line: 3, Column: 7 }
Definition:
  FileURI: 'file:///proj/src/only.c'
  Start: { Line: 10, Column: 4 }
  End: { Line: 10, Column: 7 }
Signature: '()'
ReturnType: int
Type: 'int ()'
"#;

    const REFS_DOC: &str = r#"--- !Refs
ID: 4FE9A04DAD0B7521
References:
  - Kind: 28
    Location:
      FileURI: 'file:///proj/src/only.c'
      Start: { Line: 22, Column: 8 }
      End: { Line: 22, Column: 11 }
    Container:
      ID: AA00BB11CC22DD33
  - Kind: 4
    Location:
      FileURI: 'file:///proj/src/other.c'
      Start: { Line: 5, Column: 0 }
      End: { Line: 5, Column: 3 }
"#;

    #[test]
    fn parses_tagged_symbol_document() {
        let (symbols, unlinked) = parse_chunk(0, SYMBOL_DOC).unwrap();
        assert!(unlinked.is_empty());
        let sym = &symbols[&SymbolId::new("4FE9A04DAD0B7521")];
        assert_eq!(sym.name, "foo");
        assert_eq!(sym.kind, "Function");
        assert_eq!(sym.language, "C");
        assert_eq!(sym.return_type, "int");
        let def = sym.definition.as_ref().unwrap();
        assert_eq!(def.file_uri, "file:///proj/src/only.c");
        assert_eq!(def.start_line, 10);
        assert_eq!(def.start_column, 4);
        assert!(sym.declaration.is_some());
    }

    #[test]
    fn parses_reference_document() {
        let (symbols, unlinked) = parse_chunk(0, REFS_DOC).unwrap();
        assert!(symbols.is_empty());
        assert_eq!(unlinked.len(), 1);
        let refs = &unlinked[0];
        assert_eq!(refs.target.as_str(), "4FE9A04DAD0B7521");
        assert_eq!(refs.references.len(), 2);
        assert_eq!(refs.references[0].kind, 28);
        assert_eq!(
            refs.references[0].container_id.as_ref().unwrap().as_str(),
            "AA00BB11CC22DD33"
        );
        assert!(refs.references[1].container_id.is_none());
    }

    #[test]
    fn incomplete_references_are_dropped() {
        let doc = "--- !Refs\nID: AB\nReferences:\n  - Kind: 4\n";
        let (_, unlinked) = parse_chunk(0, doc).unwrap();
        assert_eq!(unlinked.len(), 1);
        assert!(unlinked[0].references.is_empty());
    }

    #[test]
    fn multi_document_chunk() {
        let content = format!("{SYMBOL_DOC}{REFS_DOC}");
        let (symbols, unlinked) = parse_chunk(0, &content).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(unlinked.len(), 1);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = parse_chunk(3, "--- !Symbol\nID: [unclosed\n").unwrap_err();
        assert!(err.to_string().contains("chunk 3"));
    }
}
