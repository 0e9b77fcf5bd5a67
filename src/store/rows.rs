//! Pure row builders for node and edge upserts.
//!
//! Absent properties are omitted rather than set to null, so `SET n += row`
//! never clears an existing value.

use crate::graph::PathModel;
use crate::index::SymbolTable;
use crate::types::{CallRelation, Symbol};
use serde_json::{Map, Value, json};

/// Node and DEFINES rows derived from a symbol table.
#[derive(Debug, Default)]
pub struct SymbolRows {
    pub functions: Vec<Value>,
    pub data_structures: Vec<Value>,
    pub defines: Vec<Value>,
}

/// Row for one symbol node, or `None` when the symbol cannot be
/// represented (no id or kind).
pub fn symbol_row(symbol: &Symbol, paths: &PathModel) -> Option<Value> {
    if symbol.id.as_str().is_empty() || symbol.kind.is_empty() {
        return None;
    }

    let mut row = Map::new();
    row.insert("id".into(), json!(symbol.id.as_str()));
    row.insert("name".into(), json!(symbol.name));
    row.insert("kind".into(), json!(symbol.kind));
    row.insert("scope".into(), json!(symbol.scope));
    row.insert("language".into(), json!(symbol.language));
    row.insert("has_definition".into(), json!(symbol.definition.is_some()));

    if symbol.is_function() {
        row.insert("signature".into(), json!(symbol.signature));
        row.insert("return_type".into(), json!(symbol.return_type));
        row.insert("type".into(), json!(symbol.type_name));

        if let Some(primary) = symbol.definition.as_ref().or(symbol.declaration.as_ref()) {
            let path = match paths.uri_to_relative(&primary.file_uri) {
                Some(relative) => relative,
                // Out-of-project functions keep their absolute path.
                None => PathModel::uri_to_abs_path(&primary.file_uri)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|| primary.file_uri.clone()),
            };
            row.insert("path".into(), json!(path));
            row.insert(
                "location".into(),
                json!([primary.start_line, primary.start_column]),
            );
        }
    }

    if let Some(definition) = &symbol.definition {
        if let Some(relative) = paths.uri_to_relative(&definition.file_uri) {
            row.insert("file_path".into(), json!(relative));
        }
    }

    Some(Value::Object(row))
}

/// Split a table into FUNCTION rows, DATA_STRUCTURE rows, and the DEFINES
/// rows for every symbol defined inside the project.
pub fn build_symbol_rows(table: &SymbolTable, paths: &PathModel) -> SymbolRows {
    let mut rows = SymbolRows::default();
    for symbol in table.symbols.values() {
        let is_function = symbol.is_function();
        if !is_function && !symbol.is_data_structure() {
            continue;
        }
        let Some(row) = symbol_row(symbol, paths) else {
            continue;
        };
        if row.get("file_path").is_some() {
            rows.defines.push(json!({
                "id": row["id"],
                "file_path": row["file_path"],
            }));
        }
        if is_function {
            rows.functions.push(row);
        } else {
            rows.data_structures.push(row);
        }
    }
    rows
}

/// Rows for CALLS edge merges.
pub fn call_rows(relations: &[CallRelation]) -> Vec<Value> {
    relations
        .iter()
        .map(|r| {
            json!({
                "caller_id": r.caller_id.as_str(),
                "callee_id": r.callee_id.as_str(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::parse_str;

    const INDEX: &str = r#"--- !Symbol
ID: 00000000000000AA
Name: io_read
Scope: ''
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///proj/src/io.c'
  Start: { Line: 12, Column: 4 }
  End: { Line: 12, Column: 11 }
Signature: '(int fd)'
ReturnType: int
Type: 'int (int)'
--- !Symbol
ID: 00000000000000BB
Name: point
SymInfo: { Kind: Struct, Lang: C }
Definition:
  FileURI: 'file:///proj/include/point.h'
  Start: { Line: 1, Column: 7 }
  End: { Line: 1, Column: 12 }
--- !Symbol
ID: 00000000000000CC
Name: extern_fn
SymInfo: { Kind: Function, Lang: C }
Definition:
  FileURI: 'file:///usr/lib/ext.c'
  Start: { Line: 3, Column: 4 }
  End: { Line: 3, Column: 13 }
--- !Symbol
ID: 00000000000000DD
Name: counter
SymInfo: { Kind: Variable, Lang: C }
Definition:
  FileURI: 'file:///proj/src/io.c'
  Start: { Line: 2, Column: 4 }
  End: { Line: 2, Column: 11 }
"#;

    #[test]
    fn function_rows_carry_signature_and_location() {
        let table = parse_str(INDEX).unwrap();
        let rows = build_symbol_rows(&table, &PathModel::new("/proj"));

        assert_eq!(rows.functions.len(), 2);
        assert_eq!(rows.data_structures.len(), 1);

        let io = rows
            .functions
            .iter()
            .find(|r| r["name"] == "io_read")
            .unwrap();
        assert_eq!(io["kind"], "Function");
        assert_eq!(io["signature"], "(int fd)");
        assert_eq!(io["return_type"], "int");
        assert_eq!(io["type"], "int (int)");
        assert_eq!(io["path"], "src/io.c");
        assert_eq!(io["file_path"], "src/io.c");
        assert_eq!(io["location"], json!([12, 4]));
        assert_eq!(io["has_definition"], json!(true));
    }

    #[test]
    fn out_of_project_definition_keeps_absolute_path_without_defines() {
        let table = parse_str(INDEX).unwrap();
        let rows = build_symbol_rows(&table, &PathModel::new("/proj"));

        let ext = rows
            .functions
            .iter()
            .find(|r| r["name"] == "extern_fn")
            .unwrap();
        assert_eq!(ext["path"], "/usr/lib/ext.c");
        assert!(ext.get("file_path").is_none());
    }

    #[test]
    fn defines_rows_cover_functions_and_data_structures_only() {
        let table = parse_str(INDEX).unwrap();
        let rows = build_symbol_rows(&table, &PathModel::new("/proj"));

        // io_read and point are in-project; extern_fn is not; the variable
        // never gets a node at all.
        assert_eq!(rows.defines.len(), 2);
        let paths: Vec<&str> = rows
            .defines
            .iter()
            .map(|r| r["file_path"].as_str().unwrap())
            .collect();
        assert!(paths.contains(&"src/io.c"));
        assert!(paths.contains(&"include/point.h"));
    }

    #[test]
    fn data_structure_rows_have_no_function_extras() {
        let table = parse_str(INDEX).unwrap();
        let rows = build_symbol_rows(&table, &PathModel::new("/proj"));
        let point = &rows.data_structures[0];
        assert_eq!(point["kind"], "Struct");
        assert!(point.get("signature").is_none());
        assert!(point.get("location").is_none());
    }
}
