//! Core data model shared across the pipeline.
//!
//! All line and column numbers are zero-based throughout the crate, matching
//! the clangd index format. Absolute locations carry a `file://` URI;
//! relative locations are intra-file body spans.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable, opaque symbol identifier (hex string from the indexer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(Box<str>);

/// Container id reserved by the indexer for "no enclosing function".
pub const NULL_CONTAINER: &str = "0000000000000000";

impl SymbolId {
    pub fn new(id: impl Into<Box<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the all-zero sentinel used by reference containers.
    pub fn is_null(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b == b'0')
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SymbolId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Absolute source location: file URI plus a zero-based span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file_uri: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Location {
    pub fn start(&self) -> (u32, u32) {
        (self.start_line, self.start_column)
    }

    pub fn end(&self) -> (u32, u32) {
        (self.end_line, self.end_column)
    }
}

/// Intra-file span without a URI, used for function bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeLocation {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl RelativeLocation {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Containment test for call-site attribution: start-strict,
    /// end-inclusive, under lexicographic `(line, column)` order.
    ///
    /// A reference beginning exactly at the body start is outside (the body
    /// span opens with the return type, where no reference can occur); a
    /// reference ending exactly at the closing brace column is inside.
    pub fn contains_call(&self, call: &Location) -> bool {
        call.start() > (self.start_line, self.start_column)
            && call.end() <= (self.end_line, self.end_column)
    }
}

bitflags! {
    /// Reference kind bitmask from the index.
    ///
    /// Older indexes stop at `SPELLED`; the presence of the `CALL` bit on
    /// any reference marks the index as call-kind-aware.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RefKind: u32 {
        const DECLARATION = 1;
        const DEFINITION = 2;
        const REFERENCE = 4;
        const SPELLED = 8;
        const CALL = 16;
    }
}

impl RefKind {
    /// Raw kinds that denote a call site in a call-kind-aware index.
    pub const CALL_KINDS: [u32; 2] = [20, 28];
    /// Raw kinds accepted as potential call sites in a legacy index.
    pub const LEGACY_KINDS: [u32; 2] = [4, 12];
}

/// One occurrence of a symbol's name in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: u32,
    pub location: Location,
    pub container_id: Option<SymbolId>,
}

impl Reference {
    /// Container id, unless absent or the all-zero sentinel.
    pub fn container(&self) -> Option<&SymbolId> {
        self.container_id.as_ref().filter(|id| !id.is_null())
    }
}

/// A uniquely identified program entity from the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: String,
    pub declaration: Option<Location>,
    pub definition: Option<Location>,
    pub references: Vec<Reference>,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub return_type: String,
    #[serde(default)]
    pub type_name: String,
    /// Attached post-hoc by the span matcher; `None` excludes the symbol
    /// from containment-based caller attribution.
    #[serde(default)]
    pub body_location: Option<RelativeLocation>,
}

impl Symbol {
    pub fn is_function(&self) -> bool {
        self.kind == "Function"
    }

    pub fn is_data_structure(&self) -> bool {
        matches!(self.kind.as_str(), "Struct" | "Class" | "Union" | "Enum")
    }
}

/// Per-file function span produced by a source parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpan {
    pub name: String,
    pub name_location: RelativeLocation,
    pub body_location: RelativeLocation,
}

/// All function spans found in one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFunctionSpans {
    pub file_uri: String,
    pub functions: Vec<FunctionSpan>,
}

/// A resolved `(caller, callee)` pair with the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRelation {
    pub caller_id: SymbolId,
    pub caller_name: String,
    pub callee_id: SymbolId,
    pub callee_name: String,
    pub call_location: Location,
}

/// A textual inclusion edge, project-relative with POSIX separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IncludeRelation {
    pub including_path: String,
    pub included_path: String,
}

/// Body span resolved to an on-disk path, for source snippet extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySpan {
    pub file_path: PathBuf,
    pub location: RelativeLocation,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(sl: u32, sc: u32, el: u32, ec: u32) -> Location {
        Location {
            file_uri: "file:///p/a.c".into(),
            start_line: sl,
            start_column: sc,
            end_line: el,
            end_column: ec,
        }
    }

    #[test]
    fn symbol_id_null_sentinel() {
        assert!(SymbolId::new(NULL_CONTAINER).is_null());
        assert!(!SymbolId::new("0000000000000001").is_null());
        assert!(!SymbolId::new("CAFEBABE01234567").is_null());
    }

    #[test]
    fn reference_container_filters_sentinel() {
        let mut r = Reference {
            kind: 20,
            location: loc(1, 0, 1, 3),
            container_id: Some(SymbolId::new(NULL_CONTAINER)),
        };
        assert!(r.container().is_none());
        r.container_id = Some(SymbolId::new("AB12"));
        assert_eq!(r.container().unwrap().as_str(), "AB12");
        r.container_id = None;
        assert!(r.container().is_none());
    }

    #[test]
    fn containment_is_start_strict() {
        let body = RelativeLocation::new(10, 0, 20, 1);
        // A reference exactly at the body start is not inside.
        assert!(!body.contains_call(&loc(10, 0, 10, 3)));
        // One column later is.
        assert!(body.contains_call(&loc(10, 1, 10, 4)));
        assert!(body.contains_call(&loc(15, 4, 15, 9)));
    }

    #[test]
    fn containment_is_end_inclusive() {
        let body = RelativeLocation::new(10, 0, 20, 1);
        // Ending exactly at body.end counts as inside.
        assert!(body.contains_call(&loc(20, 0, 20, 1)));
        // One past the end does not.
        assert!(!body.contains_call(&loc(20, 0, 20, 2)));
        assert!(!body.contains_call(&loc(21, 0, 21, 4)));
    }

    #[test]
    fn ref_kind_bits() {
        assert_eq!(RefKind::REFERENCE.bits() | RefKind::CALL.bits(), 20);
        assert_eq!(
            RefKind::REFERENCE.bits() | RefKind::SPELLED.bits() | RefKind::CALL.bits(),
            28
        );
    }

    #[test]
    fn data_structure_kinds() {
        let mut s = Symbol {
            id: SymbolId::new("01"),
            name: "point".into(),
            kind: "Struct".into(),
            declaration: None,
            definition: None,
            references: Vec::new(),
            scope: String::new(),
            language: String::new(),
            signature: String::new(),
            return_type: String::new(),
            type_name: String::new(),
            body_location: None,
        };
        assert!(s.is_data_structure());
        s.kind = "Union".into();
        assert!(s.is_data_structure());
        s.kind = "Variable".into();
        assert!(!s.is_data_structure());
    }
}
