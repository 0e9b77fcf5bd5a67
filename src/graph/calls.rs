//! Derives `(caller, callee)` pairs from symbol references.
//!
//! Two algorithms, selected by index capability. Container-aware indexes
//! name the enclosing function of each call site directly. Older indexes
//! fall back to spatial containment of call-site locations within function
//! bodies parsed from source.

use crate::index::SymbolTable;
use crate::types::{CallRelation, RefKind, RelativeLocation, Symbol};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// Extract call relationships, choosing the algorithm by index capability.
pub fn extract(table: &SymbolTable) -> Vec<CallRelation> {
    if table.has_container_field {
        info!("Extracting call relationships via reference containers");
        extract_with_containers(table)
    } else {
        info!("Extracting call relationships via body-span containment");
        extract_with_containment(table)
    }
}

fn extract_with_containers(table: &SymbolTable) -> Vec<CallRelation> {
    let mut relations = Vec::new();

    for callee in table.symbols.values() {
        if !callee.is_function() || callee.references.is_empty() {
            continue;
        }
        for reference in &callee.references {
            if !RefKind::CALL_KINDS.contains(&reference.kind) {
                continue;
            }
            let Some(container_id) = reference.container() else {
                continue;
            };
            let Some(caller) = table.get(container_id) else {
                continue;
            };
            if !caller.is_function() {
                continue;
            }
            relations.push(CallRelation {
                caller_id: caller.id.clone(),
                caller_name: caller.name.clone(),
                callee_id: callee.id.clone(),
                callee_name: callee.name.clone(),
                call_location: reference.location.clone(),
            });
        }
    }

    info!("Extracted {} call relationships", relations.len());
    relations
}

/// Per-file lists of function bodies, sorted by start line so the first
/// containing body wins (inner bodies sort first for nested definitions).
fn build_spatial_index(table: &SymbolTable) -> HashMap<&str, Vec<(RelativeLocation, &Symbol)>> {
    let mut index: HashMap<&str, Vec<(RelativeLocation, &Symbol)>> = HashMap::new();
    for symbol in table.functions() {
        let (Some(body), Some(definition)) = (symbol.body_location, &symbol.definition) else {
            continue;
        };
        index
            .entry(definition.file_uri.as_str())
            .or_default()
            .push((body, symbol));
    }
    for bodies in index.values_mut() {
        bodies.sort_by_key(|(body, _)| body.start_line);
    }
    index
}

fn extract_with_containment(table: &SymbolTable) -> Vec<CallRelation> {
    let spatial_index = build_spatial_index(table);
    if spatial_index.is_empty() {
        info!("No functions have body locations; was span matching run?");
        return Vec::new();
    }
    info!("Built spatial index for {} files", spatial_index.len());

    let valid_kinds: &[u32] = if table.has_call_kind {
        &RefKind::CALL_KINDS
    } else {
        &RefKind::LEGACY_KINDS
    };
    info!("Using call kinds for detection: {valid_kinds:?}");

    let mut relations = Vec::new();
    for callee in table.symbols.values() {
        if !callee.is_function() || callee.references.is_empty() {
            continue;
        }
        for reference in &callee.references {
            if !valid_kinds.contains(&reference.kind) {
                continue;
            }
            let Some(bodies) = spatial_index.get(reference.location.file_uri.as_str()) else {
                continue;
            };
            if let Some((_, caller)) = bodies
                .iter()
                .find(|(body, _)| body.contains_call(&reference.location))
            {
                relations.push(CallRelation {
                    caller_id: caller.id.clone(),
                    caller_name: caller.name.clone(),
                    callee_id: callee.id.clone(),
                    callee_name: callee.name.clone(),
                    call_location: reference.location.clone(),
                });
            }
        }
    }

    info!("Extracted {} call relationships", relations.len());
    relations
}

/// Aggregate numbers over an extracted call graph.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallGraphStats {
    pub total_functions: usize,
    pub functions_with_bodies: usize,
    pub unique_functions_in_graph: usize,
    pub callers: usize,
    pub callees: usize,
    pub total_calls: usize,
    pub recursive_calls: usize,
    pub entry_points: usize,
    pub leaf_functions: usize,
}

pub fn statistics(table: &SymbolTable, relations: &[CallRelation]) -> CallGraphStats {
    use std::collections::HashSet;

    let mut in_graph = HashSet::new();
    let mut callers = HashSet::new();
    let mut callees = HashSet::new();
    let mut recursive_calls = 0;

    for relation in relations {
        in_graph.insert(&relation.caller_id);
        in_graph.insert(&relation.callee_id);
        callers.insert(&relation.caller_id);
        callees.insert(&relation.callee_id);
        if relation.caller_id == relation.callee_id {
            recursive_calls += 1;
        }
    }

    CallGraphStats {
        total_functions: table.function_count(),
        functions_with_bodies: table.functions().filter(|f| f.body_location.is_some()).count(),
        unique_functions_in_graph: in_graph.len(),
        callers: callers.len(),
        callees: callees.len(),
        total_calls: relations.len(),
        recursive_calls,
        entry_points: callers.difference(&callees).count(),
        leaf_functions: callees.difference(&callers).count(),
    }
}

impl fmt::Display for CallGraphStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Call graph statistics:")?;
        writeln!(f, "  Total functions in index: {}", self.total_functions)?;
        writeln!(f, "  Functions with body spans: {}", self.functions_with_bodies)?;
        writeln!(f, "  Unique functions in graph: {}", self.unique_functions_in_graph)?;
        writeln!(f, "  Functions that call others: {}", self.callers)?;
        writeln!(f, "  Functions that are called: {}", self.callees)?;
        writeln!(f, "  Total call relationships: {}", self.total_calls)?;
        writeln!(f, "  Recursive calls: {}", self.recursive_calls)?;
        writeln!(f, "  Entry points (only call): {}", self.entry_points)?;
        write!(f, "  Leaf functions (only called): {}", self.leaf_functions)
    }
}
