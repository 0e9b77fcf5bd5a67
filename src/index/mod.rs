//! Streaming, chunked, parallel parser for the clangd YAML symbol index.
//!
//! The index is read twice: once to count document separators, once to emit
//! per-worker chunks that end on document boundaries. Workers parse chunks
//! independently; results are merged in deterministic chunk order and a
//! final cross-reference pass attaches references to their target symbols.

mod chunker;
mod yaml;

pub mod cache;

pub use yaml::UnlinkedRefs;

use crate::error::{IndexError, IndexResult};
use crate::types::{Symbol, SymbolId};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// In-memory symbol table with cross-linked reference lists.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    pub symbols: HashMap<SymbolId, Symbol>,
    /// Ids of function symbols, a derived view rebuilt after linking.
    functions: Vec<SymbolId>,
    /// At least one reference carried a container id.
    pub has_container_field: bool,
    /// At least one reference kind had the call bit set.
    pub has_call_kind: bool,
}

impl SymbolTable {
    pub(crate) fn from_parts(
        symbols: HashMap<SymbolId, Symbol>,
        functions: Vec<SymbolId>,
        has_container_field: bool,
        has_call_kind: bool,
    ) -> Self {
        Self {
            symbols,
            functions,
            has_container_field,
            has_call_kind,
        }
    }

    pub fn function_ids(&self) -> &[SymbolId] {
        &self.functions
    }

    pub fn functions(&self) -> impl Iterator<Item = &Symbol> {
        self.functions.iter().filter_map(|id| self.symbols.get(id))
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn get(&self, id: &SymbolId) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    fn rebuild_function_index(&mut self) {
        self.functions = self
            .symbols
            .values()
            .filter(|s| s.is_function())
            .map(|s| s.id.clone())
            .collect();
        self.functions.sort_unstable();
    }

    /// A logically independent table containing exactly the given ids.
    ///
    /// References are kept intact; container ids pointing outside the subset
    /// stay as dangling ids. The format flags carry over unchanged.
    pub fn create_subset(&self, keep_ids: &HashSet<SymbolId>) -> SymbolTable {
        let symbols: HashMap<SymbolId, Symbol> = keep_ids
            .iter()
            .filter_map(|id| self.symbols.get(id).map(|s| (id.clone(), s.clone())))
            .collect();
        let mut subset = SymbolTable {
            symbols,
            functions: Vec::new(),
            has_container_field: self.has_container_field,
            has_call_kind: self.has_call_kind,
        };
        subset.rebuild_function_index();
        info!(
            "Created mini-index with {} symbols ({} functions)",
            subset.symbols.len(),
            subset.function_count()
        );
        subset
    }
}

/// Parser for the clangd index with a built-in side-car cache.
pub struct IndexParser {
    index_path: PathBuf,
}

impl IndexParser {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
        }
    }

    /// Parse the index (or load it from cache) into a symbol table.
    ///
    /// A `.pkl` path is loaded directly. Otherwise the side-car cache is
    /// used when fresh; a stale or corrupt cache falls back to YAML parsing
    /// and the cache is rewritten.
    pub fn parse(&self, workers: usize) -> IndexResult<SymbolTable> {
        if self.index_path.extension().is_some_and(|e| e == "pkl") {
            return cache::load(&self.index_path);
        }

        let cache_path = cache::cache_path_for(&self.index_path);
        if cache::is_fresh(&cache_path, &self.index_path) {
            info!("Found valid cache file: {}", cache_path.display());
            match cache::load(&cache_path) {
                Ok(table) => return Ok(table),
                Err(IndexError::CacheInvalid { .. }) => {
                    info!("Falling back to YAML parsing");
                }
                Err(e) => return Err(e),
            }
        }

        let table = if workers > 1 {
            info!("Parsing {} with {workers} workers", self.index_path.display());
            self.parallel_parse(workers)?
        } else {
            info!("Parsing {} single-threaded", self.index_path.display());
            let content = std::fs::read_to_string(&self.index_path).map_err(|source| {
                IndexError::FileRead {
                    path: self.index_path.clone(),
                    source,
                }
            })?;
            let (symbols, unlinked) = yaml::parse_chunk(0, &chunker::sanitize(&content))?;
            build_cross_references(symbols, unlinked)
        };

        if let Err(e) = cache::store(&cache_path, &table) {
            warn!("Could not write index cache: {e}");
        }
        Ok(table)
    }

    fn parallel_parse(&self, workers: usize) -> IndexResult<SymbolTable> {
        let chunks =
            chunker::chunk_file(&self.index_path, workers).map_err(|source| IndexError::FileRead {
                path: self.index_path.clone(),
                source,
            })?;
        info!("Created {} in-memory chunks", chunks.len());

        let results: Vec<yaml::ChunkOutput> = chunks
            .into_par_iter()
            .enumerate()
            .map(|(i, chunk)| match yaml::parse_chunk(i, &chunk) {
                Ok(output) => output,
                Err(e) => {
                    // One bad chunk loses only its own documents.
                    warn!("{e}");
                    (HashMap::new(), Vec::new())
                }
            })
            .collect();

        let mut symbols = HashMap::new();
        let mut unlinked = Vec::new();
        for (i, (local_symbols, local_refs)) in results.into_iter().enumerate() {
            debug!("Merging results from chunk {}", i + 1);
            symbols.extend(local_symbols);
            unlinked.extend(local_refs);
        }

        Ok(build_cross_references(symbols, unlinked))
    }
}

/// Attach unlinked references to their target symbols and detect the index
/// format flags. Consumes the unlinked list; the table's function view is
/// rebuilt afterwards.
fn build_cross_references(
    mut symbols: HashMap<SymbolId, Symbol>,
    unlinked: Vec<UnlinkedRefs>,
) -> SymbolTable {
    let mut has_container_field = false;
    let mut has_call_kind = false;

    for refs in unlinked {
        let Some(symbol) = symbols.get_mut(&refs.target) else {
            continue;
        };
        for reference in refs.references {
            if !has_container_field && reference.container_id.is_some() {
                has_container_field = true;
                has_call_kind = true;
            } else if !has_call_kind && reference.kind >= 16 {
                has_call_kind = true;
            }
            symbol.references.push(reference);
        }
    }

    let mut table = SymbolTable {
        symbols,
        functions: Vec::new(),
        has_container_field,
        has_call_kind,
    };
    table.rebuild_function_index();
    info!(
        "Cross-referencing complete: {} symbols, {} functions",
        table.symbols.len(),
        table.function_count()
    );
    table
}

/// Parse an index file that is already known to be on disk, for tests and
/// tools that bypass the cache.
pub fn parse_str(content: &str) -> IndexResult<SymbolTable> {
    let (symbols, unlinked) = yaml::parse_chunk(0, &chunker::sanitize(content))?;
    Ok(build_cross_references(symbols, unlinked))
}
