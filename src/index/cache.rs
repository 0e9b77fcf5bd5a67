//! Side-car cache for parsed symbol tables.
//!
//! The cache lives next to the index as `<basename>.pkl` and is valid iff it
//! exists and its mtime is at least the index mtime. Any decode failure
//! treats the cache as absent: the file is deleted and the YAML re-parsed.

use crate::error::{IndexError, IndexResult};
use crate::index::SymbolTable;
use crate::types::{Symbol, SymbolId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CachePayload {
    version: u32,
    symbols: HashMap<SymbolId, Symbol>,
    functions: Vec<SymbolId>,
    has_container_field: bool,
    has_call_kind: bool,
}

/// Side-car path for an index file.
pub fn cache_path_for(index_path: &Path) -> PathBuf {
    index_path.with_extension("pkl")
}

/// True when the cache exists and is at least as new as the index.
pub fn is_fresh(cache_path: &Path, index_path: &Path) -> bool {
    let (Ok(cache_meta), Ok(index_meta)) = (fs::metadata(cache_path), fs::metadata(index_path))
    else {
        return false;
    };
    match (cache_meta.modified(), index_meta.modified()) {
        (Ok(cache_mtime), Ok(index_mtime)) => cache_mtime >= index_mtime,
        _ => false,
    }
}

/// Load a symbol table from a cache file.
///
/// On decode failure the file is removed and `CacheInvalid` returned so the
/// caller can fall back to parsing the YAML.
pub fn load(cache_path: &Path) -> IndexResult<SymbolTable> {
    let bytes = fs::read(cache_path).map_err(|source| IndexError::FileRead {
        path: cache_path.to_path_buf(),
        source,
    })?;

    let payload: CachePayload = match bincode::deserialize(&bytes) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                "Index cache {} is corrupted ({e}); removing it",
                cache_path.display()
            );
            let _ = fs::remove_file(cache_path);
            return Err(IndexError::CacheInvalid {
                path: cache_path.to_path_buf(),
            });
        }
    };
    if payload.version != CACHE_VERSION {
        warn!(
            "Index cache {} has schema version {}; removing it",
            cache_path.display(),
            payload.version
        );
        let _ = fs::remove_file(cache_path);
        return Err(IndexError::CacheInvalid {
            path: cache_path.to_path_buf(),
        });
    }

    info!("Loaded {} symbols from cache {}", payload.symbols.len(), cache_path.display());
    Ok(SymbolTable::from_parts(
        payload.symbols,
        payload.functions,
        payload.has_container_field,
        payload.has_call_kind,
    ))
}

/// Persist a symbol table next to its index.
pub fn store(cache_path: &Path, table: &SymbolTable) -> IndexResult<()> {
    let payload = CachePayload {
        version: CACHE_VERSION,
        symbols: table.symbols.clone(),
        functions: table.function_ids().to_vec(),
        has_container_field: table.has_container_field,
        has_call_kind: table.has_call_kind,
    };
    let bytes = bincode::serialize(&payload).map_err(|e| IndexError::CacheWrite {
        path: cache_path.to_path_buf(),
        source: Box::new(e),
    })?;
    fs::write(cache_path, bytes).map_err(|e| IndexError::CacheWrite {
        path: cache_path.to_path_buf(),
        source: Box::new(e),
    })?;
    info!("Saved parsed symbols to cache {}", cache_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Symbol;

    fn table_with_one_function() -> SymbolTable {
        let sym = Symbol {
            id: SymbolId::new("AB12"),
            name: "foo".into(),
            kind: "Function".into(),
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
        let mut symbols = HashMap::new();
        symbols.insert(sym.id.clone(), sym);
        SymbolTable::from_parts(symbols, vec![SymbolId::new("AB12")], true, true)
    }

    #[test]
    fn cache_path_swaps_extension() {
        assert_eq!(
            cache_path_for(Path::new("/idx/kernel.yaml")),
            PathBuf::from("/idx/kernel.pkl")
        );
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.pkl");
        let table = table_with_one_function();
        store(&path, &table).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.symbols.len(), 1);
        assert_eq!(loaded.function_ids(), table.function_ids());
        assert!(loaded.has_container_field);
        assert!(loaded.has_call_kind);
    }

    #[test]
    fn corrupt_cache_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.pkl");
        fs::write(&path, b"not a cache").unwrap();

        assert!(matches!(load(&path), Err(IndexError::CacheInvalid { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn freshness_follows_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("index.yaml");
        let cache = dir.path().join("index.pkl");
        fs::write(&index, "---\n").unwrap();
        assert!(!is_fresh(&cache, &index));
        fs::write(&cache, b"x").unwrap();
        assert!(is_fresh(&cache, &index));
    }
}
