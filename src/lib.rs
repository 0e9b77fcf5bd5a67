//! clangraph: a queryable code knowledge graph for C/C++ codebases.
//!
//! Ingests a clangd YAML symbol index and the project source tree, then
//! materializes folders, files, data structures, and functions as graph
//! nodes with CONTAINS / DEFINES / INCLUDES / CALLS edges in a
//! labeled-property graph database. Optional LLM summaries and embeddings
//! turn the graph into a retrieval backend for question answering over the
//! code.

pub mod config;
pub mod error;
pub mod git;
pub mod graph;
pub mod index;
pub mod logging;
pub mod pipeline;
pub mod rag;
pub mod source;
pub mod store;
pub mod types;
pub mod update;

pub use config::Settings;
pub use error::{IndexError, SourceError, StoreError, UpdateError};
pub use index::{IndexParser, SymbolTable};
pub use types::{
    CallRelation, FileFunctionSpans, FunctionSpan, IncludeRelation, Location, RefKind, Reference,
    RelativeLocation, Symbol, SymbolId,
};
