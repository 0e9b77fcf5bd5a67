//! Error types for the graph building pipeline.
//!
//! Structured errors via thiserror, one enum per pipeline domain, with
//! `Result` aliases. Precondition failures surface to the CLI and exit
//! non-zero; per-item errors are logged at the call site and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from index parsing and the index cache.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read index file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML parse error in chunk {chunk}: {reason}")]
    ChunkParse { chunk: usize, reason: String },

    #[error("Failed to write index cache '{path}': {source}")]
    CacheWrite {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Index cache '{path}' is corrupted or has an unknown schema")]
    CacheInvalid { path: PathBuf },
}

/// Errors from the source parsers and their cache.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error(
        "Clang strategy requires a compile_commands.json; pass --compile-commands or place one at the project root"
    )]
    MissingCompileCommands,

    #[error("Failed to load compilation database from '{path}': {reason}")]
    CompilationDatabase { path: PathBuf, reason: String },

    #[error("Failed to initialize libclang: {reason}")]
    ClangInit { reason: String },

    #[error("Failed to initialize tree-sitter C grammar: {reason}")]
    TreeSitterInit { reason: String },

    #[error("Failed to read source file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors from the graph database layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Could not connect to the graph database at '{uri}': {source}")]
    Connect { uri: String, source: neo4rs::Error },

    #[error("Graph query failed: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Failed to start the driver runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error(
        "Project path mismatch: the graph was built for '{graph_path}' but '{cli_path}' was given"
    )]
    ProjectPathMismatch { graph_path: String, cli_path: String },
}

/// Errors aborting an incremental update.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("'{path}' is not inside a git work tree")]
    NotARepository { path: PathBuf },

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error(
        "No baseline commit: none given on the command line and the PROJECT node carries no commit_hash"
    )]
    NoBaseline,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

pub type IndexResult<T> = Result<T, IndexError>;
pub type SourceResult<T> = Result<T, SourceError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type UpdateResult<T> = Result<T, UpdateError>;
