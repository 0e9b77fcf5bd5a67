//! Graph database layer: the sync driver facade, pure row builders, and
//! the batched ingestor.

mod bolt;
mod database;
mod ingest;
mod rows;

pub mod includes;

pub use bolt::{rows_param, string_list, to_bolt};
pub use database::GraphDatabase;
pub use ingest::{DefinesStrategy, GraphIngestor};
pub use rows::{SymbolRows, build_symbol_rows, call_rows, symbol_row};
