//! Graph assembly: span matching, call derivation, path discovery, and
//! include impact analysis.

pub mod calls;
pub mod includes;
pub mod matcher;
pub mod paths;

pub use calls::{CallGraphStats, extract as extract_calls, statistics as call_statistics};
pub use matcher::{SpanIndex, attach_spans};
pub use paths::{PathModel, PathSets};
