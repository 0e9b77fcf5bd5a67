//! Syntax-only span extraction with tree-sitter.
//!
//! Walks the parse tree of each file looking for `function_definition`
//! nodes. Fast and dependency-free, but blind to the preprocessor: no
//! include edges come out of this strategy.

use super::{ParsedSources, SourceParser};
use crate::error::{SourceError, SourceResult};
use crate::types::{FileFunctionSpans, FunctionSpan, RelativeLocation};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use tree_sitter::{Node, Parser};

pub struct TreeSitterStrategy {
    workers: usize,
}

impl TreeSitterStrategy {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

fn new_parser() -> SourceResult<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_c::LANGUAGE.into())
        .map_err(|e| SourceError::TreeSitterInit {
            reason: e.to_string(),
        })?;
    Ok(parser)
}

fn to_relative(node: Node) -> RelativeLocation {
    let start = node.start_position();
    let end = node.end_position();
    RelativeLocation::new(
        start.row as u32,
        start.column as u32,
        end.row as u32,
        end.column as u32,
    )
}

/// Depth-first search for the declarator's identifier, without recursion.
fn find_identifier(declarator: Node) -> Option<Node> {
    let mut stack = vec![declarator];
    while let Some(node) = stack.pop() {
        if node.kind() == "identifier" {
            return Some(node);
        }
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }
    None
}

fn extract_functions(root: Node, source: &str) -> Vec<FunctionSpan> {
    let mut functions = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == "function_definition" {
            let ident = node
                .child_by_field_name("declarator")
                .and_then(find_identifier);
            if let Some(ident) = ident {
                let name = source[ident.byte_range()].to_string();
                functions.push(FunctionSpan {
                    name,
                    name_location: to_relative(ident),
                    // The whole definition node: return type through the
                    // closing brace.
                    body_location: to_relative(node),
                });
            }
        }
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }
    functions
}

fn parse_one_file(parser: &mut Parser, path: &Path) -> Option<FileFunctionSpans> {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            warn!("Could not read {}: {e}", path.display());
            return None;
        }
    };
    let tree = parser.parse(&source, None)?;
    let functions = extract_functions(tree.root_node(), &source);
    if functions.is_empty() {
        return None;
    }
    let file_uri = url::Url::from_file_path(path).ok()?.to_string();
    Some(FileFunctionSpans {
        file_uri,
        functions,
    })
}

impl SourceParser for TreeSitterStrategy {
    fn parse(&mut self, files: &[PathBuf]) -> SourceResult<ParsedSources> {
        // Validate grammar setup once up front; worker parsers are then
        // constructed per rayon worker and reused across files.
        drop(new_parser()?);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| SourceError::TreeSitterInit {
                reason: e.to_string(),
            })?;

        let mut function_spans: Vec<FileFunctionSpans> = pool.install(|| {
            files
                .par_iter()
                .map_init(
                    || new_parser().expect("grammar already validated"),
                    |parser, path| parse_one_file(parser, path),
                )
                .flatten()
                .collect()
        });
        function_spans.sort_by(|a, b| a.file_uri.cmp(&b.file_uri));

        Ok(ParsedSources {
            function_spans,
            include_relations: BTreeSet::new(),
        })
    }

    fn provides_includes(&self) -> bool {
        false
    }
}
