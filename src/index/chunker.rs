//! Two-pass chunking of a multi-document YAML stream.
//!
//! The first pass counts `---` document separators to derive the documents
//! per chunk; the second emits in-memory chunk strings that always end on a
//! document boundary. Tab bytes are normalized to two spaces on the way in,
//! to accommodate producers that emit illegal YAML indentation.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Replace every tab with two spaces.
pub fn sanitize(line: &str) -> String {
    line.replace('\t', "  ")
}

/// Count `---` document separators in the stream.
pub fn count_documents<R: BufRead>(reader: R) -> io::Result<usize> {
    let mut total = 0;
    for line in reader.lines() {
        if line?.starts_with("---") {
            total += 1;
        }
    }
    Ok(total)
}

/// Split the stream into at most `num_chunks` sanitized strings, each ending
/// on a document boundary. A stream with no separators yields one chunk.
pub fn chunk<R: BufRead>(reader: R, total_docs: usize, num_chunks: usize) -> io::Result<Vec<String>> {
    assert!(num_chunks > 0, "chunk count must be positive");

    let docs_per_chunk = total_docs.div_ceil(num_chunks);
    if docs_per_chunk == 0 {
        let mut content = String::new();
        let mut reader = reader;
        reader.read_to_string(&mut content)?;
        return Ok(vec![sanitize(&content)]);
    }

    let mut chunks: Vec<String> = Vec::with_capacity(num_chunks);
    let mut current = String::new();
    let mut docs_in_chunk = 0usize;

    for line in reader.lines() {
        let mut line = sanitize(&line?);
        line.push('\n');
        if line.starts_with("---") {
            if docs_in_chunk >= docs_per_chunk && chunks.len() < num_chunks - 1 {
                chunks.push(std::mem::take(&mut current));
                docs_in_chunk = 0;
            }
            docs_in_chunk += 1;
        }
        current.push_str(&line);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Chunk an index file from disk (both passes).
pub fn chunk_file(path: &Path, num_chunks: usize) -> io::Result<Vec<String>> {
    let total_docs = count_documents(BufReader::new(File::open(path)?))?;
    chunk(BufReader::new(File::open(path)?), total_docs, num_chunks)
}
