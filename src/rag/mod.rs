//! LLM enrichment: summary roll-up and embeddings.
//!
//! Four summary tiers, processed bottom-up: per-function code summaries
//! from body text, per-function context summaries from caller/callee code
//! summaries, file summaries from their functions, folder summaries from
//! their children (deepest first) up to a project summary. Changing a
//! node's summary removes its embedding; a final pass embeds every node
//! with a summary and no embedding.
//!
//! The work is embarrassingly parallel and the client APIs are synchronous,
//! so each pass fans out on a thread pool sized by provider locality.

pub mod embedding;
pub mod llm;

pub use embedding::{EmbeddingClient, FakeEmbeddingClient, FastEmbedClient, create_embedding_client};
pub use llm::{FakeLlmClient, LlmApi, LlmClient, create_llm_client};

use crate::error::StoreResult;
use crate::git::ChangedFiles;
use crate::graph::SpanIndex;
use crate::store::{GraphDatabase, rows_param, string_list};
use crate::types::SymbolId;
use neo4rs::query;
use rayon::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("HTTP client setup failed: {0}")]
    Http(reqwest::Error),

    #[error("Embedding failure: {0}")]
    Embedding(String),
}

const FUNCTIONS_NEEDING_CODE_SUMMARY: &str = "\
MATCH (n:FUNCTION)
WHERE n.id IN $ids AND n.codeSummary IS NULL AND n.has_definition
RETURN n.id AS id";

const FUNCTIONS_NEEDING_CONTEXT_SUMMARY: &str = "\
MATCH (n:FUNCTION)
WHERE n.codeSummary IS NOT NULL AND n.summary IS NULL
RETURN n.id AS id";

const FUNCTION_CONTEXT: &str = "\
MATCH (n:FUNCTION {id: $id})
OPTIONAL MATCH (caller:FUNCTION)-[:CALLS]->(n)
OPTIONAL MATCH (n)-[:CALLS]->(callee:FUNCTION)
RETURN n.codeSummary AS codeSummary,
       n.summary AS oldSummary,
       collect(DISTINCT caller.codeSummary) AS callerSummaries,
       collect(DISTINCT callee.codeSummary) AS calleeSummaries";

const CALL_NEIGHBORS: &str = "\
UNWIND $ids AS seedId
MATCH (:FUNCTION {id: seedId})-[:CALLS]-(neighbor:FUNCTION)
RETURN DISTINCT neighbor.id AS id";

const FILES_DEFINING_SYMBOLS: &str = "\
UNWIND $ids AS symbolId
MATCH (f:FILE)-[:DEFINES]->(:FUNCTION {id: symbolId})
RETURN DISTINCT f.path AS path";

const FILE_FUNCTION_SUMMARIES: &str = "\
MATCH (:FILE {path: $path})-[:DEFINES]->(func:FUNCTION)
WHERE func.summary IS NOT NULL
RETURN func.summary AS summary";

const EXISTING_FOLDERS: &str = "\
UNWIND $paths AS path
MATCH (f:FOLDER {path: path})
RETURN f.path AS path";

const FOLDER_CHILD_SUMMARIES: &str = "\
MATCH (:FOLDER {path: $path})-[:CONTAINS]->(child)
WHERE child.summary IS NOT NULL
RETURN labels(child)[0] AS label, child.name AS name, child.summary AS summary";

const PROJECT_CHILD_SUMMARIES: &str = "\
MATCH (:PROJECT)-[:CONTAINS]->(child)
WHERE child.summary IS NOT NULL
RETURN labels(child)[0] AS label, child.name AS name, child.summary AS summary";

const NODES_NEEDING_EMBEDDING: &str = "\
MATCH (n)
WHERE (n:FUNCTION OR n:FILE OR n:FOLDER OR n:PROJECT)
  AND n.summary IS NOT NULL
  AND n.summaryEmbedding IS NULL
RETURN elementId(n) AS elementId, n.summary AS summary";

const SET_EMBEDDINGS: &str = "\
UNWIND $batch AS row
MATCH (n) WHERE elementId(n) = row.element_id
SET n.summaryEmbedding = row.embedding";

const EMBEDDING_WRITE_BATCH: usize = 1000;

pub fn code_summary_prompt(source_code: &str) -> String {
    format!("Summarize the purpose of this C function based on its code:\n\n```c\n{source_code}\n```")
}

pub fn contextual_prompt(code_summary: &str, callers: &[String], callees: &[String]) -> String {
    let caller_text = non_empty_joined(callers);
    let callee_text = non_empty_joined(callees);
    format!(
        "A C function is described as: '{code_summary}'.\n\
         It is called by functions with these responsibilities: [{caller_text}].\n\
         It calls other functions to do the following: [{callee_text}].\n\n\
         Based on this context, what is the high-level purpose of this function in the overall system? \
         Describe it in one concise sentence."
    )
}

pub fn file_prompt(file_name: &str, function_summaries: &[String]) -> String {
    format!(
        "A file named '{file_name}' contains functions with the following responsibilities: [{}]. \
         What is the overall purpose of this file?",
        function_summaries.join("; ")
    )
}

pub fn folder_prompt(folder_name: &str, child_summaries: &[String]) -> String {
    format!(
        "A folder named '{folder_name}' contains the following components: [{}]. \
         What is this folder's collective role in the project?",
        child_summaries.join("; ")
    )
}

pub fn project_prompt(child_summaries: &[String]) -> String {
    format!(
        "A software project contains the following top-level components: [{}]. \
         What is the overall purpose and architecture of this project?",
        child_summaries.join("; ")
    )
}

fn non_empty_joined(items: &[String]) -> String {
    let filtered: Vec<&str> = items
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();
    if filtered.is_empty() {
        "none".to_string()
    } else {
        filtered.join(", ")
    }
}

pub struct RagEnricher<'a> {
    db: &'a GraphDatabase,
    span_index: SpanIndex,
    llm: Box<dyn LlmClient>,
    embedder: Box<dyn EmbeddingClient>,
    local_workers: usize,
    remote_workers: usize,
}

impl<'a> RagEnricher<'a> {
    pub fn new(
        db: &'a GraphDatabase,
        span_index: SpanIndex,
        llm: Box<dyn LlmClient>,
        embedder: Box<dyn EmbeddingClient>,
        local_workers: usize,
        remote_workers: usize,
    ) -> Self {
        Self {
            db,
            span_index,
            llm,
            embedder,
            local_workers,
            remote_workers,
        }
    }

    /// Full roll-up over the whole graph.
    pub fn summarize_code_graph(&self) -> StoreResult<()> {
        let matched: Vec<String> = self
            .span_index
            .matched_ids()
            .map(|id| id.as_str().to_string())
            .collect();
        info!("Pass 1: code summaries for {} matched functions", matched.len());
        self.summarize_functions_individually(&matched)?;

        let context_ids =
            self.db.string_column(query(FUNCTIONS_NEEDING_CONTEXT_SUMMARY), "id")?;
        info!("Pass 2: context summaries for {} functions", context_ids.len());
        self.summarize_functions_with_context(&context_ids)?;

        let files = self
            .db
            .string_column(query("MATCH (f:FILE) RETURN f.path AS path"), "path")?;
        info!("Pass 3: summaries for {} files", files.len());
        self.summarize_files(&files.into_iter().collect())?;

        let folders = self
            .db
            .string_column(query("MATCH (f:FOLDER) RETURN f.path AS path"), "path")?;
        info!("Pass 4: summaries for {} folders", folders.len());
        self.summarize_folders(&folders.into_iter().collect())?;
        self.summarize_project()?;

        self.generate_embeddings()
    }

    /// Targeted refresh after an incremental update: seeds get new code
    /// summaries, seeds plus 1-hop call neighbors get new context
    /// summaries, and the roll-up re-runs only where it can have changed.
    pub fn summarize_targeted_update(
        &self,
        seed_ids: &BTreeSet<SymbolId>,
        changes: &ChangedFiles,
    ) -> StoreResult<()> {
        if seed_ids.is_empty() && changes.is_empty() {
            info!("No seeds or structural changes; skipping RAG update");
            return Ok(());
        }
        info!(
            "Targeted RAG update: {} seed symbols, {} changed files",
            seed_ids.len(),
            changes.added.len() + changes.modified.len() + changes.deleted.len()
        );

        let seeds: Vec<String> = seed_ids.iter().map(|id| id.as_str().to_string()).collect();
        let updated_code = self.summarize_functions_individually(&seeds)?;
        info!("{} functions received a new code summary", updated_code.len());

        let mut scope: BTreeSet<String> = seeds.iter().cloned().collect();
        scope.extend(self.call_neighbors(&updated_code)?);
        let scope: Vec<String> = scope.into_iter().collect();
        let updated_final = self.summarize_functions_with_context(&scope)?;
        info!("{} functions received a new final summary", updated_final.len());

        let mut files_to_refresh = self.files_defining(&updated_final)?;
        files_to_refresh.extend(changes.added.iter().cloned());
        files_to_refresh.extend(changes.modified.iter().cloned());
        self.summarize_files(&files_to_refresh)?;

        let mut trigger_files = files_to_refresh;
        trigger_files.extend(changes.deleted.iter().cloned());
        if !trigger_files.is_empty() {
            self.summarize_folders(&ancestor_folders(&trigger_files))?;
            self.summarize_project()?;
        }

        self.generate_embeddings()
    }

    fn workers(&self) -> usize {
        if self.llm.is_local() {
            self.local_workers.max(1)
        } else {
            self.remote_workers.max(1)
        }
    }

    /// Fan items out on a pool sized for the provider; collects the
    /// non-`None` results. Per-item failures are logged inside `f`.
    fn run_parallel<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + Sync,
        R: Send,
        F: Fn(&T) -> Option<R> + Send + Sync,
    {
        if items.is_empty() {
            return Vec::new();
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers())
            .build()
        {
            Ok(pool) => pool.install(|| items.par_iter().filter_map(|item| f(item)).collect()),
            Err(e) => {
                warn!("Could not build worker pool ({e}); running sequentially");
                items.iter().filter_map(f).collect()
            }
        }
    }

    /// Pass 1: code-only summaries. Returns the ids actually updated.
    fn summarize_functions_individually(
        &self,
        candidate_ids: &[String],
    ) -> StoreResult<BTreeSet<String>> {
        if candidate_ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let pending = self.db.string_column(
            query(FUNCTIONS_NEEDING_CODE_SUMMARY).param("ids", string_list(candidate_ids)),
            "id",
        )?;
        if pending.is_empty() {
            return Ok(BTreeSet::new());
        }
        info!(
            "{} functions need code summaries ({} workers)",
            pending.len(),
            self.workers()
        );

        let updated = self.run_parallel(pending, |id| {
            let source = self.span_index.read_source(&SymbolId::new(id.as_str()))?;
            let summary = self.llm.generate_summary(&code_summary_prompt(&source))?;
            let write = self.db.run(
                query("MATCH (n:FUNCTION {id: $id}) SET n.codeSummary = $summary")
                    .param("id", id.as_str())
                    .param("summary", summary.as_str()),
            );
            if let Err(e) = write {
                warn!("Could not store code summary for {id}: {e}");
                return None;
            }
            Some(id.clone())
        });
        Ok(updated.into_iter().collect())
    }

    /// Pass 2: context-aware summaries. Returns the ids whose final
    /// summary changed (their embedding was invalidated).
    fn summarize_functions_with_context(&self, ids: &[String]) -> StoreResult<BTreeSet<String>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        info!(
            "Context summaries for {} functions ({} workers)",
            ids.len(),
            self.workers()
        );

        let updated = self.run_parallel(ids.to_vec(), |id| {
            let row = self
                .db
                .rows(query(FUNCTION_CONTEXT).param("id", id.as_str()))
                .ok()?
                .into_iter()
                .next()?;
            let code_summary = row.get::<Option<String>>("codeSummary").ok().flatten()?;
            let old_summary = row.get::<Option<String>>("oldSummary").ok().flatten();
            let callers = row.get::<Vec<String>>("callerSummaries").unwrap_or_default();
            let callees = row.get::<Vec<String>>("calleeSummaries").unwrap_or_default();

            let prompt = contextual_prompt(&code_summary, &callers, &callees);
            let summary = self.llm.generate_summary(&prompt)?;
            if Some(&summary) == old_summary.as_ref() {
                return None;
            }
            let write = self.db.run(
                query(
                    "MATCH (n:FUNCTION {id: $id}) SET n.summary = $summary REMOVE n.summaryEmbedding",
                )
                .param("id", id.as_str())
                .param("summary", summary.as_str()),
            );
            if let Err(e) = write {
                warn!("Could not store summary for {id}: {e}");
                return None;
            }
            Some(id.clone())
        });
        Ok(updated.into_iter().collect())
    }

    fn call_neighbors(&self, ids: &BTreeSet<String>) -> StoreResult<BTreeSet<String>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let ids: Vec<&String> = ids.iter().collect();
        Ok(self
            .db
            .string_column(query(CALL_NEIGHBORS).param("ids", string_list(ids)), "id")?
            .into_iter()
            .collect())
    }

    fn files_defining(&self, ids: &BTreeSet<String>) -> StoreResult<BTreeSet<String>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let ids: Vec<&String> = ids.iter().collect();
        Ok(self
            .db
            .string_column(
                query(FILES_DEFINING_SYMBOLS).param("ids", string_list(ids)),
                "path",
            )?
            .into_iter()
            .collect())
    }

    fn summarize_files(&self, paths: &BTreeSet<String>) -> StoreResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.run_parallel(paths.iter().cloned().collect(), |path| {
            let summaries = self
                .db
                .string_column(
                    query(FILE_FUNCTION_SUMMARIES).param("path", path.as_str()),
                    "summary",
                )
                .ok()?;
            if summaries.is_empty() {
                return None;
            }
            let file_name = path.rsplit('/').next().unwrap_or(path);
            let summary = self
                .llm
                .generate_summary(&file_prompt(file_name, &summaries))?;
            let write = self.db.run(
                query("MATCH (f:FILE {path: $path}) SET f.summary = $summary REMOVE f.summaryEmbedding")
                    .param("path", path.as_str())
                    .param("summary", summary.as_str()),
            );
            if let Err(e) = write {
                warn!("Could not store file summary for {path}: {e}");
            }
            Some(())
        });
        Ok(())
    }

    /// Roll folders up deepest-first so children are summarized before
    /// their parents.
    fn summarize_folders(&self, candidates: &BTreeSet<String>) -> StoreResult<()> {
        if candidates.is_empty() {
            return Ok(());
        }
        let paths: Vec<&String> = candidates.iter().collect();
        let existing = self.db.string_column(
            query(EXISTING_FOLDERS).param("paths", string_list(paths)),
            "path",
        )?;
        if existing.is_empty() {
            return Ok(());
        }

        let mut by_depth: std::collections::BTreeMap<usize, Vec<String>> = Default::default();
        for path in existing {
            by_depth.entry(path.matches('/').count()).or_default().push(path);
        }
        for (_, level) in by_depth.into_iter().rev() {
            self.run_parallel(level, |path| {
                let children = self.child_summaries(FOLDER_CHILD_SUMMARIES, Some(path)).ok()?;
                if children.is_empty() {
                    return None;
                }
                let folder_name = path.rsplit('/').next().unwrap_or(path);
                let summary = self
                    .llm
                    .generate_summary(&folder_prompt(folder_name, &children))?;
                let write = self.db.run(
                    query("MATCH (f:FOLDER {path: $path}) SET f.summary = $summary REMOVE f.summaryEmbedding")
                        .param("path", path.as_str())
                        .param("summary", summary.as_str()),
                );
                if let Err(e) = write {
                    warn!("Could not store folder summary for {path}: {e}");
                }
                Some(())
            });
        }
        Ok(())
    }

    fn summarize_project(&self) -> StoreResult<()> {
        let children = self.child_summaries(PROJECT_CHILD_SUMMARIES, None)?;
        if children.is_empty() {
            info!("No summarized children under the PROJECT node yet");
            return Ok(());
        }
        let Some(summary) = self.llm.generate_summary(&project_prompt(&children)) else {
            return Ok(());
        };
        self.db.run(
            query("MATCH (p:PROJECT) SET p.summary = $summary REMOVE p.summaryEmbedding")
                .param("summary", summary.as_str()),
        )
    }

    fn child_summaries(&self, statement: &str, path: Option<&str>) -> StoreResult<Vec<String>> {
        let mut q = query(statement);
        if let Some(path) = path {
            q = q.param("path", path);
        }
        Ok(self
            .db
            .rows(q)?
            .into_iter()
            .filter_map(|row| {
                let label = row.get::<String>("label").ok()?;
                let name = row.get::<String>("name").ok()?;
                let summary = row.get::<String>("summary").ok()?;
                Some(format!(
                    "{} '{name}' is responsible for: {summary}",
                    label.to_lowercase()
                ))
            })
            .collect())
    }

    /// Pass 5: embeddings for every node with a summary and no embedding.
    fn generate_embeddings(&self) -> StoreResult<()> {
        let nodes: Vec<(String, String)> = self
            .db
            .rows(query(NODES_NEEDING_EMBEDDING))?
            .into_iter()
            .filter_map(|row| {
                Some((
                    row.get::<String>("elementId").ok()?,
                    row.get::<String>("summary").ok()?,
                ))
            })
            .collect();
        if nodes.is_empty() {
            info!("No nodes require embedding");
            return Ok(());
        }
        info!("Embedding {} summaries", nodes.len());

        let texts: Vec<String> = nodes.iter().map(|(_, summary)| summary.clone()).collect();
        let embeddings = match self.embedder.generate_embeddings(&texts) {
            Ok(embeddings) => embeddings,
            Err(e) => {
                warn!("Embedding generation failed: {e}; nodes stay un-embedded");
                return Ok(());
            }
        };

        let updates: Vec<serde_json::Value> = nodes
            .iter()
            .zip(embeddings)
            .filter_map(|((element_id, _), embedding)| {
                embedding.map(|vector| {
                    json!({
                        "element_id": element_id,
                        "embedding": vector,
                    })
                })
            })
            .collect();

        for batch in updates.chunks(EMBEDDING_WRITE_BATCH) {
            self.db
                .run(query(SET_EMBEDDINGS).param("batch", rows_param(batch)))?;
        }
        Ok(())
    }
}

/// Every ancestor folder path of the given relative file paths.
pub fn ancestor_folders(paths: &BTreeSet<String>) -> BTreeSet<String> {
    let mut folders = BTreeSet::new();
    for path in paths {
        let mut rest = path.as_str();
        while let Some((parent, _)) = rest.rsplit_once('/') {
            folders.insert(parent.to_string());
            rest = parent;
        }
    }
    folders
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contextual_prompt_handles_empty_neighbor_lists() {
        let prompt = contextual_prompt("parses headers", &[], &[]);
        assert!(prompt.contains("parses headers"));
        assert!(prompt.contains("[none]"));
    }

    #[test]
    fn contextual_prompt_skips_blank_summaries() {
        let callers = vec![String::new(), "reads config".to_string()];
        let prompt = contextual_prompt("x", &callers, &[]);
        assert!(prompt.contains("[reads config]"));
    }

    #[test]
    fn ancestor_folders_walks_to_the_root() {
        let paths = BTreeSet::from(["src/core/io.c".to_string(), "main.c".to_string()]);
        assert_eq!(
            ancestor_folders(&paths),
            BTreeSet::from(["src".to_string(), "src/core".to_string()])
        );
    }

    #[test]
    fn prompts_mention_their_subject() {
        assert!(file_prompt("io.c", &["reads".into()]).contains("'io.c'"));
        assert!(folder_prompt("core", &["x".into()]).contains("'core'"));
        assert!(project_prompt(&["x".into()]).contains("top-level components"));
        assert!(code_summary_prompt("int f() {}").contains("```c"));
    }
}
