//! Incremental update orchestration.
//!
//! Given two revisions, computes the minimal dirty file set (including
//! reverse-include impact of changed headers), purges exactly the stale
//! graph data, and re-ingests through the normal pipeline using a mini
//! symbol table. The PROJECT commit stamp moves last, so a re-run after any
//! failure repeats the whole update.

use crate::config::Settings;
use crate::error::{UpdateError, UpdateResult};
use crate::git::{ChangedFiles, GitContext};
use crate::graph::{self, PathModel, SpanIndex};
use crate::index::{IndexParser, SymbolTable};
use crate::rag::{LlmApi, RagEnricher, create_embedding_client, create_llm_client};
use crate::source::{self, ParsedSources, SourceParserKind};
use crate::store::{self, DefinesStrategy, GraphDatabase, GraphIngestor, includes};
use crate::types::SymbolId;
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub index_file: PathBuf,
    pub project_path: PathBuf,
    pub old_commit: Option<String>,
    pub new_commit: Option<String>,
    pub source_parser: SourceParserKind,
    pub compile_commands: Option<PathBuf>,
    pub generate_summary: bool,
    pub llm_api: LlmApi,
}

pub struct Updater {
    settings: Settings,
    options: UpdateOptions,
}

impl Updater {
    pub fn new(settings: Settings, options: UpdateOptions) -> Self {
        Self { settings, options }
    }

    pub fn run(&self) -> UpdateResult<()> {
        let paths = PathModel::new(&self.options.project_path);
        let git = GitContext::open(&self.options.project_path)?;

        let db = GraphDatabase::connect(&self.settings.database)?;
        let ingestor = GraphIngestor::new(
            &db,
            self.settings.ingest_batch_size(),
            self.settings.batching.cypher_tx_size,
            self.settings.batching.log_batch_size,
        );
        ingestor.verify_project_path(&paths.project_path_str())?;

        let new_commit = match &self.options.new_commit {
            Some(commit) => commit.clone(),
            None => {
                let head = git.head_commit_hash()?;
                info!("No new commit given; using HEAD {head}");
                head
            }
        };
        let old_commit = match &self.options.old_commit {
            Some(commit) => commit.clone(),
            None => {
                let stamped = ingestor
                    .project_commit_hash(&paths.project_path_str())?
                    .ok_or(UpdateError::NoBaseline)?;
                info!("No old commit given; using graph baseline {stamped}");
                stamped
            }
        };

        if old_commit == new_commit {
            info!("Graph is already at {new_commit}; nothing to update");
            ingestor.set_commit_hash(&paths.project_path_str(), &new_commit)?;
            return Ok(());
        }
        info!("Updating graph from {old_commit} to {new_commit}");

        // Phase 1: changed files plus reverse-include impact.
        let changes = git.classify_changes(&old_commit, &new_commit)?;
        let impacted = includes::impacted_files(&db, &changes.changed_headers())?;
        let mut dirty: BTreeSet<String> = BTreeSet::new();
        dirty.extend(changes.added.iter().cloned());
        dirty.extend(changes.modified.iter().cloned());
        dirty.extend(impacted);
        info!(
            "{} dirty files, {} deleted files",
            dirty.len(),
            changes.deleted.len()
        );

        if dirty.is_empty() && changes.deleted.is_empty() {
            info!("No relevant source changes; stamping commit only");
            ingestor.set_commit_hash(&paths.project_path_str(), &new_commit)?;
            return Ok(());
        }

        // Phase 2: purge stale data. Runs in its own transactions before
        // any re-ingest; a crash in between requires re-running the update.
        let purge_paths: Vec<String> = dirty
            .iter()
            .chain(changes.deleted.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        ingestor.purge_symbols_in_files(&purge_paths)?;
        ingestor.purge_include_relations_from(&purge_paths)?;
        ingestor.purge_files(&changes.deleted.iter().cloned().collect::<Vec<_>>())?;

        // Phase 3: mini-index from the new full index.
        let full_table =
            IndexParser::new(&self.options.index_file).parse(self.settings.workers.parse)?;
        let seeds = seed_symbols(&full_table, &paths, &dirty);
        info!("Found {} seed symbols in dirty files", seeds.len());
        let mini_ids = grow_to_call_neighbors(&full_table, &seeds);
        let mut mini_table = full_table.create_subset(&mini_ids);
        drop(full_table);

        if mini_table.symbols.is_empty() {
            info!("Mini-index is empty; nothing to re-ingest");
            ingestor.set_commit_hash(&paths.project_path_str(), &new_commit)?;
            return Ok(());
        }

        // Phase 4: parse dirty sources (uncached) where spans are needed.
        let needs_spans = !mini_table.has_container_field || self.options.generate_summary;
        let (span_index, parsed) = if needs_spans {
            let dirty_abs: Vec<PathBuf> = dirty.iter().map(|p| paths.to_absolute(p)).collect();
            let mut parser = source::create_parser(
                self.options.source_parser,
                paths.project_path(),
                self.options.compile_commands.as_deref(),
                self.settings.workers.parse,
            )?;
            let parsed = source::parse_files(parser.as_mut(), &dirty_abs)?;
            let span_index = graph::attach_spans(&mut mini_table, &parsed.function_spans);
            (span_index, parsed)
        } else {
            (SpanIndex::default(), ParsedSources::default())
        };

        // Phase 5: re-ingest through the normal pipeline. MERGE links
        // neighbor functions that stayed in the graph by id lookup.
        self.reingest(&ingestor, &paths, &mini_table, &parsed)?;

        // Phase 6: targeted RAG refresh.
        if self.options.generate_summary {
            self.refresh_summaries(&db, &ingestor, span_index, &seeds, &changes)?;
        }

        // The commit stamp moves only after every write above succeeded.
        ingestor.set_commit_hash(&paths.project_path_str(), &new_commit)?;
        info!("Incremental update complete; graph is at {new_commit}");
        Ok(())
    }

    fn reingest(
        &self,
        ingestor: &GraphIngestor,
        paths: &PathModel,
        mini_table: &SymbolTable,
        parsed: &ParsedSources,
    ) -> UpdateResult<()> {
        let relative_includes = includes::relative_relations(&parsed.include_relations, paths);

        let mut sets = paths.discover(mini_table);
        for endpoint in includes::endpoint_paths(&relative_includes) {
            sets.add_file(&endpoint);
        }
        ingestor.ingest_folders(&paths.folder_rows(&sets.folders))?;
        ingestor.ingest_files(&paths.file_rows(&sets.files))?;

        let rows = store::build_symbol_rows(mini_table, paths);
        ingestor.ingest_function_nodes(&rows.functions)?;
        ingestor.ingest_data_structure_nodes(&rows.data_structures)?;
        // Updates always take the deadlock-free strategy.
        ingestor.ingest_defines(&rows.defines, DefinesStrategy::UnwindSequential)?;

        ingestor.ingest_includes(&includes::include_rows(&relative_includes))?;

        let relations = graph::extract_calls(mini_table);
        ingestor.ingest_calls(&relations)?;
        Ok(())
    }

    fn refresh_summaries(
        &self,
        db: &GraphDatabase,
        ingestor: &GraphIngestor,
        span_index: SpanIndex,
        seeds: &BTreeSet<SymbolId>,
        changes: &ChangedFiles,
    ) -> UpdateResult<()> {
        let llm = match create_llm_client(self.options.llm_api) {
            Ok(llm) => llm,
            Err(e) => {
                warn!("Could not create LLM client: {e}; skipping RAG refresh");
                return Ok(());
            }
        };
        let embedder = match create_embedding_client() {
            Ok(embedder) => embedder,
            Err(e) => {
                warn!("Could not create embedding client: {e}; skipping RAG refresh");
                return Ok(());
            }
        };
        let enricher = RagEnricher::new(
            db,
            span_index,
            llm,
            embedder,
            self.settings.workers.local,
            self.settings.workers.remote,
        );
        enricher.summarize_targeted_update(seeds, changes)?;
        ingestor.create_vector_indexes(self.settings.rag.embedding_dimensions)?;
        Ok(())
    }
}

/// Symbols whose definition lies in a dirty file.
pub fn seed_symbols(
    table: &SymbolTable,
    paths: &PathModel,
    dirty: &BTreeSet<String>,
) -> BTreeSet<SymbolId> {
    table
        .symbols
        .values()
        .filter(|symbol| {
            symbol
                .definition
                .as_ref()
                .and_then(|def| paths.uri_to_relative(&def.file_uri))
                .is_some_and(|relative| dirty.contains(&relative))
        })
        .map(|symbol| symbol.id.clone())
        .collect()
}

/// Seeds plus their 1-hop call neighbors via reference containers.
///
/// The growth keeps seed-to-callee edges reconstructible: a call from a
/// seed lives on the callee's reference list, so the callee symbol must be
/// in the mini-table for the edge to be re-derived.
pub fn grow_to_call_neighbors(
    table: &SymbolTable,
    seeds: &BTreeSet<SymbolId>,
) -> HashSet<SymbolId> {
    let mut result: HashSet<SymbolId> = seeds.iter().cloned().collect();

    // Incoming callers of the seeds.
    for seed in seeds {
        if let Some(symbol) = table.get(seed) {
            for reference in &symbol.references {
                if let Some(container) = reference.container() {
                    result.insert(container.clone());
                }
            }
        }
    }

    // Outgoing callees: symbols referenced from inside a seed.
    for symbol in table.symbols.values() {
        if result.contains(&symbol.id) {
            continue;
        }
        if symbol
            .references
            .iter()
            .any(|r| r.container().is_some_and(|c| seeds.contains(c)))
        {
            result.insert(symbol.id.clone());
        }
    }

    info!("Mini-index grows to {} symbols with 1-hop neighbors", result.len());
    result
}
