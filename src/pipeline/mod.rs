//! Full-build orchestration.
//!
//! Pass order: parse index, parse sources, match spans, ingest paths, ingest
//! symbol nodes and DEFINES, ingest INCLUDES, build and ingest CALLS, clean
//! orphans, then optional RAG enrichment. Large intermediates are dropped at
//! phase boundaries to cap peak memory.

use crate::config::Settings;
use crate::error::StoreResult;
use crate::git::GitContext;
use crate::graph::{self, PathModel};
use crate::index::IndexParser;
use crate::rag::{LlmApi, RagEnricher, create_embedding_client, create_llm_client};
use crate::source::{self, ParsedSources, SourceParserKind};
use crate::store::{self, DefinesStrategy, GraphDatabase, GraphIngestor, includes};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

/// Everything a full build needs beyond the settings file.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub index_file: PathBuf,
    pub project_path: PathBuf,
    pub source_parser: SourceParserKind,
    pub compile_commands: Option<PathBuf>,
    pub defines_strategy: DefinesStrategy,
    pub generate_summary: bool,
    pub llm_api: LlmApi,
    pub keep_orphans: bool,
}

pub struct GraphBuilder {
    settings: Settings,
    options: BuildOptions,
}

impl GraphBuilder {
    pub fn new(settings: Settings, options: BuildOptions) -> Self {
        Self { settings, options }
    }

    pub fn run(&self) -> Result<()> {
        let paths = PathModel::new(&self.options.project_path);

        info!("--- Pass 0: parsing symbol index ---");
        let mut table = IndexParser::new(&self.options.index_file)
            .parse(self.settings.workers.parse)
            .context("index parsing failed")?;

        info!("--- Pass 1: parsing sources for spans and includes ---");
        let parsed = self.parse_sources(&paths)?;

        info!("--- Pass 2: matching body spans ---");
        let span_index = graph::attach_spans(&mut table, &parsed.function_spans);

        let db = GraphDatabase::connect(&self.settings.database)?;
        let ingestor = GraphIngestor::new(
            &db,
            self.settings.ingest_batch_size(),
            self.settings.batching.cypher_tx_size,
            self.settings.batching.log_batch_size,
        );

        ingestor.reset_database()?;
        ingestor.upsert_project(
            &paths.project_path_str(),
            &paths.project_name(),
            self.head_commit().as_deref(),
        )?;
        ingestor.create_constraints()?;

        let relative_includes = includes::relative_relations(&parsed.include_relations, &paths);
        drop(parsed.include_relations);

        info!("--- Pass 3: ingesting file and folder structure ---");
        {
            let mut sets = paths.discover(&table);
            // Files that appear only in include relations still get FILE
            // nodes and a CONTAINS parent.
            for endpoint in includes::endpoint_paths(&relative_includes) {
                sets.add_file(&endpoint);
            }
            ingestor.ingest_folders(&paths.folder_rows(&sets.folders))?;
            ingestor.ingest_files(&paths.file_rows(&sets.files))?;
        }

        info!("--- Pass 4: ingesting symbol nodes and DEFINES ---");
        {
            let rows = store::build_symbol_rows(&table, &paths);
            ingestor.ingest_function_nodes(&rows.functions)?;
            ingestor.ingest_data_structure_nodes(&rows.data_structures)?;
            ingestor.ingest_defines(&rows.defines, self.options.defines_strategy)?;
        }

        info!("--- Pass 5: ingesting INCLUDES ---");
        ingestor.ingest_includes(&includes::include_rows(&relative_includes))?;
        drop(relative_includes);

        info!("--- Pass 6: building and ingesting the call graph ---");
        {
            let relations = graph::extract_calls(&table);
            ingestor.ingest_calls(&relations)?;
            info!("\n{}", graph::call_statistics(&table, &relations));
        }

        if self.options.keep_orphans {
            info!("--- Pass 7 skipped: keeping orphan nodes ---");
        } else {
            info!("--- Pass 7: cleaning up orphan nodes ---");
            let removed = ingestor.cleanup_orphans()?;
            info!("Removed {removed} orphan nodes");
        }

        if self.options.generate_summary {
            info!("--- Pass 8: generating summaries and embeddings ---");
            // The span index has everything the enricher needs; release the
            // symbol table before the long LLM phase.
            drop(table);
            self.run_rag(&db, &ingestor, span_index)?;
        }

        info!("Code graph ingestion finished");
        Ok(())
    }

    fn parse_sources(&self, paths: &PathModel) -> Result<ParsedSources> {
        let mut parser = source::create_parser(
            self.options.source_parser,
            paths.project_path(),
            self.options.compile_commands.as_deref(),
            self.settings.workers.parse,
        )?;
        if !parser.provides_includes() {
            warn!("The tree-sitter backend produces no include relations; INCLUDES edges will be absent");
        }
        let parsed = source::parse_project(parser.as_mut(), paths.project_path(), None)?;
        Ok(parsed)
    }

    fn head_commit(&self) -> Option<String> {
        match GitContext::open(&self.options.project_path) {
            Ok(git) => match git.head_commit_hash() {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!("Could not read HEAD commit: {e}; proceeding without a commit stamp");
                    None
                }
            },
            Err(e) => {
                warn!("{e}; proceeding without a commit stamp");
                None
            }
        }
    }

    fn run_rag(
        &self,
        db: &GraphDatabase,
        ingestor: &GraphIngestor,
        span_index: graph::SpanIndex,
    ) -> StoreResult<()> {
        run_enrichment_with(
            db,
            ingestor,
            span_index,
            &self.settings,
            self.options.llm_api,
        )
    }
}

/// Standalone enrichment over an already-ingested graph.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub index_file: PathBuf,
    pub project_path: PathBuf,
    pub source_parser: SourceParserKind,
    pub compile_commands: Option<PathBuf>,
    pub llm_api: LlmApi,
}

pub fn run_enrichment(settings: &Settings, options: &EnrichOptions) -> Result<()> {
    let paths = PathModel::new(&options.project_path);

    info!("Parsing symbol index (or loading its cache)");
    let mut table = IndexParser::new(&options.index_file)
        .parse(settings.workers.parse)
        .context("index parsing failed")?;

    let mut parser = source::create_parser(
        options.source_parser,
        paths.project_path(),
        options.compile_commands.as_deref(),
        settings.workers.parse,
    )?;
    let parsed = source::parse_project(parser.as_mut(), paths.project_path(), None)?;
    let span_index = graph::attach_spans(&mut table, &parsed.function_spans);
    drop(parsed);
    drop(table);

    let db = GraphDatabase::connect(&settings.database)?;
    let ingestor = GraphIngestor::new(
        &db,
        settings.ingest_batch_size(),
        settings.batching.cypher_tx_size,
        settings.batching.log_batch_size,
    );
    ingestor.verify_project_path(&paths.project_path_str())?;

    run_enrichment_with(&db, &ingestor, span_index, settings, options.llm_api)?;
    Ok(())
}

fn run_enrichment_with(
    db: &GraphDatabase,
    ingestor: &GraphIngestor,
    span_index: graph::SpanIndex,
    settings: &Settings,
    llm_api: LlmApi,
) -> StoreResult<()> {
    let llm = match create_llm_client(llm_api) {
        Ok(llm) => llm,
        Err(e) => {
            warn!("Could not create LLM client: {e}; skipping RAG");
            return Ok(());
        }
    };
    let embedder = match create_embedding_client() {
        Ok(embedder) => embedder,
        Err(e) => {
            warn!("Could not create embedding client: {e}; skipping RAG");
            return Ok(());
        }
    };

    let enricher = RagEnricher::new(
        db,
        span_index,
        llm,
        embedder,
        settings.workers.local,
        settings.workers.remote,
    );
    enricher.summarize_code_graph()?;
    ingestor.create_vector_indexes(settings.rag.embedding_dimensions)
}
