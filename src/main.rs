use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clangraph::config::Settings;
use clangraph::graph::includes::impacted_sources;
use clangraph::pipeline::{BuildOptions, EnrichOptions, GraphBuilder, run_enrichment};
use clangraph::rag::LlmApi;
use clangraph::source::{self, SourceParserKind, spans_yaml};
use clangraph::store::DefinesStrategy;
use clangraph::update::{UpdateOptions, Updater};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "clangraph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build a queryable code knowledge graph from a clangd index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full build: parse the index and ingest the whole graph
    Build {
        #[command(flatten)]
        core: CoreArgs,
        #[command(flatten)]
        workers: WorkerArgs,
        #[command(flatten)]
        batching: BatchingArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        rag: RagArgs,

        /// Strategy for ingesting DEFINES relationships
        #[arg(long, value_enum, default_value_t = DefinesStrategyArg::BatchedParallel)]
        defines_generation: DefinesStrategyArg,

        /// Keep orphan nodes in the graph (skip cleanup)
        #[arg(long)]
        keep_orphans: bool,
    },

    /// Incremental update between two revisions
    Update {
        #[command(flatten)]
        core: CoreArgs,
        #[command(flatten)]
        workers: WorkerArgs,
        #[command(flatten)]
        batching: BatchingArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        rag: RagArgs,

        /// Baseline commit; defaults to the PROJECT node's commit_hash
        #[arg(long)]
        old_commit: Option<String>,

        /// Target commit; defaults to HEAD
        #[arg(long)]
        new_commit: Option<String>,
    },

    /// Generate summaries and embeddings for an existing graph
    Enrich {
        #[command(flatten)]
        core: CoreArgs,
        #[command(flatten)]
        workers: WorkerArgs,
        #[command(flatten)]
        batching: BatchingArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        rag: RagArgs,
    },

    /// Extract function spans (and optionally header impact) from sources
    Spans {
        /// Source files or folders to process
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        workers: WorkerArgs,

        /// Write YAML here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Report which source files a change to this header impacts
        #[arg(long)]
        impacting_header: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CoreArgs {
    /// Path to the clangd index YAML file (or .pkl cache)
    index_file: PathBuf,

    /// Root path of the project being indexed
    project_path: PathBuf,
}

#[derive(Args)]
struct WorkerArgs {
    /// Parallel workers for YAML and source parsing
    #[arg(long)]
    num_parse_workers: Option<usize>,

    /// Parallel workers for local LLMs and embedding models
    #[arg(long)]
    num_local_workers: Option<usize>,

    /// Parallel workers for remote LLM and embedding APIs
    #[arg(long)]
    num_remote_workers: Option<usize>,
}

#[derive(Args)]
struct BatchingArgs {
    /// Log progress every N items
    #[arg(long)]
    log_batch_size: Option<usize>,

    /// Target items per server-side transaction
    #[arg(long)]
    cypher_tx_size: Option<usize>,

    /// Target items per client submission (default: cypher-tx-size x num-parse-workers)
    #[arg(long)]
    ingest_batch_size: Option<usize>,
}

#[derive(Args)]
struct SourceArgs {
    /// Source parser backend
    #[arg(long, value_enum, default_value_t = SourceParserArg::Clang)]
    source_parser: SourceParserArg,

    /// Path to compile_commands.json (required for the clang backend)
    #[arg(long)]
    compile_commands: Option<PathBuf>,
}

#[derive(Args)]
struct RagArgs {
    /// Generate AI summaries and embeddings for the code graph
    #[arg(long)]
    generate_summary: bool,

    /// The LLM API used for summarization
    #[arg(long, value_enum, default_value_t = LlmApiArg::DeepSeek)]
    llm_api: LlmApiArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceParserArg {
    Clang,
    Treesitter,
}

impl From<SourceParserArg> for SourceParserKind {
    fn from(arg: SourceParserArg) -> Self {
        match arg {
            SourceParserArg::Clang => SourceParserKind::Clang,
            SourceParserArg::Treesitter => SourceParserKind::TreeSitter,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DefinesStrategyArg {
    UnwindSequential,
    IsolatedParallel,
    BatchedParallel,
}

impl From<DefinesStrategyArg> for DefinesStrategy {
    fn from(arg: DefinesStrategyArg) -> Self {
        match arg {
            DefinesStrategyArg::UnwindSequential => DefinesStrategy::UnwindSequential,
            DefinesStrategyArg::IsolatedParallel => DefinesStrategy::IsolatedParallel,
            DefinesStrategyArg::BatchedParallel => DefinesStrategy::BatchedParallel,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LlmApiArg {
    Openai,
    DeepSeek,
    Ollama,
    Fake,
}

impl From<LlmApiArg> for LlmApi {
    fn from(arg: LlmApiArg) -> Self {
        match arg {
            LlmApiArg::Openai => LlmApi::OpenAi,
            LlmApiArg::DeepSeek => LlmApi::DeepSeek,
            LlmApiArg::Ollama => LlmApi::Ollama,
            LlmApiArg::Fake => LlmApi::Fake,
        }
    }
}

fn main() -> ExitCode {
    clangraph::logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(workers: &WorkerArgs, batching: Option<&BatchingArgs>) -> Result<Settings> {
    let mut settings = Settings::load().context("could not load configuration")?;
    if let Some(n) = workers.num_parse_workers {
        settings.workers.parse = n.max(1);
    }
    if let Some(n) = workers.num_local_workers {
        settings.workers.local = n.max(1);
    }
    if let Some(n) = workers.num_remote_workers {
        settings.workers.remote = n.max(1);
    }
    if let Some(batching) = batching {
        if let Some(n) = batching.log_batch_size {
            settings.batching.log_batch_size = n.max(1);
        }
        if let Some(n) = batching.cypher_tx_size {
            settings.batching.cypher_tx_size = n.max(1);
        }
        if let Some(n) = batching.ingest_batch_size {
            settings.batching.ingest_batch_size = Some(n.max(1));
        }
    }
    Ok(settings)
}

fn resolve(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("path '{}' does not exist", path.display()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build {
            core,
            workers,
            batching,
            source,
            rag,
            defines_generation,
            keep_orphans,
        } => {
            let settings = load_settings(&workers, Some(&batching))?;
            let options = BuildOptions {
                index_file: core.index_file,
                project_path: resolve(&core.project_path)?,
                source_parser: source.source_parser.into(),
                compile_commands: source.compile_commands,
                defines_strategy: defines_generation.into(),
                generate_summary: rag.generate_summary,
                llm_api: rag.llm_api.into(),
                keep_orphans,
            };
            GraphBuilder::new(settings, options).run()
        }

        Commands::Update {
            core,
            workers,
            batching,
            source,
            rag,
            old_commit,
            new_commit,
        } => {
            let settings = load_settings(&workers, Some(&batching))?;
            let options = UpdateOptions {
                index_file: core.index_file,
                project_path: resolve(&core.project_path)?,
                old_commit,
                new_commit,
                source_parser: source.source_parser.into(),
                compile_commands: source.compile_commands,
                generate_summary: rag.generate_summary,
                llm_api: rag.llm_api.into(),
            };
            Updater::new(settings, options).run()?;
            Ok(())
        }

        Commands::Enrich {
            core,
            workers,
            batching,
            source,
            rag: rag_args,
        } => {
            let settings = load_settings(&workers, Some(&batching))?;
            let options = EnrichOptions {
                index_file: core.index_file,
                project_path: resolve(&core.project_path)?,
                source_parser: source.source_parser.into(),
                compile_commands: source.compile_commands,
                llm_api: rag_args.llm_api.into(),
            };
            run_enrichment(&settings, &options)
        }

        Commands::Spans {
            paths,
            source,
            workers,
            output,
            impacting_header,
        } => {
            let settings = load_settings(&workers, None)?;
            run_spans(&settings, paths, source, output, impacting_header)
        }
    }
}

fn run_spans(
    settings: &Settings,
    paths: Vec<PathBuf>,
    source_args: SourceArgs,
    output: Option<PathBuf>,
    impacting_header: Option<PathBuf>,
) -> Result<()> {
    let mut files: Vec<PathBuf> = Vec::new();
    for path in &paths {
        let resolved = resolve(path)?;
        if resolved.is_dir() {
            files.extend(source::scan_source_files(&resolved));
        } else if matches!(
            resolved.extension().and_then(|e| e.to_str()),
            Some("c") | Some("h")
        ) {
            files.push(resolved);
        }
    }
    files.sort();
    files.dedup();
    if files.is_empty() {
        bail!("no .c or .h files found in the provided paths");
    }

    // The common parent of all inputs acts as the project root.
    let project_root = common_parent(&files);
    let mut parser = source::create_parser(
        source_args.source_parser.into(),
        &project_root,
        source_args.compile_commands.as_deref(),
        settings.workers.parse,
    )?;
    let parsed = source::parse_files(parser.as_mut(), &files)?;

    let text = if let Some(header) = impacting_header {
        let header = resolve(&header)?;
        let impact = impacted_sources(&parsed.include_relations, &[header]);
        let mut lines = Vec::new();
        for (header_path, sources) in impact {
            lines.push(format!("{}:", header_path.display()));
            for source_file in sources {
                lines.push(format!("  - {}", source_file.display()));
            }
        }
        lines.join("\n") + "\n"
    } else {
        spans_yaml::to_yaml(&parsed.function_spans)
    };

    match output {
        Some(path) => {
            std::fs::write(&path, text)
                .with_context(|| format!("could not write {}", path.display()))?;
            println!("Output saved to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn common_parent(files: &[PathBuf]) -> PathBuf {
    let mut iter = files.iter();
    let Some(first) = iter.next() else {
        return PathBuf::from(".");
    };
    let mut prefix = first.parent().unwrap_or(Path::new("/")).to_path_buf();
    for file in iter {
        while !file.starts_with(&prefix) {
            match prefix.parent() {
                Some(parent) => prefix = parent.to_path_buf(),
                None => return PathBuf::from("/"),
            }
        }
    }
    prefix
}
