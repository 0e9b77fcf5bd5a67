//! Semantic span extraction with libclang and a compilation database.
//!
//! Each `.c` translation unit is parsed with its recorded compile arguments
//! (sanitized), plus the compiler's own resource include directory. The AST
//! walk is iterative and collects both function definition spans and the
//! include edges recorded by the preprocessor.

use super::{ParsedSources, SourceParser};
use crate::error::{SourceError, SourceResult};
use crate::types::{FileFunctionSpans, FunctionSpan, RelativeLocation};
use clang::{Clang, CompilationDatabase, Entity, EntityKind, Index};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{info, warn};

/// Flags stripped from recorded compile commands. The left set is dropped
/// alone; the right set also consumes its value argument.
const SKIP_FLAGS: [&str; 4] = ["-c", "-MMD", "-fcolor-diagnostics", "-fdiagnostics-color"];
const SKIP_FLAGS_WITH_VALUE: [&str; 3] = ["-o", "-MF", "-MT"];

#[derive(Debug)]
pub struct ClangStrategy {
    project_path: PathBuf,
    db_dir: PathBuf,
    // Keeps a copied compile_commands.json alive for the strategy lifetime.
    _db_tempdir: Option<TempDir>,
    resource_include: Option<PathBuf>,
}

impl ClangStrategy {
    pub fn new(project_path: &Path, compile_commands: Option<&Path>) -> SourceResult<Self> {
        let spec = match compile_commands {
            Some(path) => path.to_path_buf(),
            None => {
                let inferred = project_path.join("compile_commands.json");
                if !inferred.exists() {
                    return Err(SourceError::MissingCompileCommands);
                }
                inferred
            }
        };
        let (db_dir, db_tempdir) = resolve_db_dir(&spec)?;

        Ok(Self {
            project_path: project_path.to_path_buf(),
            db_dir,
            _db_tempdir: db_tempdir,
            resource_include: clang_resource_include(),
        })
    }

    fn sanitize_args(&self, raw: &[String], tu_path: &Path) -> Vec<String> {
        let tu_name = tu_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let mut args = Vec::new();
        let mut skip_next = false;
        // The first recorded argument is the compiler itself.
        for arg in raw.iter().skip(1) {
            if skip_next {
                skip_next = false;
                continue;
            }
            if SKIP_FLAGS.contains(&arg.as_str()) {
                continue;
            }
            if SKIP_FLAGS_WITH_VALUE.contains(&arg.as_str()) {
                skip_next = true;
                continue;
            }
            if Path::new(arg) == tu_path
                || Path::new(arg).file_name().and_then(|n| n.to_str()) == Some(tu_name)
            {
                continue;
            }
            args.push(arg.clone());
        }
        if let Some(include) = &self.resource_include {
            args.push(format!("-I{}", include.display()));
        }
        args
    }
}

fn resolve_db_dir(spec: &Path) -> SourceResult<(PathBuf, Option<TempDir>)> {
    if spec.is_dir() {
        if !spec.join("compile_commands.json").exists() {
            return Err(SourceError::CompilationDatabase {
                path: spec.to_path_buf(),
                reason: "directory contains no compile_commands.json".into(),
            });
        }
        return Ok((spec.to_path_buf(), None));
    }
    if spec.is_file() {
        if spec.file_name().and_then(|n| n.to_str()) == Some("compile_commands.json") {
            let parent = spec.parent().unwrap_or(Path::new(".")).to_path_buf();
            return Ok((parent, None));
        }
        // A database under a different name: libclang insists on the fixed
        // file name, so stage a copy in a temporary directory.
        let tempdir = tempfile::Builder::new()
            .prefix("clangdb_")
            .tempdir()
            .map_err(|e| SourceError::CompilationDatabase {
                path: spec.to_path_buf(),
                reason: e.to_string(),
            })?;
        std::fs::copy(spec, tempdir.path().join("compile_commands.json")).map_err(|e| {
            SourceError::CompilationDatabase {
                path: spec.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        return Ok((tempdir.path().to_path_buf(), Some(tempdir)));
    }
    Err(SourceError::CompilationDatabase {
        path: spec.to_path_buf(),
        reason: "path does not exist".into(),
    })
}

/// Ask the installed compiler where its internal headers live.
fn clang_resource_include() -> Option<PathBuf> {
    let output = Command::new("clang")
        .arg("-print-resource-dir")
        .output()
        .ok()?;
    if !output.status.success() {
        warn!("'clang -print-resource-dir' failed; internal includes may be missing");
        return None;
    }
    let dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if dir.is_empty() {
        return None;
    }
    Some(PathBuf::from(dir).join("include"))
}

/// Zero-based `(line, column)` of an entity's file location.
fn file_position(entity: &Entity) -> Option<(PathBuf, u32, u32)> {
    let location = entity.get_location()?.get_file_location();
    let file = location.file?;
    Some((
        file.get_path(),
        location.line.saturating_sub(1),
        location.column.saturating_sub(1),
    ))
}

/// Position of the identifier token spelling the function's name. Falls
/// back to the cursor location when tokenization fails.
fn name_token_position(entity: &Entity, project_path: &Path) -> Option<(u32, u32)> {
    let name = entity.get_name()?;
    if let Some(range) = entity.get_range() {
        for token in range.tokenize() {
            if token.get_spelling() == name {
                let loc = token.get_location().get_file_location();
                if let Some(file) = loc.file {
                    if file.get_path().starts_with(project_path) {
                        return Some((loc.line.saturating_sub(1), loc.column.saturating_sub(1)));
                    }
                }
            }
        }
    }
    file_position(entity).map(|(_, line, column)| (line, column))
}

struct TuCollector<'a> {
    project_path: &'a Path,
    spans_by_uri: &'a mut HashMap<String, Vec<FunctionSpan>>,
    include_relations: &'a mut BTreeSet<(PathBuf, PathBuf)>,
    // De-duplicates header-defined functions seen through multiple TUs.
    seen_header_functions: &'a mut HashSet<(PathBuf, String, u32, u32)>,
}

impl TuCollector<'_> {
    fn walk(&mut self, root: Entity) {
        let mut stack = vec![root];
        while let Some(entity) = stack.pop() {
            self.visit(&entity);
            let mut children = entity.get_children();
            children.reverse();
            stack.extend(children);
        }
    }

    fn visit(&mut self, entity: &Entity) {
        match entity.get_kind() {
            EntityKind::FunctionDecl if entity.is_definition() => self.visit_function(entity),
            EntityKind::InclusionDirective => self.visit_include(entity),
            _ => {}
        }
    }

    fn visit_function(&mut self, entity: &Entity) {
        let Some((file, line, column)) = file_position(entity) else {
            return;
        };
        if !file.starts_with(self.project_path) {
            return;
        }
        let Some(name) = entity.get_name() else {
            return;
        };

        let in_header = file.extension().is_some_and(|e| e == "h");
        if in_header {
            let key = (file.clone(), name.clone(), line, column);
            if !self.seen_header_functions.insert(key) {
                return;
            }
        }

        let Some(range) = entity.get_range() else {
            return;
        };
        let start = range.get_start().get_file_location();
        let end = range.get_end().get_file_location();
        let Some((name_line, name_column)) = name_token_position(entity, self.project_path) else {
            return;
        };

        let span = FunctionSpan {
            name_location: RelativeLocation::new(
                name_line,
                name_column,
                name_line,
                name_column + name.len() as u32,
            ),
            // Full definition extent: return type and signature included,
            // which downstream summarization relies on.
            body_location: RelativeLocation::new(
                start.line.saturating_sub(1),
                start.column.saturating_sub(1),
                end.line.saturating_sub(1),
                end.column.saturating_sub(1),
            ),
            name,
        };

        let Ok(uri) = url::Url::from_file_path(&file) else {
            return;
        };
        self.spans_by_uri.entry(uri.to_string()).or_default().push(span);
    }

    fn visit_include(&mut self, entity: &Entity) {
        let Some((including, _, _)) = file_position(entity) else {
            return;
        };
        if !including.starts_with(self.project_path) {
            return;
        }
        if let Some(included) = entity.get_file() {
            self.include_relations.insert((including, included.get_path()));
        }
    }
}

impl SourceParser for ClangStrategy {
    fn parse(&mut self, files: &[PathBuf]) -> SourceResult<ParsedSources> {
        let clang = Clang::new().map_err(|reason| SourceError::ClangInit { reason })?;
        let index = Index::new(&clang, false, false);
        let database = CompilationDatabase::from_directory(&self.db_dir).map_err(|_| {
            SourceError::CompilationDatabase {
                path: self.db_dir.clone(),
                reason: "libclang could not load the database".into(),
            }
        })?;

        let source_files: Vec<&PathBuf> = files
            .iter()
            .filter(|f| f.extension().is_some_and(|e| e == "c"))
            .collect();
        if source_files.is_empty() {
            warn!("Clang strategy found no .c translation units to parse");
            return Ok(ParsedSources::default());
        }
        info!("Parsing {} translation units with libclang", source_files.len());

        let mut spans_by_uri: HashMap<String, Vec<FunctionSpan>> = HashMap::new();
        let mut include_relations = BTreeSet::new();
        let mut seen_header_functions = HashSet::new();

        for tu_path in source_files {
            let args = database
                .get_compile_commands(tu_path)
                .ok()
                .map(|commands| {
                    commands
                        .get_commands()
                        .first()
                        .map(|command| self.sanitize_args(&command.get_arguments(), tu_path))
                        .unwrap_or_default()
                })
                .unwrap_or_else(|| {
                    warn!("No compile command for {}", tu_path.display());
                    Vec::new()
                });

            let tu = match index
                .parser(tu_path)
                .arguments(&args)
                .detailed_preprocessing_record(true)
                .parse()
            {
                Ok(tu) => tu,
                Err(e) => {
                    // One broken TU loses only its own spans.
                    warn!("Failed to parse {}: {e}", tu_path.display());
                    continue;
                }
            };

            let mut collector = TuCollector {
                project_path: &self.project_path,
                spans_by_uri: &mut spans_by_uri,
                include_relations: &mut include_relations,
                seen_header_functions: &mut seen_header_functions,
            };
            collector.walk(tu.get_entity());
        }

        let mut function_spans: Vec<FileFunctionSpans> = spans_by_uri
            .into_iter()
            .map(|(file_uri, functions)| FileFunctionSpans {
                file_uri,
                functions,
            })
            .collect();
        function_spans.sort_by(|a, b| a.file_uri.cmp(&b.file_uri));

        Ok(ParsedSources {
            function_spans,
            include_relations,
        })
    }

    fn provides_includes(&self) -> bool {
        true
    }
}
