//! Batched node and edge writes with server-side micro-transactions.
//!
//! Two knobs shape every write: `ingest_batch_size` (client submission
//! size) and `cypher_tx_size` (server-side transaction size, used by the
//! parallel DEFINES strategy). All writes are `MERGE`-based and idempotent,
//! so a batch can be re-submitted after a transient driver error.

use super::bolt;
use super::database::GraphDatabase;
use crate::error::{StoreError, StoreResult};
use crate::types::CallRelation;
use indicatif::ProgressBar;
use neo4rs::query;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Locking discipline for DEFINES edge creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefinesStrategy {
    /// One `UNWIND … MERGE` transaction per client batch. Deadlock-free;
    /// right for small graphs and updates.
    UnwindSequential,
    /// Server-side parallel iterator per client batch. Fastest for full
    /// builds; requires the APOC plugin.
    #[default]
    BatchedParallel,
    /// Rows grouped by FILE and groups dispatched in parallel, so no two
    /// concurrent transactions touch the same FILE node.
    IsolatedParallel,
}

impl FromStr for DefinesStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unwind-sequential" => Ok(Self::UnwindSequential),
            "batched-parallel" => Ok(Self::BatchedParallel),
            "isolated-parallel" => Ok(Self::IsolatedParallel),
            other => Err(format!("unknown DEFINES strategy '{other}'")),
        }
    }
}

pub const CONSTRAINTS: [&str; 4] = [
    "CREATE CONSTRAINT IF NOT EXISTS FOR (f:FILE) REQUIRE f.path IS UNIQUE",
    "CREATE CONSTRAINT IF NOT EXISTS FOR (f:FOLDER) REQUIRE f.path IS UNIQUE",
    "CREATE CONSTRAINT IF NOT EXISTS FOR (fn:FUNCTION) REQUIRE fn.id IS UNIQUE",
    "CREATE CONSTRAINT IF NOT EXISTS FOR (ds:DATA_STRUCTURE) REQUIRE ds.id IS UNIQUE",
];

const FOLDER_MERGE: &str = "\
UNWIND $rows AS row
MERGE (f:FOLDER {path: row.path})
SET f.name = row.name";

const FOLDER_CONTAINS: &str = "\
UNWIND $rows AS row
MATCH (child:FOLDER {path: row.path})
WITH child, row
MATCH (parent {path: row.parent_path})
MERGE (parent)-[:CONTAINS]->(child)";

const FILE_MERGE: &str = "\
UNWIND $rows AS row
MERGE (f:FILE {path: row.path})
SET f.name = row.name";

const FILE_CONTAINS: &str = "\
UNWIND $rows AS row
MATCH (child:FILE {path: row.path})
WITH child, row
MATCH (parent {path: row.parent_path})
MERGE (parent)-[:CONTAINS]->(child)";

const FUNCTION_MERGE: &str = "\
UNWIND $rows AS row
MERGE (n:FUNCTION {id: row.id})
ON CREATE SET n += row
ON MATCH SET n += row";

const DATA_STRUCTURE_MERGE: &str = "\
UNWIND $rows AS row
MERGE (n:DATA_STRUCTURE {id: row.id})
ON CREATE SET n += row
ON MATCH SET n += row";

pub const DEFINES_MERGE: &str = "\
UNWIND $rows AS row
MATCH (f:FILE {path: row.file_path})
MATCH (n {id: row.id})
MERGE (f)-[:DEFINES]->(n)";

const DEFINES_PARALLEL: &str = "\
CALL apoc.periodic.iterate(
  'UNWIND $rows AS row RETURN row',
  'MATCH (f:FILE {path: row.file_path}) MATCH (n {id: row.id}) MERGE (f)-[:DEFINES]->(n)',
  {batchSize: $tx_size, parallel: true, params: {rows: $rows}})";

pub const CALLS_MERGE: &str = "\
UNWIND $relations AS relation
MATCH (caller:FUNCTION {id: relation.caller_id})
MATCH (callee:FUNCTION {id: relation.callee_id})
MERGE (caller)-[:CALLS]->(callee)";

pub const INCLUDES_MERGE: &str = "\
UNWIND $rows AS row
MATCH (a:FILE {path: row.including_path})
MATCH (b:FILE {path: row.included_path})
MERGE (a)-[:INCLUDES]->(b)";

const ORPHAN_DELETE: &str = "\
MATCH (n)
WHERE COUNT { (n)--() } = 0
DETACH DELETE n
RETURN count(n) AS deleted";

const PURGE_SYMBOLS: &str = "\
UNWIND $paths AS path
MATCH (:FILE {path: path})-[:DEFINES]->(s)
DETACH DELETE s";

const PURGE_FILES: &str = "\
UNWIND $paths AS path
MATCH (f:FILE {path: path})
DETACH DELETE f";

const PURGE_INCLUDES: &str = "\
UNWIND $paths AS path
MATCH (:FILE {path: path})-[r:INCLUDES]->()
DELETE r";

pub struct GraphIngestor<'a> {
    db: &'a GraphDatabase,
    ingest_batch_size: usize,
    cypher_tx_size: usize,
    log_batch_size: usize,
}

impl<'a> GraphIngestor<'a> {
    pub fn new(
        db: &'a GraphDatabase,
        ingest_batch_size: usize,
        cypher_tx_size: usize,
        log_batch_size: usize,
    ) -> Self {
        Self {
            db,
            ingest_batch_size: ingest_batch_size.max(1),
            cypher_tx_size: cypher_tx_size.max(1),
            log_batch_size: log_batch_size.max(1),
        }
    }

    pub fn reset_database(&self) -> StoreResult<()> {
        info!("Deleting existing graph data");
        self.db.run(query("MATCH (n) DETACH DELETE n"))
    }

    pub fn create_constraints(&self) -> StoreResult<()> {
        for constraint in CONSTRAINTS {
            self.db.run(query(constraint))?;
        }
        Ok(())
    }

    /// Create or refresh the PROJECT node, optionally stamping the commit.
    pub fn upsert_project(
        &self,
        project_path: &str,
        name: &str,
        commit_hash: Option<&str>,
    ) -> StoreResult<()> {
        self.db.run(
            query("MERGE (p:PROJECT {path: $path}) SET p.name = $name")
                .param("path", project_path)
                .param("name", name),
        )?;
        if let Some(hash) = commit_hash {
            self.set_commit_hash(project_path, hash)?;
        }
        Ok(())
    }

    pub fn set_commit_hash(&self, project_path: &str, commit_hash: &str) -> StoreResult<()> {
        self.db.run(
            query("MATCH (p:PROJECT {path: $path}) SET p.commit_hash = $hash")
                .param("path", project_path)
                .param("hash", commit_hash),
        )
    }

    pub fn project_commit_hash(&self, project_path: &str) -> StoreResult<Option<String>> {
        self.db.optional_string(
            query("MATCH (p:PROJECT {path: $path}) RETURN p.commit_hash AS hash")
                .param("path", project_path),
            "hash",
        )
    }

    /// The CLI project path must match the one the graph was built for.
    pub fn verify_project_path(&self, project_path: &str) -> StoreResult<()> {
        let graph_path = self
            .db
            .optional_string(query("MATCH (p:PROJECT) RETURN p.path AS path"), "path")?;
        match graph_path {
            Some(graph_path) if graph_path != project_path => {
                Err(StoreError::ProjectPathMismatch {
                    graph_path,
                    cli_path: project_path.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn batched(&self, label: &str, statement: &str, rows: &[Value]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        info!("Writing {} {label} rows in batches", rows.len());
        let bar = ProgressBar::new(rows.len() as u64);
        let mut written = 0usize;
        for chunk in rows.chunks(self.ingest_batch_size) {
            self.db
                .run(query(statement).param("rows", bolt::rows_param(chunk)))?;
            bar.inc(chunk.len() as u64);
            if (written / self.log_batch_size) != ((written + chunk.len()) / self.log_batch_size) {
                debug!("{label}: {} of {} rows written", written + chunk.len(), rows.len());
            }
            written += chunk.len();
        }
        bar.finish_and_clear();
        Ok(())
    }

    /// Nodes and their CONTAINS edge in the same transaction, per batch.
    fn batched_with_contains(
        &self,
        label: &str,
        merge: &str,
        contains: &str,
        rows: &[Value],
    ) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        info!("Writing {} {label} rows in batches", rows.len());
        for chunk in rows.chunks(self.ingest_batch_size) {
            let param = bolt::rows_param(chunk);
            self.db.run_batch(vec![
                query(merge).param("rows", param.clone()),
                query(contains).param("rows", param),
            ])?;
        }
        Ok(())
    }

    pub fn ingest_folders(&self, rows: &[Value]) -> StoreResult<()> {
        self.batched_with_contains("FOLDER", FOLDER_MERGE, FOLDER_CONTAINS, rows)
    }

    pub fn ingest_files(&self, rows: &[Value]) -> StoreResult<()> {
        self.batched_with_contains("FILE", FILE_MERGE, FILE_CONTAINS, rows)
    }

    pub fn ingest_function_nodes(&self, rows: &[Value]) -> StoreResult<()> {
        self.batched("FUNCTION", FUNCTION_MERGE, rows)
    }

    pub fn ingest_data_structure_nodes(&self, rows: &[Value]) -> StoreResult<()> {
        self.batched("DATA_STRUCTURE", DATA_STRUCTURE_MERGE, rows)
    }

    pub fn ingest_defines(&self, rows: &[Value], strategy: DefinesStrategy) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        info!(
            "Writing {} DEFINES rows with the {strategy:?} strategy",
            rows.len()
        );
        match strategy {
            DefinesStrategy::UnwindSequential => self.batched("DEFINES", DEFINES_MERGE, rows),
            DefinesStrategy::BatchedParallel => {
                for chunk in rows.chunks(self.ingest_batch_size) {
                    self.db.run(
                        query(DEFINES_PARALLEL)
                            .param("rows", bolt::rows_param(chunk))
                            .param("tx_size", self.cypher_tx_size as i64),
                    )?;
                }
                Ok(())
            }
            DefinesStrategy::IsolatedParallel => self.ingest_defines_isolated(rows),
        }
    }

    /// Group rows by the FILE they touch and write groups in parallel, so
    /// concurrent transactions never contend on one FILE node.
    fn ingest_defines_isolated(&self, rows: &[Value]) -> StoreResult<()> {
        let mut groups: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
        for row in rows {
            let file = row["file_path"].as_str().unwrap_or_default();
            groups.entry(file).or_default().push(row.clone());
        }
        let groups: Vec<Vec<Value>> = groups.into_values().collect();

        groups
            .par_iter()
            .map(|group| self.batched("DEFINES", DEFINES_MERGE, group))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    pub fn ingest_calls(&self, relations: &[CallRelation]) -> StoreResult<()> {
        if relations.is_empty() {
            info!("No call relations to ingest");
            return Ok(());
        }
        let rows = super::rows::call_rows(relations);
        info!(
            "Writing {} CALLS relationships in batches of {}",
            rows.len(),
            self.ingest_batch_size
        );
        let bar = ProgressBar::new(rows.len() as u64);
        for chunk in rows.chunks(self.ingest_batch_size) {
            self.db
                .run(query(CALLS_MERGE).param("relations", bolt::rows_param(chunk)))?;
            bar.inc(chunk.len() as u64);
        }
        bar.finish_and_clear();
        Ok(())
    }

    pub fn ingest_includes(&self, rows: &[Value]) -> StoreResult<()> {
        self.batched("INCLUDES", INCLUDES_MERGE, rows)
    }

    /// Delete every node with no incident edges. Returns how many went.
    pub fn cleanup_orphans(&self) -> StoreResult<i64> {
        self.db.count(query(ORPHAN_DELETE), "deleted")
    }

    /// Vector indexes for summary embeddings. Creation may fail on editions
    /// without vector support; that is tolerated.
    pub fn create_vector_indexes(&self, dimensions: usize) -> StoreResult<()> {
        for label in ["FUNCTION", "FILE", "FOLDER"] {
            let statement = format!(
                "CREATE VECTOR INDEX {}_summary_embeddings IF NOT EXISTS \
                 FOR (n:{label}) ON (n.summaryEmbedding) \
                 OPTIONS {{indexConfig: {{`vector.dimensions`: {dimensions}, \
                 `vector.similarity_function`: 'cosine'}}}}",
                label.to_lowercase()
            );
            if let Err(e) = self.db.run(query(&statement)) {
                warn!("Could not create vector index for {label} (edition without vector support?): {e}");
                break;
            }
        }
        Ok(())
    }

    /// Delete all symbols defined in the given files, cascading their
    /// DEFINES and CALLS edges.
    pub fn purge_symbols_in_files(&self, paths: &[String]) -> StoreResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        info!("Purging symbols defined in {} files", paths.len());
        self.db
            .run(query(PURGE_SYMBOLS).param("paths", bolt::string_list(paths)))
    }

    /// Delete FILE nodes themselves (for deleted files).
    pub fn purge_files(&self, paths: &[String]) -> StoreResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        info!("Deleting {} FILE nodes", paths.len());
        self.db
            .run(query(PURGE_FILES).param("paths", bolt::string_list(paths)))
    }

    /// Drop INCLUDES edges originating from the given files.
    pub fn purge_include_relations_from(&self, paths: &[String]) -> StoreResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.db
            .run(query(PURGE_INCLUDES).param("paths", bolt::string_list(paths)))
    }
}
