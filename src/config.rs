//! Layered configuration for the graph builder.
//!
//! Sources, later ones winning:
//! - built-in defaults
//! - `clangraph.toml` in the working directory
//! - environment variables with the `CLANGRAPH_` prefix (double underscore
//!   separates nesting: `CLANGRAPH_BATCHING__CYPHER_TX_SIZE=500`)
//! - the `NEO4J_URI` / `NEO4J_USER` / `NEO4J_PASSWORD` variables, applied on
//!   top because their names are fixed by the deployment contract
//! - CLI flags (applied by the caller)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "clangraph.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub batching: BatchingConfig,

    #[serde(default)]
    pub rag: RagConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Bolt endpoint of the graph database.
    #[serde(default = "default_db_uri")]
    pub uri: String,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default = "default_db_password")]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkerConfig {
    /// CPU-bound workers for YAML and source parsing.
    #[serde(default = "default_parse_workers")]
    pub parse: usize,

    /// Workers for locally hosted models.
    #[serde(default = "default_local_workers")]
    pub local: usize,

    /// Fan-out for remote LLM / embedding APIs.
    #[serde(default = "default_remote_workers")]
    pub remote: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchingConfig {
    /// Progress granularity for long loops.
    #[serde(default = "default_log_batch_size")]
    pub log_batch_size: usize,

    /// Target items per server-side transaction.
    #[serde(default = "default_cypher_tx_size")]
    pub cypher_tx_size: usize,

    /// Target items per client submission. Defaults to
    /// `cypher_tx_size * workers.parse` when unset.
    #[serde(default)]
    pub ingest_batch_size: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagConfig {
    /// Dimensionality of the summary embedding vectors.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

fn default_db_uri() -> String {
    "bolt://localhost:7687".to_string()
}
fn default_db_user() -> String {
    "neo4j".to_string()
}
fn default_db_password() -> String {
    "neo4j".to_string()
}
fn default_parse_workers() -> usize {
    num_cpus::get().div_ceil(2)
}
fn default_local_workers() -> usize {
    4
}
fn default_remote_workers() -> usize {
    100
}
fn default_log_batch_size() -> usize {
    1000
}
fn default_cypher_tx_size() -> usize {
    2000
}
fn default_embedding_dimensions() -> usize {
    384
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: default_db_uri(),
            user: default_db_user(),
            password: default_db_password(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            parse: default_parse_workers(),
            local: default_local_workers(),
            remote: default_remote_workers(),
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            log_batch_size: default_log_batch_size(),
            cypher_tx_size: default_cypher_tx_size(),
            ingest_batch_size: None,
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let mut settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("CLANGRAPH_").split("__"))
            .extract()
            .map_err(Box::new)?;
        settings.apply_driver_env();
        Ok(settings)
    }

    /// Effective client submission size.
    pub fn ingest_batch_size(&self) -> usize {
        self.batching
            .ingest_batch_size
            .unwrap_or(self.batching.cypher_tx_size * self.workers.parse.max(1))
    }

    fn apply_driver_env(&mut self) {
        if let Ok(uri) = std::env::var("NEO4J_URI") {
            self.database.uri = uri;
        }
        if let Ok(user) = std::env::var("NEO4J_USER") {
            self.database.user = user;
        }
        if let Ok(password) = std::env::var("NEO4J_PASSWORD") {
            self.database.password = password;
        }
    }
}
