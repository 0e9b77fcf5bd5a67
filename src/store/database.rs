//! Synchronous facade over the Bolt driver.
//!
//! The driver is async; the pipeline is not. The facade owns a runtime and
//! blocks on each call, which also makes it safe to drive from rayon worker
//! threads during parallel ingestion. One instance is shared per process.

use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use neo4rs::{Graph, Query, Row};
use tokio::runtime::Runtime;
use tracing::info;

pub struct GraphDatabase {
    graph: Graph,
    runtime: Runtime,
}

impl GraphDatabase {
    /// Connect and verify connectivity with a trivial query.
    pub fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let graph = runtime
            .block_on(Graph::new(&config.uri, &config.user, &config.password))
            .map_err(|source| StoreError::Connect {
                uri: config.uri.clone(),
                source,
            })?;

        let db = Self { graph, runtime };
        db.run(neo4rs::query("RETURN 1"))
            .map_err(|e| match e {
                StoreError::Query(source) => StoreError::Connect {
                    uri: config.uri.clone(),
                    source,
                },
                other => other,
            })?;
        info!("Connected to graph database at {}", config.uri);
        Ok(db)
    }

    /// Run a single auto-commit write.
    pub fn run(&self, query: Query) -> StoreResult<()> {
        self.runtime.block_on(self.graph.run(query))?;
        Ok(())
    }

    /// Run several writes inside one transaction.
    pub fn run_batch(&self, queries: Vec<Query>) -> StoreResult<()> {
        self.runtime.block_on(async {
            let mut txn = self.graph.start_txn().await?;
            txn.run_queries(queries).await?;
            txn.commit().await
        })?;
        Ok(())
    }

    /// Run a read query and collect all rows.
    pub fn rows(&self, query: Query) -> StoreResult<Vec<Row>> {
        let rows = self.runtime.block_on(async {
            let mut stream = self.graph.execute(query).await?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await? {
                rows.push(row);
            }
            Ok::<_, neo4rs::Error>(rows)
        })?;
        Ok(rows)
    }

    /// Read a single column of strings.
    pub fn string_column(&self, query: Query, column: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .rows(query)?
            .into_iter()
            .filter_map(|row| row.get::<String>(column).ok())
            .collect())
    }

    /// Read one optional string cell from the first row.
    pub fn optional_string(&self, query: Query, column: &str) -> StoreResult<Option<String>> {
        Ok(self
            .rows(query)?
            .into_iter()
            .next()
            .and_then(|row| row.get::<Option<String>>(column).ok())
            .flatten())
    }

    /// Read one integer cell from the first row.
    pub fn count(&self, query: Query, column: &str) -> StoreResult<i64> {
        Ok(self
            .rows(query)?
            .into_iter()
            .next()
            .and_then(|row| row.get::<i64>(column).ok())
            .unwrap_or(0))
    }
}
