//! Bulk loader
//!
//! Loads one table's row files through a private staging table:
//!
//! 1. `CREATE TEMP TABLE` shaped like the target, constraints excluded
//! 2. `COPY ... FROM STDIN` every row file
//! 3. index the staging table
//! 4. run the task's derivation, if any
//! 5. `INSERT ... ON CONFLICT DO NOTHING` into the target
//! 6. drop the staging table and commit
//!
//! Everything runs in one transaction on one connection, so any failure leaves
//! the target table untouched. Re-running a load with the same files is a no-op
//! apart from the work done.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use tweetload_common::catalog::EntityTable;

use crate::config::DatabaseConfig;
use crate::rowfile::RowFormat;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Pre-merge derivation steps a load task may run against its staged rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    /// Insert a minimal author row for every mentioned account not yet present
    MissingAuthorsFromMentions,
}

impl Derivation {
    /// The table whose staged rows the derivation reads
    pub fn source(self) -> EntityTable {
        match self {
            Derivation::MissingAuthorsFromMentions => EntityTable::TweetMentions,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Derivation::MissingAuthorsFromMentions => "missing_authors_from_mentions",
        }
    }

    fn statement(self, staging: &str) -> String {
        match self {
            Derivation::MissingAuthorsFromMentions => format!(
                "INSERT INTO {users} (id, screen_name, name) \
                 SELECT mentioned_user_id, mentioned_screen_name, mentioned_name \
                 FROM {staging} \
                 WHERE mentioned_user_id IS NOT NULL \
                 ON CONFLICT (id) DO NOTHING",
                users = EntityTable::Users.name(),
            ),
        }
    }
}

/// Secondary index built on a staging table before merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingIndex {
    pub columns: Vec<&'static str>,
}

impl StagingIndex {
    pub fn new(columns: &[&'static str]) -> Self {
        Self {
            columns: columns.to_vec(),
        }
    }

    /// Index over the table's natural key
    pub fn natural_key(table: EntityTable) -> Self {
        Self::new(table.descriptor().key)
    }
}

/// One table's load: its row files plus optional index and derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTask {
    pub table: EntityTable,
    pub files: Vec<PathBuf>,
    pub indexes: Vec<StagingIndex>,
    pub derivation: Option<Derivation>,
}

impl MergeTask {
    pub fn new(table: EntityTable, files: Vec<PathBuf>) -> Self {
        Self {
            table,
            files,
            indexes: vec![StagingIndex::natural_key(table)],
            derivation: None,
        }
    }

    pub fn with_index(mut self, index: StagingIndex) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_derivation(mut self, derivation: Derivation) -> Self {
        self.derivation = Some(derivation);
        self
    }

    fn staging_table(&self) -> String {
        format!("tmp_{}", self.table.name())
    }
}

/// Outcome of one successful load
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub table: EntityTable,
    pub files: usize,
    /// Rows bulk-transferred into staging
    pub staged_rows: u64,
    /// Rows new to the target table
    pub inserted_rows: u64,
    /// Rows written by the derivation step
    pub derived_rows: u64,
    pub duration: Duration,
}

/// Executes a [`MergeTask`] against the target store
#[async_trait]
pub trait TableLoader: Send + Sync {
    async fn load(&self, task: &MergeTask) -> Result<LoadReport>;
}

/// Open a connection pool for the target database.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .connect(&config.url)
        .await
        .context("Failed to connect to database")
}

/// [`TableLoader`] backed by PostgreSQL
#[derive(Clone)]
pub struct PgTableLoader {
    pool: PgPool,
    format: RowFormat,
    relaxed_durability: bool,
}

impl PgTableLoader {
    pub fn new(pool: PgPool, format: RowFormat) -> Self {
        Self {
            pool,
            format,
            relaxed_durability: false,
        }
    }

    /// Commit load transactions without waiting for the WAL flush.
    pub fn relaxed_durability(mut self, relaxed: bool) -> Self {
        self.relaxed_durability = relaxed;
        self
    }

    async fn copy_file(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        statement: &str,
        path: &Path,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open row file {}", path.display()))?;

        let mut copy = tx
            .copy_in_raw(statement)
            .await
            .context("Failed to start COPY")?;

        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        loop {
            let n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    copy.abort(e.to_string()).await.ok();
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = copy.send(&buf[..n]).await {
                copy.abort(e.to_string()).await.ok();
                return Err(e).with_context(|| format!("COPY failed for {}", path.display()));
            }
        }

        copy.finish()
            .await
            .with_context(|| format!("COPY failed for {}", path.display()))
    }
}

#[async_trait]
impl TableLoader for PgTableLoader {
    async fn load(&self, task: &MergeTask) -> Result<LoadReport> {
        let start = Instant::now();
        let descriptor = task.table.descriptor();
        let staging = task.staging_table();
        let columns = descriptor.column_list();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin load transaction")?;

        if self.relaxed_durability {
            sqlx::query("SET LOCAL synchronous_commit = off")
                .execute(&mut *tx)
                .await
                .context("Failed to relax durability")?;
        }

        sqlx::query(&format!(
            "CREATE TEMP TABLE {staging} (LIKE {} INCLUDING DEFAULTS EXCLUDING CONSTRAINTS)",
            descriptor.name
        ))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to create staging table {staging}"))?;

        let copy_statement = format!(
            "COPY {staging} ({columns}) FROM STDIN WITH ({})",
            self.format.copy_options()
        );
        let mut staged_rows = 0;
        for path in &task.files {
            let rows = self.copy_file(&mut tx, &copy_statement, path).await?;
            debug!(table = %task.table, file = %path.display(), rows, "Row file staged");
            staged_rows += rows;
        }

        for index in &task.indexes {
            sqlx::query(&format!(
                "CREATE INDEX ON {staging} ({})",
                index.columns.join(", ")
            ))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to index {staging}"))?;
        }

        let mut derived_rows = 0;
        if let Some(derivation) = task.derivation {
            derived_rows = sqlx::query(&derivation.statement(&staging))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Derivation {} failed", derivation.name()))?
                .rows_affected();
            info!(
                table = %task.table,
                derivation = derivation.name(),
                rows = derived_rows,
                "Derivation applied"
            );
        }

        let inserted_rows = sqlx::query(&format!(
            "INSERT INTO {table} ({columns}) SELECT {columns} FROM {staging} \
             ON CONFLICT ({key}) DO NOTHING",
            table = descriptor.name,
            key = descriptor.key_list(),
        ))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to merge into {}", descriptor.name))?
        .rows_affected();

        sqlx::query(&format!("DROP TABLE {staging}"))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to drop {staging}"))?;

        tx.commit().await.context("Failed to commit load")?;

        let report = LoadReport {
            table: task.table,
            files: task.files.len(),
            staged_rows,
            inserted_rows,
            derived_rows,
            duration: start.elapsed(),
        };
        info!(
            table = %task.table,
            files = report.files,
            staged = staged_rows,
            inserted = inserted_rows,
            "Table loaded in {:.2}s",
            report.duration.as_secs_f64()
        );
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_task_defaults_to_natural_key_index() {
        let task = MergeTask::new(EntityTable::TweetUrls, vec![]);
        assert_eq!(task.indexes, vec![StagingIndex::new(&["tweet_id", "url"])]);
        assert_eq!(task.derivation, None);
        assert_eq!(task.staging_table(), "tmp_tweet_urls");
    }

    #[test]
    fn test_derivation_statement() {
        let derivation = Derivation::MissingAuthorsFromMentions;
        assert_eq!(derivation.source(), EntityTable::TweetMentions);

        let sql = derivation.statement("tmp_tweet_user_mentions");
        assert!(sql.starts_with("INSERT INTO users (id, screen_name, name) SELECT mentioned_user_id"));
        assert!(sql.contains("FROM tmp_tweet_user_mentions"));
        assert!(sql.ends_with("ON CONFLICT (id) DO NOTHING"));
    }
}
