//! Integrity reporter
//!
//! Read-only audit run after the merge plan: final row counts per table and,
//! for each declared relationship, how many child rows point at a parent key
//! that does not exist. Dangling references are expected for partial corpora
//! and are never treated as errors.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use tweetload_common::catalog::{EntityTable, Relationship, RELATIONSHIPS};

use crate::report::{CompletionReport, DanglingReference, TableCount};

/// Anti-join count of child rows whose non-null reference has no parent.
pub fn dangling_count_sql(relationship: &Relationship) -> String {
    format!(
        "SELECT COUNT(*) FROM {child} c \
         WHERE c.{column} IS NOT NULL \
         AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.{parent_column} = c.{column})",
        child = relationship.child.name(),
        column = relationship.column,
        parent = relationship.parent.name(),
        parent_column = relationship.parent_column,
    )
}

pub struct IntegrityReporter {
    pool: PgPool,
}

impl IntegrityReporter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn table_count(&self, table: EntityTable) -> Result<i64> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.name()))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {table}"))
    }

    pub async fn dangling_count(&self, relationship: &Relationship) -> Result<i64> {
        sqlx::query_scalar(&dangling_count_sql(relationship))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to audit {}", relationship.label()))
    }

    pub async fn tweets_without_author(&self) -> Result<i64> {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE user_id IS NULL",
            EntityTable::Tweets.name()
        ))
        .fetch_one(&self.pool)
        .await
        .context("Failed to count tweets without author")
    }

    /// Run every count and assemble the report.
    pub async fn run(&self) -> Result<CompletionReport> {
        let mut table_counts = Vec::with_capacity(EntityTable::COUNT);
        for table in EntityTable::ALL {
            let rows = self.table_count(table).await?;
            table_counts.push(TableCount {
                table: table.name().to_string(),
                rows,
            });
        }

        let mut dangling_references = Vec::with_capacity(RELATIONSHIPS.len());
        for relationship in RELATIONSHIPS {
            let missing = self.dangling_count(relationship).await?;
            if missing > 0 {
                info!(relationship = %relationship.label(), missing, "Dangling references");
            }
            dangling_references.push(DanglingReference {
                relationship: relationship.label(),
                missing,
            });
        }

        let tweets_without_author = self.tweets_without_author().await?;

        Ok(CompletionReport {
            generated_at: Utc::now(),
            table_counts,
            dangling_references,
            tweets_without_author,
            loads: Vec::new(),
        })
    }
}
