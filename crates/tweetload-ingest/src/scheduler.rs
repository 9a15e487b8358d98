//! Merge scheduler
//!
//! Loads tables in dependency order. Tier 1 (authors, locations, tags) runs in
//! parallel; tier 2 (tweets) starts only once every tier-1 load has committed;
//! tier 3 (tweet children) only once tier 2 has. The first failed load halts
//! the plan. Tiers already committed stay committed, which is safe because
//! every load can be re-run.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{error, info};
use tweetload_common::catalog::{EntityTable, Tier};
use tweetload_common::{IngestError, Result};

use crate::loader::{Derivation, LoadReport, MergeTask, StagingIndex, TableLoader};
use crate::rowfile::TableFiles;

/// Tasks of one tier; they run concurrently and must not depend on each other
#[derive(Debug, Clone)]
pub struct PlannedTier {
    pub tier: Tier,
    pub tasks: Vec<MergeTask>,
}

/// Tier-ordered list of load tasks
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    tiers: Vec<PlannedTier>,
}

impl MergePlan {
    /// The fixed plan: one task per table that has row files, grouped by tier.
    ///
    /// The mentions task also derives author rows for mentioned accounts.
    pub fn standard(files: &TableFiles) -> Self {
        let tiers = Tier::ALL
            .into_iter()
            .map(|tier| PlannedTier {
                tier,
                tasks: EntityTable::tables_in_tier(tier)
                    .filter(|table| !files.files(*table).is_empty())
                    .map(|table| standard_task(table, files.files(table).to_vec()))
                    .collect(),
            })
            .filter(|planned| !planned.tasks.is_empty())
            .collect();

        Self { tiers }
    }

    pub fn tiers(&self) -> &[PlannedTier] {
        &self.tiers
    }

    pub fn task_count(&self) -> usize {
        self.tiers.iter().map(|t| t.tasks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

fn standard_task(table: EntityTable, files: Vec<std::path::PathBuf>) -> MergeTask {
    let task = MergeTask::new(table, files);
    match table {
        EntityTable::TweetMentions => task
            .with_index(StagingIndex::new(&["mentioned_user_id"]))
            .with_derivation(Derivation::MissingAuthorsFromMentions),
        _ => task,
    }
}

/// Runs a [`MergePlan`] tier by tier with bounded concurrency inside each tier
pub struct MergeScheduler<L> {
    loader: Arc<L>,
    concurrency: usize,
}

impl<L: TableLoader> MergeScheduler<L> {
    pub fn new(loader: Arc<L>, concurrency: usize) -> Self {
        Self {
            loader,
            concurrency: concurrency.max(1),
        }
    }

    /// Execute the plan, returning one report per task in completion order.
    ///
    /// Stops at the first failing task with [`IngestError::MergeFailed`]; loads
    /// still running in that tier are dropped, which rolls their transactions back.
    pub async fn run(&self, plan: &MergePlan) -> Result<Vec<LoadReport>> {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(plan.task_count());

        for planned in plan.tiers() {
            info!(
                tier = planned.tier.level(),
                tasks = planned.tasks.len(),
                "Starting {}",
                planned.tier
            );

            let mut loads = stream::iter(&planned.tasks)
                .map(|task| {
                    let loader = Arc::clone(&self.loader);
                    async move { (task.table, loader.load(task).await) }
                })
                .buffer_unordered(self.concurrency);

            while let Some((table, outcome)) = loads.next().await {
                match outcome {
                    Ok(report) => reports.push(report),
                    Err(e) => {
                        let reason = format!("{e:#}");
                        error!(
                            tier = planned.tier.level(),
                            table = %table,
                            error = %reason,
                            "Load failed, halting merge plan"
                        );
                        return Err(IngestError::MergeFailed {
                            tier: planned.tier.level(),
                            table: table.name().to_string(),
                            reason,
                        });
                    }
                }
            }

            info!(tier = planned.tier.level(), "Completed {}", planned.tier);
        }

        info!(
            tasks = reports.len(),
            "Merge plan complete in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(reports)
    }
}
