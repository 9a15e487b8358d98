//! Pipeline driver
//!
//! Sequences the two stages: extraction to completion, then the tiered merge.
//! Inputs can be split into rounds of `round_size` files; each round is
//! extracted and loaded before the next one starts, and its row files are
//! removed afterwards, which bounds the disk space row files occupy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tweetload_common::IngestError;

use crate::arena::{ExtractionArena, ExtractionSummary};
use crate::config::PipelineConfig;
use crate::integrity::IntegrityReporter;
use crate::loader::{LoadReport, PgTableLoader};
use crate::partition::{discover_inputs, WorkerSettings};
use crate::report::CompletionReport;
use crate::rowfile::{discover_row_files, remove_bad_lines_logs, RowFormat, TableFiles};
use crate::scheduler::{MergePlan, MergeScheduler};

/// Prefix of the per-round work directories
pub const ROUND_DIR_PREFIX: &str = "round-";

/// Everything a full run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub rounds: Vec<ExtractionSummary>,
    pub report: CompletionReport,
}

pub struct Pipeline {
    config: PipelineConfig,
    format: RowFormat,
    cancel: CancellationToken,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            format: RowFormat::default(),
            cancel,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            batch_size: self.config.batch_size,
            max_reference_depth: self.config.max_reference_depth,
            format: self.format,
        }
    }

    /// Source files to process, honouring the configured limit.
    pub fn inputs(&self) -> Result<Vec<PathBuf>> {
        discover_inputs(&self.config.data_dir, self.config.limit).with_context(|| {
            format!(
                "Failed to list input files in {}",
                self.config.data_dir.display()
            )
        })
    }

    /// Extract `files` into `output_dir`, replacing row files left by earlier runs.
    pub async fn extract(&self, files: Vec<PathBuf>, output_dir: &Path) -> Result<ExtractionSummary> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        discover_row_files(output_dir)
            .and_then(|stale| stale.remove_all())
            .context("Failed to clear old row files")?;
        remove_bad_lines_logs(output_dir).context("Failed to clear old bad line logs")?;

        let arena = ExtractionArena::new(output_dir, self.config.workers, self.worker_settings())
            .with_progress(self.show_progress);
        let summary = arena.run(files, self.cancel.clone()).await?;

        if summary.failed_files() > 0 {
            warn!(
                failed = summary.failed_files(),
                "Some input files failed; their rows are incomplete"
            );
        }
        Ok(summary)
    }

    /// Run the standard merge plan over `files`.
    pub async fn load(&self, pool: &PgPool, files: &TableFiles) -> Result<Vec<LoadReport>> {
        let plan = MergePlan::standard(files);
        if plan.is_empty() {
            info!("No row files to load");
            return Ok(Vec::new());
        }

        let loader = PgTableLoader::new(pool.clone(), self.format)
            .relaxed_durability(self.config.relaxed_durability);
        let scheduler = MergeScheduler::new(Arc::new(loader), self.config.load_concurrency);
        Ok(scheduler.run(&plan).await?)
    }

    /// Load every row file found in `dir` and in its round directories.
    pub async fn load_dir(&self, pool: &PgPool, dir: &Path) -> Result<Vec<LoadReport>> {
        let files = discover_work_dir(dir)
            .with_context(|| format!("Failed to list row files in {}", dir.display()))?;
        info!(files = files.total_files(), dir = %dir.display(), "Loading row files");
        self.load(pool, &files).await
    }

    /// Audit the target tables.
    pub async fn report(&self, pool: &PgPool) -> Result<CompletionReport> {
        IntegrityReporter::new(pool.clone()).run().await
    }

    /// Discover, extract, load and audit, round by round.
    pub async fn run(&self, pool: &PgPool) -> Result<RunOutcome> {
        let inputs = self.inputs()?;
        let rounds = split_rounds(inputs, self.config.round_size);
        info!(rounds = rounds.len(), "Starting pipeline");

        let mut summaries = Vec::with_capacity(rounds.len());
        let mut loads = Vec::new();

        for (index, files) in rounds.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(IngestError::Cancelled.into());
            }

            let round_dir = self.round_dir(index);
            info!(round = index + 1, files = files.len(), "Starting round");

            let summary = self.extract(files, &round_dir).await?;
            if self.cancel.is_cancelled() {
                warn!(
                    dir = %round_dir.display(),
                    work_dir = %self.config.work_dir.display(),
                    "Cancelled after extraction; row files kept, `tweetload load` picks them up from the work directory"
                );
                return Err(IngestError::Cancelled.into());
            }

            loads.extend(self.load(pool, &summary.row_files).await?);

            if !self.config.keep_row_files {
                summary
                    .row_files
                    .remove_all()
                    .context("Failed to remove row files")?;
            }
            summaries.push(summary);
        }

        let report = self.report(pool).await?.with_loads(loads);
        Ok(RunOutcome {
            rounds: summaries,
            report,
        })
    }

    fn round_dir(&self, index: usize) -> PathBuf {
        match self.config.round_size {
            Some(_) => self
                .config
                .work_dir
                .join(format!("{ROUND_DIR_PREFIX}{:04}", index + 1)),
            None => self.config.work_dir.clone(),
        }
    }
}

/// Row files directly in `dir` plus those in its `round-*` subdirectories.
pub fn discover_work_dir(dir: &Path) -> tweetload_common::Result<TableFiles> {
    let mut found = discover_row_files(dir)?;

    let mut rounds = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let is_round = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(ROUND_DIR_PREFIX));
        if is_round && entry.file_type()?.is_dir() {
            rounds.push(entry.path());
        }
    }
    rounds.sort();
    for round in rounds {
        found.extend(discover_row_files(&round)?);
    }

    found.sort();
    Ok(found)
}

/// Cancel on the first interrupt; returns once a second one arrives.
///
/// Returns `false` if the interrupt stream ends before a second interrupt.
pub async fn watch_interrupts<S>(mut interrupts: S, cancel: CancellationToken) -> bool
where
    S: Stream<Item = ()> + Unpin,
{
    if interrupts.next().await.is_none() {
        return false;
    }
    warn!("Interrupt received; finishing in-flight files (interrupt again to exit)");
    cancel.cancel();

    if interrupts.next().await.is_none() {
        return false;
    }
    warn!("Second interrupt received; exiting");
    true
}

/// Split inputs into rounds; one round when `round_size` is unset.
pub fn split_rounds(files: Vec<PathBuf>, round_size: Option<usize>) -> Vec<Vec<PathBuf>> {
    match round_size {
        Some(size) if size > 0 => files.chunks(size).map(<[PathBuf]>::to_vec).collect(),
        _ => vec![files],
    }
}
