//! Extraction arena
//!
//! Runs one [`PartitionWorker`] per partition on a blocking thread, at most
//! `workers` at a time. Workers communicate only through the row files they
//! leave on disk; the arena collects their reports once all have returned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tweetload_common::Result;

use crate::partition::{partition_files, PartitionWorker, WorkerReport, WorkerSettings};
use crate::rowfile::TableFiles;

/// Combined outcome of one extraction run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionSummary {
    pub workers: Vec<WorkerReport>,
    pub rows_per_table: BTreeMap<String, u64>,
    #[serde(skip)]
    pub row_files: TableFiles,
    pub duration: Duration,
}

impl ExtractionSummary {
    fn from_reports(mut workers: Vec<WorkerReport>, duration: Duration) -> Self {
        workers.sort_by_key(|w| w.worker_id);

        let mut rows_per_table = BTreeMap::new();
        let mut row_files = TableFiles::new();
        for report in &workers {
            for (table, rows) in &report.rows_per_table {
                *rows_per_table.entry(table.clone()).or_insert(0) += rows;
            }
            row_files.extend(report.row_files.clone());
        }

        Self {
            workers,
            rows_per_table,
            row_files,
            duration,
        }
    }

    pub fn completed_files(&self) -> usize {
        self.workers.iter().map(WorkerReport::completed_files).sum()
    }

    pub fn failed_files(&self) -> usize {
        self.workers.iter().map(WorkerReport::failed_files).sum()
    }

    pub fn skipped_files(&self) -> usize {
        self.workers.iter().map(WorkerReport::skipped_files).sum()
    }

    pub fn bad_lines(&self) -> u64 {
        self.workers.iter().map(|w| w.bad_lines).sum()
    }
}

/// Fixed-size pool of independent extraction workers
pub struct ExtractionArena {
    output_dir: PathBuf,
    workers: usize,
    settings: WorkerSettings,
    show_progress: bool,
}

impl ExtractionArena {
    pub fn new(output_dir: impl Into<PathBuf>, workers: usize, settings: WorkerSettings) -> Self {
        Self {
            output_dir: output_dir.into(),
            workers: workers.max(1),
            settings,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while workers run.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Extract `files` into row files under the output directory.
    ///
    /// A worker that panics is reported as failed for all of its files; the
    /// other workers are unaffected. Once `cancel` fires, workers finish their
    /// current file and skip the rest.
    pub async fn run(&self, files: Vec<PathBuf>, cancel: CancellationToken) -> Result<ExtractionSummary> {
        let start = Instant::now();
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let total_files = files.len();
        let partitions = partition_files(files, self.workers);
        info!(
            files = total_files,
            workers = partitions.len(),
            output_dir = %self.output_dir.display(),
            "Starting extraction"
        );

        let progress = self.progress_bar(total_files as u64);

        let reports: Vec<WorkerReport> = stream::iter(partitions.into_iter().enumerate())
            .map(|(worker_id, files)| {
                let worker = PartitionWorker::new(worker_id, self.output_dir.clone(), self.settings);
                let assigned = files.clone();
                let cancel = cancel.clone();
                let progress = progress.clone();

                async move {
                    let handle = tokio::task::spawn_blocking(move || {
                        worker.run(files, &cancel, &progress)
                    });
                    match handle.await {
                        Ok(report) => report,
                        Err(e) => {
                            error!(worker_id, error = %e, "Extraction worker crashed");
                            WorkerReport::failed(worker_id, assigned, &format!("worker crashed: {e}"))
                        }
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        progress.finish_and_clear();

        let summary = ExtractionSummary::from_reports(reports, start.elapsed());
        info!(
            completed = summary.completed_files(),
            failed = summary.failed_files(),
            skipped = summary.skipped_files(),
            bad_lines = summary.bad_lines(),
            row_files = summary.row_files.total_files(),
            "Extraction complete in {:.2}s",
            summary.duration.as_secs_f64()
        );

        Ok(summary)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} files ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("Extracting");
        pb
    }
}
