//! Partition workers
//!
//! A worker owns a disjoint set of source files and the (table, worker) row
//! files it writes. It streams each file line by line, extracts rows, buffers
//! them per table and flushes a table's buffer once it reaches the batch size,
//! so memory stays bounded by `batch_size × table count` whatever the input
//! size. Workers are synchronous and share nothing; the arena runs each on its
//! own blocking thread.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use indicatif::ProgressBar;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tweetload_common::catalog::EntityTable;
use tweetload_common::{IngestError, Result};

use crate::extract::{Extractor, RowSet};
use crate::rowfile::{bad_lines_log_name, RowFileName, RowFileWriter, RowFormat, TableFiles};

/// Source file suffixes picked up by [`discover_inputs`]
const INPUT_SUFFIXES: [&str; 3] = [".jsonl", ".jsonl.gz", ".json"];

/// Settings shared by every worker of one extraction run
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub batch_size: usize,
    pub max_reference_depth: usize,
    pub format: RowFormat,
}

/// Sorted source files under `data_dir`, optionally capped at `limit`.
pub fn discover_inputs(data_dir: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(data_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if INPUT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            files.push(entry.path());
        }
    }

    files.sort();
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    Ok(files)
}

/// Round-robin assignment of files to at most `workers` disjoint partitions.
pub fn partition_files(files: Vec<PathBuf>, workers: usize) -> Vec<Vec<PathBuf>> {
    let count = workers.max(1).min(files.len());
    let mut partitions = vec![Vec::new(); count];
    for (i, file) in files.into_iter().enumerate() {
        partitions[i % count].push(file);
    }
    partitions
}

/// What happened to one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Completed {
        lines: u64,
        documents: u64,
        bad_lines: u64,
    },
    Failed {
        reason: String,
    },
    /// Not started because the run was cancelled
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Everything one worker did, returned to the arena
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub files: Vec<FileOutcome>,
    pub rows_per_table: BTreeMap<String, u64>,
    pub bad_lines: u64,
    #[serde(skip)]
    pub row_files: TableFiles,
}

impl WorkerReport {
    /// Report for a worker that died before returning, every file marked failed.
    pub fn failed(worker_id: usize, files: Vec<PathBuf>, reason: &str) -> Self {
        Self {
            worker_id,
            files: files
                .into_iter()
                .map(|path| FileOutcome {
                    path,
                    status: FileStatus::Failed {
                        reason: reason.to_string(),
                    },
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn completed_files(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Completed { .. }))
    }

    pub fn failed_files(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed { .. }))
    }

    pub fn skipped_files(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped))
    }

    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.status)).count()
    }
}

/// Marks every completed outcome as failed with `reason`.
fn fail_completed(outcomes: &mut [FileOutcome], reason: &str) {
    for outcome in outcomes {
        if matches!(outcome.status, FileStatus::Completed { .. }) {
            outcome.status = FileStatus::Failed {
                reason: reason.to_string(),
            };
        }
    }
}

#[derive(Debug)]
enum FileError {
    /// Reading the source failed; only this file is affected.
    Source(IngestError),
    /// Writing worker output failed; rows buffered from earlier files are gone too.
    Output(IngestError),
}

#[derive(Debug, Default)]
struct FileCounters {
    lines: u64,
    documents: u64,
    bad_lines: u64,
}

/// Single-threaded extraction over one partition
pub struct PartitionWorker {
    worker_id: usize,
    output_dir: PathBuf,
    settings: WorkerSettings,
    extractor: Extractor,
    buffers: RowSet,
    writers: [Option<RowFileWriter>; EntityTable::COUNT],
    bad_lines_log: Option<BufWriter<File>>,
}

impl PartitionWorker {
    pub fn new(worker_id: usize, output_dir: impl Into<PathBuf>, settings: WorkerSettings) -> Self {
        Self {
            worker_id,
            output_dir: output_dir.into(),
            settings,
            extractor: Extractor::new(settings.max_reference_depth),
            buffers: RowSet::new(),
            writers: std::array::from_fn(|_| None),
            bad_lines_log: None,
        }
    }

    /// Process every assigned file, checking `cancel` before each one.
    pub fn run(
        mut self,
        files: Vec<PathBuf>,
        cancel: &CancellationToken,
        progress: &ProgressBar,
    ) -> WorkerReport {
        let worker_id = self.worker_id;
        info!(worker_id, files = files.len(), "Worker starting");

        let mut outcomes = Vec::with_capacity(files.len());
        let mut bad_lines = 0;
        let mut output_failure: Option<String> = None;

        for path in files {
            if let Some(reason) = &output_failure {
                progress.inc(1);
                outcomes.push(FileOutcome {
                    path,
                    status: FileStatus::Failed {
                        reason: reason.clone(),
                    },
                });
                continue;
            }
            if cancel.is_cancelled() {
                outcomes.push(FileOutcome {
                    path,
                    status: FileStatus::Skipped,
                });
                continue;
            }

            let status = match self.process_file(&path) {
                Ok(counters) => {
                    debug!(
                        worker_id,
                        file = %path.display(),
                        lines = counters.lines,
                        documents = counters.documents,
                        bad_lines = counters.bad_lines,
                        "File processed"
                    );
                    bad_lines += counters.bad_lines;
                    FileStatus::Completed {
                        lines: counters.lines,
                        documents: counters.documents,
                        bad_lines: counters.bad_lines,
                    }
                }
                Err(FileError::Source(e)) => {
                    warn!(worker_id, file = %path.display(), error = %e, "File failed");
                    FileStatus::Failed {
                        reason: e.to_string(),
                    }
                }
                Err(FileError::Output(e)) => {
                    error!(
                        worker_id,
                        file = %path.display(),
                        error = %e,
                        "Worker output failed; stopping"
                    );
                    let reason = format!("worker output failed: {e}");
                    fail_completed(&mut outcomes, &reason);
                    output_failure = Some(reason.clone());
                    FileStatus::Failed { reason }
                }
            };
            progress.inc(1);
            outcomes.push(FileOutcome { path, status });
        }

        let finished = match output_failure {
            Some(_) => None,
            None => match self.finish() {
                Ok(done) => Some(done),
                Err(e) => {
                    warn!(worker_id, error = %e, "Failed to flush row files");
                    fail_completed(&mut outcomes, &format!("final flush failed: {e}"));
                    None
                }
            },
        };
        let (row_files, rows_per_table) =
            finished.unwrap_or_else(|| (TableFiles::new(), BTreeMap::new()));

        let report = WorkerReport {
            worker_id,
            files: outcomes,
            rows_per_table,
            bad_lines,
            row_files,
        };
        info!(
            worker_id,
            completed = report.completed_files(),
            failed = report.failed_files(),
            skipped = report.skipped_files(),
            bad_lines,
            "Worker finished"
        );
        report
    }

    fn process_file(&mut self, path: &Path) -> std::result::Result<FileCounters, FileError> {
        let file = File::open(path).map_err(|e| FileError::Source(e.into()))?;
        let is_gzip = path.extension().is_some_and(|ext| ext == "gz");
        let reader: Box<dyn Read> = if is_gzip {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut reader = BufReader::new(reader);

        let mut counters = FileCounters::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| FileError::Source(e.into()))?;
            if read == 0 {
                break;
            }
            counters.lines += 1;

            buf.retain(|&b| b != 0);
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(document) => {
                    counters.documents += 1;
                    let rows = self.extractor.extract(&document);
                    self.buffers.merge(rows);
                    self.flush_full().map_err(FileError::Output)?;
                }
                Err(e) => {
                    counters.bad_lines += 1;
                    self.log_bad_line(path, counters.lines, &e.to_string(), line)
                        .map_err(FileError::Output)?;
                }
            }
        }

        Ok(counters)
    }

    fn log_bad_line(&mut self, path: &Path, line_no: u64, error: &str, line: &str) -> Result<()> {
        if self.bad_lines_log.is_none() {
            let log_path = self.output_dir.join(bad_lines_log_name(self.worker_id));
            let file = OpenOptions::new().create(true).append(true).open(log_path)?;
            self.bad_lines_log = Some(BufWriter::new(file));
        }
        if let Some(log) = self.bad_lines_log.as_mut() {
            writeln!(log, "{}:{}: {}\n{}\n", path.display(), line_no, error, line)?;
        }
        Ok(())
    }

    fn flush_full(&mut self) -> Result<()> {
        for table in EntityTable::ALL {
            if self.buffers.rows(table).len() >= self.settings.batch_size {
                self.flush_table(table)?;
            }
        }
        Ok(())
    }

    fn flush_table(&mut self, table: EntityTable) -> Result<()> {
        let rows = self.buffers.take(table);
        if rows.is_empty() {
            return Ok(());
        }

        let slot = &mut self.writers[table.index()];
        if slot.is_none() {
            *slot = Some(RowFileWriter::create(
                &self.output_dir,
                RowFileName::new(table, self.worker_id),
                self.settings.format,
            )?);
        }
        match slot.as_mut() {
            Some(writer) => writer.write_rows(&rows),
            None => Ok(()),
        }
    }

    /// Flush remaining buffers and close every row file.
    fn finish(&mut self) -> Result<(TableFiles, BTreeMap<String, u64>)> {
        for table in EntityTable::ALL {
            self.flush_table(table)?;
        }
        if let Some(log) = self.bad_lines_log.as_mut() {
            log.flush()?;
        }

        let mut row_files = TableFiles::new();
        let mut rows_per_table = BTreeMap::new();
        for slot in &mut self.writers {
            if let Some(writer) = slot.take() {
                let table = writer.table();
                rows_per_table.insert(table.name().to_string(), writer.rows_written());
                row_files.add(table, writer.finish()?);
            }
        }
        Ok((row_files, rows_per_table))
    }
}
