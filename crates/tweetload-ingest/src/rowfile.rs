//! Row file codec
//!
//! Row files are delimited text, one row per line, one file per
//! (table, worker) pair. An empty unquoted field is NULL; quotes inside a
//! quoted field are doubled. The bulk-transfer statement built by
//! [`RowFormat::copy_options`] declares exactly the same conventions.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tweetload_common::catalog::EntityTable;
use tweetload_common::{IngestError, Result};

use crate::extract::Row;

const ROW_FILE_EXTENSION: &str = "tsv";
const WORKER_MARKER: &str = "__worker";

/// Field separator and quote character shared by writer and loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowFormat {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for RowFormat {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            quote: b'"',
        }
    }
}

impl RowFormat {
    fn writer_builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(true)
            .quote_style(csv::QuoteStyle::Necessary)
            .has_headers(false);
        builder
    }

    fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(true)
            .has_headers(false);
        builder
    }

    /// Option list for `COPY ... FROM STDIN WITH (...)` matching this format.
    pub fn copy_options(&self) -> String {
        let quote = sql_char_literal(self.quote);
        format!(
            "FORMAT csv, DELIMITER {}, QUOTE {quote}, ESCAPE {quote}, NULL ''",
            sql_char_literal(self.delimiter)
        )
    }
}

fn sql_char_literal(byte: u8) -> String {
    match byte {
        b'\t' => "E'\\t'".to_string(),
        b'\'' => "''''".to_string(),
        other => format!("'{}'", other as char),
    }
}

/// File name of a (table, worker) row file: `<table>__worker<id>.tsv`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowFileName {
    pub table: EntityTable,
    pub worker_id: usize,
}

impl RowFileName {
    pub fn new(table: EntityTable, worker_id: usize) -> Self {
        Self { table, worker_id }
    }

    /// Parse a file name produced by [`fmt::Display`]; anything else is `None`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(ROW_FILE_EXTENSION)?.strip_suffix('.')?;
        let (table, worker) = stem.rsplit_once(WORKER_MARKER)?;
        let table = EntityTable::from_name(table).ok()?;
        let worker_id = worker.parse().ok()?;
        Some(Self { table, worker_id })
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.to_string())
    }
}

impl fmt::Display for RowFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}.{}",
            self.table.name(),
            WORKER_MARKER,
            self.worker_id,
            ROW_FILE_EXTENSION
        )
    }
}

/// Name of a worker's malformed-line log
pub fn bad_lines_log_name(worker_id: usize) -> String {
    format!("bad_lines{WORKER_MARKER}{worker_id}.log")
}

/// Delete the malformed-line logs earlier runs left in `dir`.
pub fn remove_bad_lines_logs(dir: &Path) -> Result<()> {
    let prefix = format!("bad_lines{WORKER_MARKER}");
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let is_log = name
            .to_str()
            .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".log"));
        if is_log && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn csv_error(path: &Path, err: csv::Error) -> IngestError {
    IngestError::RowFile(format!("{}: {}", path.display(), err))
}

/// Exclusive writer for one (table, worker) row file
pub struct RowFileWriter {
    table: EntityTable,
    path: PathBuf,
    writer: csv::Writer<BufWriter<File>>,
    record: csv::StringRecord,
    rows_written: u64,
}

impl RowFileWriter {
    /// Create (or truncate) the row file for `name` inside `dir`.
    pub fn create(dir: &Path, name: RowFileName, format: RowFormat) -> Result<Self> {
        let path = name.path_in(dir);
        let file = File::create(&path)?;
        let writer = format.writer_builder().from_writer(BufWriter::new(file));

        Ok(Self {
            table: name.table,
            path,
            writer,
            record: csv::StringRecord::new(),
            rows_written: 0,
        })
    }

    pub fn table(&self) -> EntityTable {
        self.table
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append rows; each must match the table's column count.
    pub fn write_rows(&mut self, rows: &[Row]) -> Result<()> {
        let width = self.table.descriptor().column_count();
        for row in rows {
            if row.len() != width {
                return Err(IngestError::RowFile(format!(
                    "{} row has {} fields, expected {}",
                    self.table,
                    row.len(),
                    width
                )));
            }

            self.record.clear();
            for field in row.fields() {
                self.record.push_field(&field.render());
            }
            self.writer
                .write_record(&self.record)
                .map_err(|e| csv_error(&self.path, e))?;
            self.rows_written += 1;
        }
        Ok(())
    }

    /// Flush buffered output and close the file.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.path)
    }
}

/// Read every record of a row file back as text fields.
pub fn read_row_file(path: &Path, format: RowFormat) -> Result<Vec<Vec<String>>> {
    let mut reader = format
        .reader_builder()
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| csv_error(path, e))
        })
        .collect()
}

/// Row files grouped by target table, the input of the load stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFiles {
    files: [Vec<PathBuf>; EntityTable::COUNT],
}

impl TableFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, table: EntityTable, path: PathBuf) {
        self.files[table.index()].push(path);
    }

    pub fn files(&self, table: EntityTable) -> &[PathBuf] {
        &self.files[table.index()]
    }

    pub fn extend(&mut self, other: TableFiles) {
        for (mine, theirs) in self.files.iter_mut().zip(other.files) {
            mine.extend(theirs);
        }
    }

    pub fn total_files(&self) -> usize {
        self.files.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_files() == 0
    }

    pub(crate) fn sort(&mut self) {
        for files in &mut self.files {
            files.sort();
        }
    }

    /// Delete every listed file; files already gone are ignored.
    pub fn remove_all(&self) -> Result<()> {
        for path in self.files.iter().flatten() {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Collect the row files in `dir`, grouped by table and sorted by path.
pub fn discover_row_files(dir: &Path) -> Result<TableFiles> {
    let mut found = TableFiles::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(RowFileName::parse) else {
            continue;
        };
        found.add(name.table, entry.path());
    }

    found.sort();
    Ok(found)
}
