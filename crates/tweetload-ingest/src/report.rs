//! Completion report

use std::fmt;

use chrono::{DateTime, Utc};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::loader::LoadReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

/// Child rows whose parent key is absent, for one relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingReference {
    pub relationship: String,
    pub missing: i64,
}

/// End-of-run summary: final table sizes and referential gaps
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub generated_at: DateTime<Utc>,
    pub table_counts: Vec<TableCount>,
    pub dangling_references: Vec<DanglingReference>,
    /// Tweets whose author could not be resolved
    pub tweets_without_author: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loads: Vec<LoadReport>,
}

impl CompletionReport {
    pub fn with_loads(mut self, loads: Vec<LoadReport>) -> Self {
        self.loads = loads;
        self
    }

    pub fn total_dangling(&self) -> i64 {
        self.dangling_references.iter().map(|d| d.missing).sum()
    }

    pub fn count_for(&self, table: &str) -> Option<i64> {
        self.table_counts
            .iter()
            .find(|c| c.table == table)
            .map(|c| c.rows)
    }

    pub fn missing_for(&self, relationship: &str) -> Option<i64> {
        self.dangling_references
            .iter()
            .find(|d| d.relationship == relationship)
            .map(|d| d.missing)
    }

    fn loads_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Table", "Files", "Staged", "Inserted", "Derived", "Seconds"]);
        for load in &self.loads {
            table.add_row(vec![
                load.table.name().to_string(),
                load.files.to_string(),
                load.staged_rows.to_string(),
                load.inserted_rows.to_string(),
                load.derived_rows.to_string(),
                format!("{:.2}", load.duration.as_secs_f64()),
            ]);
        }
        table
    }

    fn counts_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Table", "Rows"]);
        for count in &self.table_counts {
            table.add_row(vec![count.table.clone(), count.rows.to_string()]);
        }
        table
    }

    fn dangling_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Relationship", "Missing parents"]);
        for dangling in &self.dangling_references {
            table.add_row(vec![dangling.relationship.clone(), dangling.missing.to_string()]);
        }
        table.add_row(vec![
            "tweets without author".to_string(),
            self.tweets_without_author.to_string(),
        ]);
        table
    }
}

impl fmt::Display for CompletionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.loads.is_empty() {
            writeln!(f, "Loads")?;
            writeln!(f, "{}", self.loads_table())?;
        }
        writeln!(f, "Table counts")?;
        writeln!(f, "{}", self.counts_table())?;
        writeln!(f, "Referential completeness")?;
        write!(f, "{}", self.dangling_table())
    }
}
