//! Extracted rows, grouped per entity table

use std::borrow::Cow;
use tweetload_common::catalog::EntityTable;

/// One column value. An empty rendering means SQL NULL in a row file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Null,
    Int(i64),
    Bool(bool),
    Text(String),
}

impl Field {
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Field::Null => Cow::Borrowed(""),
            Field::Int(n) => Cow::Owned(n.to_string()),
            Field::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Field::Text(s) => Cow::Borrowed(s.as_str()),
        }
    }

    /// True when the rendered value is empty and will load as NULL.
    pub fn is_null(&self) -> bool {
        match self {
            Field::Null => true,
            Field::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl From<Option<i64>> for Field {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Field::Null, Field::Int)
    }
}

impl From<Option<bool>> for Field {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Field::Null, Field::Bool)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Int(value)
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Text(value)
    }
}

/// Ordered tuple of column values for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(Vec<Field>);

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&Field> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Rows contributed by one or more documents, per table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSet {
    tables: [Vec<Row>; EntityTable::COUNT],
}

impl Default for RowSet {
    fn default() -> Self {
        Self {
            tables: std::array::from_fn(|_| Vec::new()),
        }
    }
}

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: EntityTable, row: Row) {
        debug_assert_eq!(
            row.len(),
            table.descriptor().column_count(),
            "row width does not match {}",
            table
        );
        self.tables[table.index()].push(row);
    }

    pub fn rows(&self, table: EntityTable) -> &[Row] {
        &self.tables[table.index()]
    }

    /// Remove and return one table's rows, leaving it empty.
    pub fn take(&mut self, table: EntityTable) -> Vec<Row> {
        std::mem::take(&mut self.tables[table.index()])
    }

    /// Fold another set into this one, table by table.
    pub fn merge(&mut self, other: RowSet) {
        for (mine, theirs) in self.tables.iter_mut().zip(other.tables) {
            mine.extend(theirs);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(Vec::is_empty)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }

    /// Consume the set, yielding every table (including empty ones) with its rows.
    pub fn into_tables(self) -> impl Iterator<Item = (EntityTable, Vec<Row>)> {
        EntityTable::ALL.into_iter().zip(self.tables)
    }
}
