//! Statement vocabulary understood by executors.
//!
//! The transaction layer treats statements as opaque values. Only the engine
//! behind a [`crate::StatementExecutor`] interprets them.

use std::collections::BTreeMap;
use std::fmt;

/// Name of the implicit primary-key column present on every table.
pub const ID_COLUMN: &str = "id";

/// A scalar column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Int(i64),
    /// UTF-8 text.
    Text(String),
}

impl Value {
    /// Creates a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true for NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One record, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a column value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Returns an integer column.
    #[must_use]
    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_int)
    }

    /// Returns a text column.
    #[must_use]
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_text)
    }

    /// Returns the primary key.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.text(ID_COLUMN)
    }

    /// Sets a column value.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), value);
    }

    /// Returns true if every predicate matches this row.
    #[must_use]
    pub fn matches(&self, filter: &[Predicate]) -> bool {
        filter
            .iter()
            .all(|p| self.get(&p.column).unwrap_or(&Value::Null) == &p.value)
    }

    /// Iterates over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }
}

/// An equality predicate `column = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Column name.
    pub column: String,
    /// Expected value.
    pub value: Value,
}

impl Predicate {
    /// Creates a predicate.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// A single statement sent to an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Opens an explicit transaction block.
    Begin,
    /// Commits the open block.
    Commit,
    /// Discards the open block.
    Rollback,
    /// Inserts a new row.
    Insert {
        /// Target table.
        table: String,
        /// Primary key.
        id: String,
        /// Column values.
        values: Vec<(String, Value)>,
    },
    /// Reads one row by primary key.
    Get {
        /// Target table.
        table: String,
        /// Primary key.
        id: String,
        /// Extra predicates the row must satisfy.
        filter: Vec<Predicate>,
    },
    /// Reads every row matching a filter, in primary-key order.
    Scan {
        /// Target table.
        table: String,
        /// Predicates rows must satisfy.
        filter: Vec<Predicate>,
        /// Maximum number of rows returned.
        limit: Option<usize>,
    },
    /// Updates one row by primary key.
    Update {
        /// Target table.
        table: String,
        /// Primary key.
        id: String,
        /// Assignments.
        set: Vec<(String, Value)>,
        /// Extra predicates the row must satisfy.
        filter: Vec<Predicate>,
    },
    /// Deletes one row by primary key.
    Delete {
        /// Target table.
        table: String,
        /// Primary key.
        id: String,
        /// Extra predicates the row must satisfy.
        filter: Vec<Predicate>,
    },
}

fn owned_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Vec<(String, Value)> {
    pairs
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}

impl Statement {
    /// Builds an insert.
    pub fn insert<'a>(
        table: &str,
        id: impl Into<String>,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Self {
        Self::Insert {
            table: table.to_string(),
            id: id.into(),
            values: owned_pairs(values),
        }
    }

    /// Builds a point read.
    pub fn get(table: &str, id: impl Into<String>) -> Self {
        Self::Get {
            table: table.to_string(),
            id: id.into(),
            filter: Vec::new(),
        }
    }

    /// Builds an unfiltered scan.
    pub fn scan(table: &str) -> Self {
        Self::Scan {
            table: table.to_string(),
            filter: Vec::new(),
            limit: None,
        }
    }

    /// Builds an update.
    pub fn update<'a>(
        table: &str,
        id: impl Into<String>,
        set: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Self {
        Self::Update {
            table: table.to_string(),
            id: id.into(),
            set: owned_pairs(set),
            filter: Vec::new(),
        }
    }

    /// Builds a delete.
    pub fn delete(table: &str, id: impl Into<String>) -> Self {
        Self::Delete {
            table: table.to_string(),
            id: id.into(),
            filter: Vec::new(),
        }
    }

    /// Adds a `column = value` predicate. No effect on control or insert statements.
    #[must_use]
    pub fn filter(mut self, column: &str, value: impl Into<Value>) -> Self {
        if let Some(filter) = self.filter_mut() {
            filter.push(Predicate::eq(column, value));
        }
        self
    }

    /// Limits the number of rows a scan returns.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        if let Self::Scan { limit, .. } = &mut self {
            *limit = Some(n);
        }
        self
    }

    /// Mutable access to the filter of a filtered statement.
    pub fn filter_mut(&mut self) -> Option<&mut Vec<Predicate>> {
        match self {
            Self::Get { filter, .. }
            | Self::Scan { filter, .. }
            | Self::Update { filter, .. }
            | Self::Delete { filter, .. } => Some(filter),
            _ => None,
        }
    }

    /// Returns the target table, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Insert { table, .. }
            | Self::Get { table, .. }
            | Self::Scan { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Returns true for `Begin`, `Commit` and `Rollback`.
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Begin | Self::Commit | Self::Rollback)
    }

    /// Returns true for statements that mutate rows.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Insert { .. } | Self::Update { .. } | Self::Delete { .. }
        )
    }
}

/// Result of a successful statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A control or write statement; `affected` rows were touched.
    Done {
        /// Number of rows written.
        affected: usize,
    },
    /// Rows returned by a read.
    Rows(Vec<Row>),
}

impl Outcome {
    /// Number of rows affected (or returned, for reads).
    #[must_use]
    pub fn affected(&self) -> usize {
        match self {
            Self::Done { affected } => *affected,
            Self::Rows(rows) => rows.len(),
        }
    }

    /// Consumes the outcome, returning any rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Done { .. } => Vec::new(),
            Self::Rows(rows) => rows,
        }
    }

    /// Consumes the outcome, returning the first row if present.
    #[must_use]
    pub fn into_first(self) -> Option<Row> {
        self.into_rows().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_applies_only_to_filtered_statements() {
        let get = Statement::get("t", "1").filter("org", 7_i64);
        assert_eq!(
            get,
            Statement::Get {
                table: "t".into(),
                id: "1".into(),
                filter: vec![Predicate::eq("org", 7_i64)],
            }
        );

        let insert = Statement::insert("t", "1", [("a", Value::Int(1))]).filter("org", 7_i64);
        assert_eq!(insert, Statement::insert("t", "1", [("a", Value::Int(1))]));
        assert_eq!(Statement::Begin.filter("org", 7_i64), Statement::Begin);
    }

    #[test]
    fn row_matches_missing_column_as_null() {
        let mut row = Row::new();
        row.set("status", Value::text("free"));

        assert!(row.matches(&[Predicate::eq("status", "free")]));
        assert!(!row.matches(&[Predicate::eq("status", "held")]));
        assert!(row.matches(&[Predicate::eq("holder_id", Value::Null)]));
    }

    #[test]
    fn statement_classification() {
        assert!(Statement::Commit.is_control());
        assert!(Statement::delete("t", "1").is_write());
        assert!(!Statement::scan("t").is_write());
        assert_eq!(Statement::scan("t").table(), Some("t"));
        assert_eq!(Statement::Rollback.table(), None);
    }

    #[test]
    fn outcome_accessors() {
        let mut row = Row::new();
        row.set(ID_COLUMN, Value::text("a"));
        let outcome = Outcome::Rows(vec![row.clone()]);
        assert_eq!(outcome.affected(), 1);
        assert_eq!(outcome.into_first(), Some(row));
        assert!(Outcome::Done { affected: 3 }.into_rows().is_empty());
    }
}
