//! In-memory reference engine.

use crate::error::{ExecError, ExecResult};
use crate::executor::{Connector, StatementExecutor};
use crate::statement::{Outcome, Predicate, Row, Statement, Value, ID_COLUMN};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

const ABORTED_BLOCK: &str =
    "current transaction is aborted, commands ignored until end of transaction block";

/// Buffered writes keyed by `(table, id)`; `None` marks a delete.
type Overlay = BTreeMap<(String, String), Option<Row>>;

#[derive(Debug, Default)]
struct Table {
    columns: BTreeSet<String>,
    rows: BTreeMap<String, Row>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<HashMap<String, Table>>,
    executed: AtomicU64,
    write_faults: Mutex<VecDeque<ExecError>>,
    unavailable: AtomicBool,
}

/// An in-memory engine with per-statement auto-commit and explicit blocks.
///
/// This engine models the behavior the reservation core is built around:
/// - Outside a `Begin` block, every statement has an implicit begin and
///   commit wrapped around it. A failing statement never undoes an earlier one.
/// - Inside a block, writes are buffered on the connection and applied
///   atomically on `Commit`.
/// - After a failure inside a block, the engine refuses every statement until
///   the block is ended.
///
/// Isolation is read-committed. There is no conflict detection; callers
/// serialize conflicting writers with locks.
///
/// # Thread Safety
///
/// The engine is cheap to clone and every clone shares the same tables.
///
/// # Example
///
/// ```rust
/// use reservo_executor::{Connector, InMemoryEngine, Statement, StatementExecutor, Value};
///
/// let engine = InMemoryEngine::new();
/// engine.create_table("employees", &["last_name"]).unwrap();
/// let mut conn = engine.connect().unwrap();
///
/// conn.execute(&Statement::insert("employees", "1", [("last_name", Value::text("A"))])).unwrap();
/// conn.execute(&Statement::update("employees", "1", [("last_name", Value::text(""))])).unwrap();
/// let bad = conn.execute(&Statement::update("employees", "1", [("sss", Value::text("x"))]));
/// assert!(bad.is_err());
///
/// // The first update was committed on its own.
/// let row = engine.row("employees", "1").unwrap();
/// assert_eq!(row.text("last_name"), Some(""));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    shared: Arc<Shared>,
}

impl InMemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with the given columns. The `id` column is implicit.
    ///
    /// # Errors
    ///
    /// Returns a data error if the table already exists.
    pub fn create_table(&self, name: &str, columns: &[&str]) -> ExecResult<()> {
        let mut tables = self.shared.tables.write();
        if tables.contains_key(name) {
            return Err(ExecError::data(format!("relation \"{name}\" already exists")));
        }
        let table = Table {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows: BTreeMap::new(),
        };
        tables.insert(name.to_string(), table);
        Ok(())
    }

    /// Reads a committed row, bypassing any connection.
    #[must_use]
    pub fn row(&self, table: &str, id: &str) -> Option<Row> {
        self.shared
            .tables
            .read()
            .get(table)
            .and_then(|t| t.rows.get(id).cloned())
    }

    /// Returns the number of committed rows in a table.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.shared
            .tables
            .read()
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// Returns how many statements have reached the engine.
    #[must_use]
    pub fn statements_executed(&self) -> u64 {
        self.shared.executed.load(Ordering::SeqCst)
    }

    /// Makes the next write statement on any connection fail with `error`.
    ///
    /// Faults queue up and fire in order, one per write.
    pub fn fail_next_write(&self, error: ExecError) {
        self.shared.write_faults.lock().push_back(error);
    }

    /// Fails every statement with a connection error while `value` is true.
    pub fn set_unavailable(&self, value: bool) {
        self.shared.unavailable.store(value, Ordering::SeqCst);
    }
}

impl Connector for InMemoryEngine {
    type Connection = InMemoryConnection;

    fn connect(&self) -> ExecResult<InMemoryConnection> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(ExecError::connection("could not connect to engine"));
        }
        Ok(InMemoryConnection {
            shared: Arc::clone(&self.shared),
            block: None,
        })
    }
}

#[derive(Debug, Default)]
struct Block {
    writes: Overlay,
    aborted: bool,
}

/// A connection to an [`InMemoryEngine`].
///
/// Dropping a connection with an open block discards the block.
#[derive(Debug)]
pub struct InMemoryConnection {
    shared: Arc<Shared>,
    block: Option<Block>,
}

impl InMemoryConnection {
    /// Returns true while an explicit block is open.
    #[must_use]
    pub fn in_block(&self) -> bool {
        self.block.is_some()
    }

    fn run(&mut self, statement: &Statement) -> ExecResult<Outcome> {
        if statement.is_write() {
            if let Some(fault) = self.shared.write_faults.lock().pop_front() {
                tracing::debug!(error = %fault, "injected write fault");
                return Err(fault);
            }
        }

        match self.block.as_mut() {
            Some(block) => {
                let tables = self.shared.tables.read();
                apply(&tables, &mut block.writes, statement)
            }
            None => {
                // Implicit begin/commit around a single statement.
                let mut tables = self.shared.tables.write();
                let mut writes = Overlay::new();
                let outcome = apply(&tables, &mut writes, statement)?;
                publish(&mut tables, writes);
                Ok(outcome)
            }
        }
    }
}

impl StatementExecutor for InMemoryConnection {
    fn execute(&mut self, statement: &Statement) -> ExecResult<Outcome> {
        self.shared.executed.fetch_add(1, Ordering::SeqCst);
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(ExecError::connection("server closed the connection unexpectedly"));
        }

        match statement {
            Statement::Begin => {
                if self.block.is_some() {
                    return Err(ExecError::data("there is already a transaction in progress"));
                }
                self.block = Some(Block::default());
                Ok(Outcome::Done { affected: 0 })
            }
            Statement::Commit => match self.block.take() {
                None => Err(ExecError::data("there is no transaction in progress")),
                Some(block) if block.aborted => {
                    Err(ExecError::data("transaction was aborted and has been rolled back"))
                }
                Some(block) => {
                    let affected = block.writes.len();
                    publish(&mut self.shared.tables.write(), block.writes);
                    Ok(Outcome::Done { affected })
                }
            },
            Statement::Rollback => match self.block.take() {
                None => Err(ExecError::data("there is no transaction in progress")),
                Some(_) => Ok(Outcome::Done { affected: 0 }),
            },
            _ => {
                if self.block.as_ref().is_some_and(|b| b.aborted) {
                    return Err(ExecError::data(ABORTED_BLOCK));
                }
                let result = self.run(statement);
                if result.is_err() {
                    if let Some(block) = self.block.as_mut() {
                        block.aborted = true;
                    }
                }
                result
            }
        }
    }
}

fn table<'a>(tables: &'a HashMap<String, Table>, name: &str) -> ExecResult<&'a Table> {
    tables
        .get(name)
        .ok_or_else(|| ExecError::data(format!("relation \"{name}\" does not exist")))
}

fn check_columns<'a>(
    table: &Table,
    columns: impl IntoIterator<Item = &'a String>,
) -> ExecResult<()> {
    for column in columns {
        if column != ID_COLUMN && !table.columns.contains(column) {
            return Err(ExecError::data(format!("column \"{column}\" does not exist")));
        }
    }
    Ok(())
}

fn check_filter(table: &Table, filter: &[Predicate]) -> ExecResult<()> {
    check_columns(table, filter.iter().map(|p| &p.column))
}

fn current(tables: &Table, writes: &Overlay, name: &str, id: &str) -> Option<Row> {
    match writes.get(&(name.to_string(), id.to_string())) {
        Some(pending) => pending.clone(),
        None => tables.rows.get(id).cloned(),
    }
}

fn apply(
    tables: &HashMap<String, Table>,
    writes: &mut Overlay,
    statement: &Statement,
) -> ExecResult<Outcome> {
    match statement {
        Statement::Insert { table: name, id, values } => {
            let t = table(tables, name)?;
            check_columns(t, values.iter().map(|(c, _)| c))?;
            if current(t, writes, name, id).is_some() {
                return Err(ExecError::data(format!(
                    "duplicate key value violates unique constraint \"{name}_pkey\""
                )));
            }
            let mut row = Row::new();
            for column in &t.columns {
                row.set(column.clone(), Value::Null);
            }
            for (column, value) in values {
                row.set(column.clone(), value.clone());
            }
            row.set(ID_COLUMN, Value::Text(id.clone()));
            writes.insert((name.clone(), id.clone()), Some(row));
            Ok(Outcome::Done { affected: 1 })
        }
        Statement::Get { table: name, id, filter } => {
            let t = table(tables, name)?;
            check_filter(t, filter)?;
            let rows = current(t, writes, name, id)
                .filter(|row| row.matches(filter))
                .into_iter()
                .collect();
            Ok(Outcome::Rows(rows))
        }
        Statement::Scan { table: name, filter, limit } => {
            let t = table(tables, name)?;
            check_filter(t, filter)?;
            let mut merged = t.rows.clone();
            for ((pending_table, id), row) in writes.iter() {
                if pending_table != name {
                    continue;
                }
                match row {
                    Some(row) => merged.insert(id.clone(), row.clone()),
                    None => merged.remove(id),
                };
            }
            let rows = merged
                .into_values()
                .filter(|row| row.matches(filter))
                .take(limit.unwrap_or(usize::MAX))
                .collect();
            Ok(Outcome::Rows(rows))
        }
        Statement::Update { table: name, id, set, filter } => {
            let t = table(tables, name)?;
            check_columns(t, set.iter().map(|(c, _)| c))?;
            check_filter(t, filter)?;
            let Some(mut row) = current(t, writes, name, id).filter(|r| r.matches(filter)) else {
                return Ok(Outcome::Done { affected: 0 });
            };
            for (column, value) in set {
                row.set(column.clone(), value.clone());
            }
            writes.insert((name.clone(), id.clone()), Some(row));
            Ok(Outcome::Done { affected: 1 })
        }
        Statement::Delete { table: name, id, filter } => {
            let t = table(tables, name)?;
            check_filter(t, filter)?;
            if current(t, writes, name, id).is_some_and(|r| r.matches(filter)) {
                writes.insert((name.clone(), id.clone()), None);
                Ok(Outcome::Done { affected: 1 })
            } else {
                Ok(Outcome::Done { affected: 0 })
            }
        }
        Statement::Begin | Statement::Commit | Statement::Rollback => {
            Err(ExecError::data("transaction control is handled by the connection"))
        }
    }
}

fn publish(tables: &mut HashMap<String, Table>, writes: Overlay) {
    for ((name, id), row) in writes {
        if let Some(table) = tables.get_mut(&name) {
            match row {
                Some(row) => table.rows.insert(id, row),
                None => table.rows.remove(&id),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        engine.create_table("employees", &["last_name"]).unwrap();
        let mut conn = engine.connect().unwrap();
        conn.execute(&Statement::insert(
            "employees",
            "1",
            [("last_name", Value::text("Smith"))],
        ))
        .unwrap();
        engine
    }

    fn set_name(name: &str) -> Statement {
        Statement::update("employees", "1", [("last_name", Value::text(name))])
    }

    fn bad_column() -> Statement {
        Statement::update("employees", "1", [("sss", Value::text("x"))])
    }

    #[test]
    fn autocommit_keeps_earlier_statement() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();

        conn.execute(&set_name("X")).unwrap();
        let err = conn.execute(&bad_column()).unwrap_err();

        assert!(matches!(err, ExecError::Data { .. }));
        assert_eq!(engine.row("employees", "1").unwrap().text("last_name"), Some("X"));
    }

    #[test]
    fn block_writes_invisible_until_commit() {
        let engine = engine();
        let mut writer = engine.connect().unwrap();
        let mut reader = engine.connect().unwrap();

        writer.execute(&Statement::Begin).unwrap();
        writer.execute(&set_name("X")).unwrap();

        let seen = reader
            .execute(&Statement::get("employees", "1"))
            .unwrap()
            .into_first()
            .unwrap();
        assert_eq!(seen.text("last_name"), Some("Smith"));

        let own = writer
            .execute(&Statement::get("employees", "1"))
            .unwrap()
            .into_first()
            .unwrap();
        assert_eq!(own.text("last_name"), Some("X"));

        writer.execute(&Statement::Commit).unwrap();
        assert_eq!(engine.row("employees", "1").unwrap().text("last_name"), Some("X"));
    }

    #[test]
    fn aborted_block_rejects_until_rollback() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();

        conn.execute(&Statement::Begin).unwrap();
        conn.execute(&set_name("X")).unwrap();
        conn.execute(&bad_column()).unwrap_err();

        let err = conn.execute(&Statement::scan("employees")).unwrap_err();
        assert_eq!(err, ExecError::data(ABORTED_BLOCK));

        conn.execute(&Statement::Rollback).unwrap();
        assert!(!conn.in_block());
        assert_eq!(
            engine.row("employees", "1").unwrap().text("last_name"),
            Some("Smith")
        );
    }

    #[test]
    fn commit_of_aborted_block_discards() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();

        conn.execute(&Statement::Begin).unwrap();
        conn.execute(&set_name("X")).unwrap();
        conn.execute(&bad_column()).unwrap_err();

        assert!(conn.execute(&Statement::Commit).is_err());
        assert!(!conn.in_block());
        assert_eq!(
            engine.row("employees", "1").unwrap().text("last_name"),
            Some("Smith")
        );
    }

    #[test]
    fn dropped_connection_discards_block() {
        let engine = engine();
        {
            let mut conn = engine.connect().unwrap();
            conn.execute(&Statement::Begin).unwrap();
            conn.execute(&set_name("X")).unwrap();
        }
        assert_eq!(
            engine.row("employees", "1").unwrap().text("last_name"),
            Some("Smith")
        );
    }

    #[test]
    fn duplicate_insert_is_data_error() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();
        let err = conn
            .execute(&Statement::insert("employees", "1", [("last_name", Value::Null)]))
            .unwrap_err();
        assert!(matches!(err, ExecError::Data { .. }));
    }

    #[test]
    fn unknown_table_is_data_error() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();
        let err = conn.execute(&Statement::scan("flights")).unwrap_err();
        assert_eq!(err, ExecError::data("relation \"flights\" does not exist"));
    }

    #[test]
    fn scan_merges_pending_writes() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();

        conn.execute(&Statement::Begin).unwrap();
        conn.execute(&Statement::insert("employees", "2", [("last_name", Value::text("B"))]))
            .unwrap();
        conn.execute(&Statement::delete("employees", "1")).unwrap();

        let rows = conn.execute(&Statement::scan("employees")).unwrap().into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), Some("2"));
        assert_eq!(engine.row_count("employees"), 1);

        conn.execute(&Statement::Commit).unwrap();
        assert!(engine.row("employees", "1").is_none());
        assert!(engine.row("employees", "2").is_some());
    }

    #[test]
    fn scan_filter_and_limit() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();
        for id in ["2", "3", "4"] {
            conn.execute(&Statement::insert("employees", id, [("last_name", Value::text("B"))]))
                .unwrap();
        }

        let rows = conn
            .execute(&Statement::scan("employees").filter("last_name", "B").limit(2))
            .unwrap()
            .into_rows();
        let ids: Vec<_> = rows.iter().filter_map(Row::id).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn update_respects_filter() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();

        let outcome = conn
            .execute(&set_name("X").filter("last_name", "Jones"))
            .unwrap();
        assert_eq!(outcome.affected(), 0);
        assert_eq!(
            engine.row("employees", "1").unwrap().text("last_name"),
            Some("Smith")
        );
    }

    #[test]
    fn injected_fault_fires_once_on_write() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();
        engine.fail_next_write(ExecError::connection("reset by peer"));

        conn.execute(&Statement::get("employees", "1")).unwrap();
        let err = conn.execute(&set_name("X")).unwrap_err();
        assert_eq!(err, ExecError::connection("reset by peer"));
        conn.execute(&set_name("Y")).unwrap();
    }

    #[test]
    fn unavailable_engine_fails_with_connection_error() {
        let engine = engine();
        let mut conn = engine.connect().unwrap();
        engine.set_unavailable(true);

        let err = conn.execute(&Statement::scan("employees")).unwrap_err();
        assert!(matches!(err, ExecError::Connection { .. }));
        assert!(engine.connect().is_err());

        engine.set_unavailable(false);
        assert!(conn.execute(&Statement::scan("employees")).is_ok());
    }

    #[test]
    fn counts_statements() {
        let engine = engine();
        let before = engine.statements_executed();
        let mut conn = engine.connect().unwrap();
        conn.execute(&Statement::Begin).unwrap();
        conn.execute(&Statement::Rollback).unwrap();
        assert_eq!(engine.statements_executed(), before + 2);
    }
}
