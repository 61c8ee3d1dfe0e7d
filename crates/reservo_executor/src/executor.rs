//! Executor and connector traits.

use crate::error::ExecResult;
use crate::statement::{Outcome, Statement};

/// A single connection to the underlying engine.
///
/// Executors are **opaque**. They run one statement at a time and report
/// either an [`Outcome`] or a classified failure. A connection owns whatever
/// transaction block the engine has open for it.
///
/// # Invariants
///
/// - Outside a `Begin` block, a successful write is durable when `execute` returns
/// - Inside a block, writes become visible to other connections only on `Commit`
/// - Executors must be `Send` so a connection can move to a worker thread
pub trait StatementExecutor: Send {
    /// Executes one statement.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ExecError::Data`] if the engine rejects the statement
    /// and [`crate::ExecError::Connection`] if the engine cannot be reached.
    fn execute(&mut self, statement: &Statement) -> ExecResult<Outcome>;
}

impl<E: StatementExecutor + ?Sized> StatementExecutor for Box<E> {
    fn execute(&mut self, statement: &Statement) -> ExecResult<Outcome> {
        (**self).execute(statement)
    }
}

/// Produces fresh connections.
///
/// Each logical unit of work gets its own connection, so a transaction is
/// never shared between concurrent callers.
pub trait Connector: Send + Sync {
    /// The connection type produced.
    type Connection: StatementExecutor;

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ExecError::Connection`] if the engine is unreachable.
    fn connect(&self) -> ExecResult<Self::Connection>;
}
