//! Tenant-scoping decorator.
//!
//! Pins every statement to one `column = value` scope. Reads, updates and
//! deletes get the predicate appended to their filter, inserts get the column
//! set. Transaction control passes through untouched.

use crate::error::ExecResult;
use crate::executor::{Connector, StatementExecutor};
use crate::statement::{Outcome, Predicate, Statement};

/// Wraps an executor so that every statement only sees one scope.
#[derive(Debug)]
pub struct ScopedExecutor<E> {
    inner: E,
    scope: Predicate,
}

impl<E: StatementExecutor> ScopedExecutor<E> {
    /// Wraps `inner`, scoping every statement to `scope`.
    pub fn new(inner: E, scope: Predicate) -> Self {
        Self { inner, scope }
    }

    /// Returns the scope predicate.
    #[must_use]
    pub fn scope(&self) -> &Predicate {
        &self.scope
    }

    /// Unwraps the inner executor.
    pub fn into_inner(self) -> E {
        self.inner
    }

    /// Rewrites a statement into its scoped form.
    #[must_use]
    pub fn rewrite(&self, statement: &Statement) -> Statement {
        let mut scoped = statement.clone();
        if let Statement::Insert { values, .. } = &mut scoped {
            values.retain(|(column, _)| column != &self.scope.column);
            values.push((self.scope.column.clone(), self.scope.value.clone()));
        } else if let Some(filter) = scoped.filter_mut() {
            filter.push(self.scope.clone());
        }
        scoped
    }
}

impl<E: StatementExecutor> StatementExecutor for ScopedExecutor<E> {
    fn execute(&mut self, statement: &Statement) -> ExecResult<Outcome> {
        let scoped = self.rewrite(statement);
        self.inner.execute(&scoped)
    }
}

/// A connector whose connections are all scoped.
#[derive(Debug, Clone)]
pub struct ScopedConnector<C> {
    inner: C,
    scope: Predicate,
}

impl<C: Connector> ScopedConnector<C> {
    /// Wraps `inner`, scoping every connection to `scope`.
    pub fn new(inner: C, scope: Predicate) -> Self {
        Self { inner, scope }
    }
}

impl<C: Connector> Connector for ScopedConnector<C> {
    type Connection = ScopedExecutor<C::Connection>;

    fn connect(&self) -> ExecResult<Self::Connection> {
        Ok(ScopedExecutor::new(self.inner.connect()?, self.scope.clone()))
    }
}
