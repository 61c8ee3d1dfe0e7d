//! Transaction state.

use crate::error::{CoreError, CoreResult};
use crate::types::{ResourceId, TransactionId};
use reservo_executor::Statement;

/// State of a connection's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No explicit transaction; statements auto-commit.
    Idle,
    /// An explicit transaction is open and healthy.
    Active,
    /// A statement failed inside the open transaction.
    Poisoned,
}

/// An open explicit transaction.
///
/// Exists only between `begin` and the matching `commit` or `rollback`.
#[derive(Debug)]
pub struct Transaction {
    /// Transaction ID.
    id: TransactionId,
    /// Active or Poisoned.
    state: TransactionState,
    /// Statements executed successfully since `begin`, in order.
    statements: Vec<Statement>,
    /// Resources locked by this transaction, in acquisition order.
    locks: Vec<ResourceId>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            statements: Vec::new(),
            locks: Vec::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if a statement has failed in this transaction.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.state == TransactionState::Poisoned
    }

    /// Statements executed since `begin`.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Resources locked by this transaction.
    #[must_use]
    pub fn locks(&self) -> &[ResourceId] {
        &self.locks
    }

    pub(crate) fn record(&mut self, statement: &Statement) {
        self.statements.push(statement.clone());
    }

    pub(crate) fn record_lock(&mut self, resource: &ResourceId) {
        if !self.locks.contains(resource) {
            self.locks.push(resource.clone());
        }
    }

    pub(crate) fn poison(&mut self) {
        self.state = TransactionState::Poisoned;
    }

    /// Ensures new work may run in this transaction.
    pub(crate) fn ensure_usable(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Poisoned => Err(CoreError::TransactionPoisoned),
            _ => Ok(()),
        }
    }
}
