//! Transaction manager.

use crate::error::{CoreError, CoreResult};
use crate::lock::LockManager;
use crate::stats::EngineStats;
use crate::transaction::state::{Transaction, TransactionState};
use crate::types::{ResourceId, TransactionId};
use reservo_executor::{ExecError, ExecResult, Outcome, Statement, StatementExecutor};
use std::sync::Arc;
use std::time::Duration;

/// Runs statements on one connection under an explicit state machine.
///
/// | State    | `begin`             | statement ok   | statement fails | `commit`            | `rollback` |
/// |----------|---------------------|----------------|-----------------|---------------------|------------|
/// | Idle     | Active              | auto-commits   | error surfaces  | NoActiveTransaction | NoActiveTransaction |
/// | Active   | TransactionAlreadyOpen | stays Active | Poisoned       | Idle                | Idle       |
/// | Poisoned | TransactionAlreadyOpen | refused (TransactionPoisoned, executor untouched) | stays Poisoned | TransactionPoisoned | Idle |
///
/// Outside an explicit transaction there is **no** atomicity across
/// statements: each one commits on its own and a later failure leaves earlier
/// statements applied. Use [`run_in_transaction`](Self::run_in_transaction)
/// for all-or-nothing work.
///
/// ## Locks
///
/// Resource locks taken with [`lock`](Self::lock) belong to the open
/// transaction and are released whenever it returns to Idle, on commit,
/// on rollback, or when the manager is dropped.
///
/// ## Broken sessions
///
/// If a `commit` or `rollback` fails with a connection error, the engine may
/// still hold the block open. The manager returns to Idle but marks itself
/// broken: every later `begin`, `execute` and `lock` fails with a
/// `Connection` error. A broken manager must be discarded and a new
/// connection opened.
pub struct TransactionManager<E> {
    /// The connection.
    executor: E,
    /// Open transaction, if any.
    current: Option<Transaction>,
    /// Lock manager notified when a transaction ends.
    locks: Option<Arc<LockManager>>,
    /// Shared counters.
    stats: Arc<EngineStats>,
    /// Set when the engine could not confirm the end of a block.
    broken: Option<String>,
}

impl<E: StatementExecutor> TransactionManager<E> {
    /// Creates a manager around a connection.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            current: None,
            locks: None,
            stats: Arc::new(EngineStats::new()),
            broken: None,
        }
    }

    /// Attaches a lock manager.
    #[must_use]
    pub fn with_lock_manager(mut self, locks: Arc<LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Shares a stats instance.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<EngineStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.current
            .as_ref()
            .map_or(TransactionState::Idle, Transaction::state)
    }

    /// Returns the open transaction, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&Transaction> {
        self.current.as_ref()
    }

    /// Returns the stats this manager records into.
    #[must_use]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Returns true once the connection can no longer be trusted.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    /// Returns the underlying connection.
    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Opens an explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionAlreadyOpen` if a transaction is open (healthy or
    /// poisoned), `Connection` if the manager is broken, or the executor's
    /// error if it refuses to begin.
    pub fn begin(&mut self) -> CoreResult<TransactionId> {
        self.ensure_connected()?;
        if self.current.is_some() {
            return Err(CoreError::TransactionAlreadyOpen);
        }
        self.executor.execute(&Statement::Begin)?;

        let txn = Transaction::new(TransactionId::allocate());
        let id = txn.id();
        self.current = Some(txn);
        self.stats.record_begin();
        tracing::debug!(txn = %id, "transaction begun");
        Ok(id)
    }

    /// Executes one statement.
    ///
    /// When Idle the statement auto-commits. When Active a failure poisons
    /// the transaction. When Poisoned the executor is not contacted.
    ///
    /// # Errors
    ///
    /// Returns `TransactionPoisoned` on a poisoned transaction, `Connection`
    /// if the manager is broken, otherwise the executor's error.
    pub fn execute(&mut self, statement: &Statement) -> CoreResult<Outcome> {
        self.ensure_connected()?;
        let Some(txn) = self.current.as_mut() else {
            self.stats.record_autocommit();
            tracing::trace!(?statement, "auto-commit statement");
            return Ok(self.executor.execute(statement)?);
        };

        if let Err(err) = txn.ensure_usable() {
            self.stats.record_poisoned_rejection();
            return Err(err);
        }

        match self.executor.execute(statement) {
            Ok(outcome) => {
                txn.record(statement);
                Ok(outcome)
            }
            Err(err) => {
                txn.poison();
                self.stats.record_poisoned();
                tracing::warn!(txn = %txn.id(), error = %err, "statement failed, transaction poisoned");
                Err(err.into())
            }
        }
    }

    /// Executes statements in order, stopping at the first failure.
    ///
    /// When Idle each statement commits independently, so statements before
    /// the failing one stay applied.
    ///
    /// # Errors
    ///
    /// Returns the first statement's error.
    pub fn execute_batch(&mut self, statements: &[Statement]) -> CoreResult<Vec<Outcome>> {
        statements.iter().map(|s| self.execute(s)).collect()
    }

    /// Commits the open transaction.
    ///
    /// If the engine refuses the commit, the transaction is rolled back and
    /// the manager returns to Idle anyway. If that rollback cannot reach the
    /// engine, the manager is marked broken.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` when Idle, `TransactionPoisoned` when
    /// Poisoned (the transaction stays open), or the executor's error.
    pub fn commit(&mut self) -> CoreResult<()> {
        match &self.current {
            None => return Err(CoreError::NoActiveTransaction),
            Some(txn) => txn.ensure_usable()?,
        }

        let result = self.executor.execute(&Statement::Commit);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "commit refused, rolling back");
            let rollback = self.executor.execute(&Statement::Rollback);
            if let Err(rollback_err) = &rollback {
                tracing::debug!(error = %rollback_err, "rollback after failed commit");
            }
            self.check_block_closed(&rollback);
            self.stats.record_rollback();
        } else {
            self.stats.record_commit();
        }
        self.finish(if result.is_ok() { "committed" } else { "rolled back" });
        result.map(|_| ()).map_err(CoreError::from)
    }

    /// Rolls back the open transaction, healthy or poisoned.
    ///
    /// The manager is Idle afterwards even if the engine reports an error.
    /// A connection error also marks the manager broken.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` when Idle, or the executor's error.
    pub fn rollback(&mut self) -> CoreResult<()> {
        if self.current.is_none() {
            return Err(CoreError::NoActiveTransaction);
        }
        let result = self.executor.execute(&Statement::Rollback);
        self.check_block_closed(&result);
        self.stats.record_rollback();
        self.finish("rolled back");
        result.map(|_| ()).map_err(CoreError::from)
    }

    /// Locks `resource` for the open transaction, blocking until granted.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` when Idle, `TransactionPoisoned` when
    /// Poisoned, `LockTimeout` if the deadline passes, or `InvalidOperation`
    /// if no lock manager is attached.
    pub fn lock(&mut self, resource: &ResourceId, timeout: Option<Duration>) -> CoreResult<()> {
        self.ensure_connected()?;
        let txn = self.current.as_mut().ok_or(CoreError::NoActiveTransaction)?;
        txn.ensure_usable()?;
        let locks = self
            .locks
            .as_ref()
            .ok_or_else(|| CoreError::invalid_operation("no lock manager attached"))?;

        match locks.acquire(resource, txn.id(), timeout) {
            Ok(()) => {
                txn.record_lock(resource);
                self.stats.record_lock_grant();
                Ok(())
            }
            Err(err) => {
                if matches!(err, CoreError::LockTimeout { .. }) {
                    self.stats.record_lock_timeout();
                }
                Err(err)
            }
        }
    }

    /// Runs `work` inside an explicit transaction.
    ///
    /// Commits if `work` succeeds. Otherwise rolls back and returns the
    /// original error. The manager is Idle, and every lock the transaction
    /// took is released, whenever this returns.
    ///
    /// If `work` swallows a statement failure and returns `Ok`, the
    /// transaction is still poisoned; it is rolled back and
    /// `TransactionPoisoned` is returned.
    ///
    /// # Errors
    ///
    /// Returns the error from `begin`, from `work`, or from `commit`.
    pub fn run_in_transaction<T, F>(&mut self, work: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        self.begin()?;
        match work(self) {
            Ok(_) if self.state() == TransactionState::Poisoned => {
                self.rollback_quietly();
                Err(CoreError::TransactionPoisoned)
            }
            Ok(value) => match self.current {
                Some(_) => self.commit().map(|()| value),
                // `work` already ended the transaction itself.
                None => Ok(value),
            },
            Err(err) => {
                self.rollback_quietly();
                Err(err)
            }
        }
    }

    fn ensure_connected(&self) -> CoreResult<()> {
        match &self.broken {
            Some(message) => Err(CoreError::Connection {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    /// A data error means the engine answered and has no block open. A
    /// connection error leaves the block's fate unknown.
    fn check_block_closed(&mut self, result: &ExecResult<Outcome>) {
        if let Err(ExecError::Connection { message }) = result {
            tracing::warn!(error = %message, "could not close block, session is broken");
            self.broken = Some(format!("session unusable after failed rollback: {message}"));
        }
    }

    fn rollback_quietly(&mut self) {
        if self.current.is_none() {
            return;
        }
        if let Err(err) = self.rollback() {
            tracing::warn!(error = %err, "rollback failed; transaction discarded");
        }
    }
}

impl<E> TransactionManager<E> {
    /// Returns to Idle, releasing every lock the transaction held.
    fn finish(&mut self, how: &str) {
        let Some(txn) = self.current.take() else {
            return;
        };
        let released = self
            .locks
            .as_ref()
            .map_or(0, |locks| locks.release_all(txn.id()));
        tracing::debug!(
            txn = %txn.id(),
            statements = txn.statements().len(),
            released,
            "transaction {how}"
        );
    }
}

impl<E> Drop for TransactionManager<E> {
    fn drop(&mut self) {
        // The connection goes with us and discards any open block.
        self.finish("abandoned");
    }
}

impl<E> std::fmt::Debug for TransactionManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
