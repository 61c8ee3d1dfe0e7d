//! Error types for reservo core.

use crate::types::{ResourceId, UnitId};
use reservo_executor::ExecError;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in reservo core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The engine rejected a statement.
    #[error("data error: {message}")]
    Data {
        /// Engine-provided description.
        message: String,
    },

    /// The engine could not be reached.
    #[error("connection error: {message}")]
    Connection {
        /// Transport-provided description.
        message: String,
    },

    /// A statement was attempted on a transaction that already failed.
    #[error("transaction is poisoned: roll back before issuing further statements")]
    TransactionPoisoned,

    /// `begin` was called while a transaction was already open.
    #[error("a transaction is already open on this connection")]
    TransactionAlreadyOpen,

    /// `commit` or `rollback` was called with no open transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// The resource has no available units.
    #[error("resource {resource_id} has no available units")]
    ResourceExhausted {
        /// The exhausted resource.
        resource_id: ResourceId,
    },

    /// The resource lock was not granted before the caller's deadline.
    #[error("timed out after {waited:?} waiting for lock on resource {resource_id}")]
    LockTimeout {
        /// The contended resource.
        resource_id: ResourceId,
        /// How long the caller was prepared to wait.
        waited: Duration,
    },

    /// The resource does not exist.
    #[error("resource not found: {resource_id}")]
    ResourceNotFound {
        /// The missing resource.
        resource_id: ResourceId,
    },

    /// The unit does not exist (or does not belong to the resource).
    #[error("unit not found: {unit_id}")]
    UnitNotFound {
        /// The missing unit.
        unit_id: UnitId,
    },

    /// The requested unit is already held.
    #[error("unit {unit_id} is already held")]
    UnitUnavailable {
        /// The held unit.
        unit_id: UnitId,
    },

    /// A stored record violates its invariants.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the violation.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the engine rejected a statement.
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    /// Returns true if the engine could not be reached.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

impl From<ExecError> for CoreError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Data { message } => Self::Data { message },
            ExecError::Connection { message } => Self::Connection { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_errors_keep_their_kind() {
        let data: CoreError = ExecError::data("bad column").into();
        assert!(data.is_data());
        assert_eq!(data.to_string(), "data error: bad column");

        let conn: CoreError = ExecError::connection("reset").into();
        assert!(conn.is_connection());
        assert!(!conn.is_data());
    }

    #[test]
    fn lock_timeout_display() {
        let err = CoreError::LockTimeout {
            resource_id: ResourceId::new("FL100"),
            waited: Duration::from_millis(50),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 50ms waiting for lock on resource FL100"
        );
    }
}
