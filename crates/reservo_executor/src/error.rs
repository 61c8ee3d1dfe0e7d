//! Error types for statement execution.

use thiserror::Error;

/// Result type for executor operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Classification of an executor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The statement itself was rejected by the engine.
    Data,
    /// The transport or the engine was unavailable.
    Connection,
}

/// Errors reported by a statement executor.
///
/// Every failure crossing the executor boundary is one of exactly two kinds.
/// Callers decide what a failure means for the surrounding transaction from
/// the kind alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The engine rejected the statement (bad reference, constraint, aborted block).
    #[error("data error: {message}")]
    Data {
        /// Engine-provided description.
        message: String,
    },

    /// The connection to the engine failed.
    #[error("connection error: {message}")]
    Connection {
        /// Transport-provided description.
        message: String,
    },
}

impl ExecError {
    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Returns the failure classification.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Data { .. } => FailureKind::Data,
            Self::Connection { .. } => FailureKind::Connection,
        }
    }

    /// Returns the underlying message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Data { message } | Self::Connection { message } => message,
        }
    }
}
