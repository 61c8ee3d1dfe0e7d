//! Reservation outcome.

use crate::error::CoreError;
use crate::types::UnitId;

/// Outcome of a `reserve` call.
///
/// Business rejections (nothing available, unit already held, lock timeout)
/// and system failures are both reported here rather than as `Err`, so the
/// caller always gets a value back. Nothing here is persisted by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// True iff a unit was reserved.
    pub success: bool,
    /// The reserved unit, on success.
    pub unit_id: Option<UnitId>,
    /// Why nothing was reserved, on failure.
    pub reason: Option<CoreError>,
}

impl Reservation {
    /// A successful reservation of `unit_id`.
    #[must_use]
    pub fn granted(unit_id: UnitId) -> Self {
        Self {
            success: true,
            unit_id: Some(unit_id),
            reason: None,
        }
    }

    /// A failed reservation.
    #[must_use]
    pub fn rejected(reason: CoreError) -> Self {
        Self {
            success: false,
            unit_id: None,
            reason: Some(reason),
        }
    }

    /// Returns true if a unit was reserved.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns true if the pool had no units left.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self.reason, Some(CoreError::ResourceExhausted { .. }))
    }

    /// Returns true if the lock wait hit its deadline.
    #[must_use]
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self.reason, Some(CoreError::LockTimeout { .. }))
    }
}

impl From<Result<UnitId, CoreError>> for Reservation {
    fn from(result: Result<UnitId, CoreError>) -> Self {
        match result {
            Ok(unit_id) => Self::granted(unit_id),
            Err(reason) => Self::rejected(reason),
        }
    }
}
