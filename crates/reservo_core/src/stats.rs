//! Engine statistics.
//!
//! Counters for transaction outcomes, lock contention and reservation
//! results.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = ReservationEngine::new(connector);
//! engine.reserve(&flight, &alice, None);
//!
//! let stats = engine.stats().snapshot();
//! println!("Granted: {}", stats.reservations_granted);
//! println!("Lock timeouts: {}", stats.lock_timeouts);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine statistics.
///
/// All counters are atomic and can be read while operations are in progress.
/// Values are monotonically increasing.
#[derive(Debug, Default)]
pub struct EngineStats {
    // Transaction counters
    transactions_begun: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    transactions_poisoned: AtomicU64,
    autocommit_statements: AtomicU64,
    poisoned_rejections: AtomicU64,

    // Lock counters
    lock_grants: AtomicU64,
    lock_timeouts: AtomicU64,

    // Reservation counters
    reservations_granted: AtomicU64,
    reservations_rejected: AtomicU64,
    reservations_failed: AtomicU64,
    releases: AtomicU64,
    noop_releases: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_begin(&self) {
        self.transactions_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poisoned(&self) {
        self.transactions_poisoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_autocommit(&self) {
        self.autocommit_statements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poisoned_rejection(&self) {
        self.poisoned_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_grant(&self) {
        self.lock_grants.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_granted(&self) {
        self.reservations_granted.fetch_add(1, Ordering::Relaxed);
    }

    /// Business rejections: exhausted pool or unit already held.
    pub(crate) fn record_rejected(&self) {
        self.reservations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.reservations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self, changed: bool) {
        if changed {
            self.releases.fetch_add(1, Ordering::Relaxed);
        } else {
            self.noop_releases.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            transactions_begun: load(&self.transactions_begun),
            transactions_committed: load(&self.transactions_committed),
            transactions_rolled_back: load(&self.transactions_rolled_back),
            transactions_poisoned: load(&self.transactions_poisoned),
            autocommit_statements: load(&self.autocommit_statements),
            poisoned_rejections: load(&self.poisoned_rejections),
            lock_grants: load(&self.lock_grants),
            lock_timeouts: load(&self.lock_timeouts),
            reservations_granted: load(&self.reservations_granted),
            reservations_rejected: load(&self.reservations_rejected),
            reservations_failed: load(&self.reservations_failed),
            releases: load(&self.releases),
            noop_releases: load(&self.noop_releases),
        }
    }
}

/// A point-in-time snapshot of engine statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Explicit transactions begun.
    pub transactions_begun: u64,
    /// Explicit transactions committed.
    pub transactions_committed: u64,
    /// Explicit transactions rolled back.
    pub transactions_rolled_back: u64,
    /// Transactions poisoned by a failed statement.
    pub transactions_poisoned: u64,
    /// Statements run outside an explicit transaction.
    pub autocommit_statements: u64,
    /// Statements refused because their transaction was poisoned.
    pub poisoned_rejections: u64,
    /// Resource locks granted.
    pub lock_grants: u64,
    /// Lock waits that hit their deadline.
    pub lock_timeouts: u64,
    /// Successful reservations.
    pub reservations_granted: u64,
    /// Reservations refused because nothing was available.
    pub reservations_rejected: u64,
    /// Reservations that failed for any other reason.
    pub reservations_failed: u64,
    /// Releases that freed a unit.
    pub releases: u64,
    /// Releases of a unit that was already free.
    pub noop_releases: u64,
}
