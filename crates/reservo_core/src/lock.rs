//! Per-resource exclusive locks.

use crate::error::{CoreError, CoreResult};
use crate::types::{ResourceId, TransactionId};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LockEntry {
    holder: Option<TransactionId>,
    waiters: VecDeque<TransactionId>,
}

/// Grants exclusive, first-come-first-served locks on resources.
///
/// At most one transaction holds a resource's lock at any instant. Releasing
/// a contended lock hands it directly to the longest waiter, so a newcomer
/// can never overtake a queued transaction.
///
/// A waiter whose deadline passes is removed from the queue and is never
/// granted the lock afterwards. If the hand-off and the deadline race, the
/// hand-off wins and the caller gets the lock.
///
/// Locks are bound to transactions, not threads. The transaction manager
/// releases everything a transaction holds when it ends.
///
/// Only one resource lock is taken per reservation, so waits on this
/// manager cannot form a cycle. Callers that take several locks in one
/// transaction must impose their own ordering.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<HashMap<ResourceId, LockEntry>>,
    handoff: Condvar,
}

impl LockManager {
    /// Creates an empty lock manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `txn` holds the lock on `resource`.
    ///
    /// Acquiring a lock the transaction already holds returns immediately.
    /// A `timeout` of `None` waits forever, as does one too large to
    /// represent as a deadline. `Some(Duration::ZERO)` only succeeds if the
    /// lock is free and nobody is queued.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the lock was not granted before the deadline.
    pub fn acquire(
        &self,
        resource: &ResourceId,
        txn: TransactionId,
        timeout: Option<Duration>,
    ) -> CoreResult<()> {
        // A deadline past the clock's range is no deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut table = self.table.lock();

        let entry = table.entry(resource.clone()).or_default();
        let current = entry.holder;
        match current {
            Some(holder) if holder == txn => return Ok(()),
            None if entry.waiters.is_empty() => {
                entry.holder = Some(txn);
                tracing::debug!(%resource, %txn, "lock granted");
                return Ok(());
            }
            _ => entry.waiters.push_back(txn),
        }
        tracing::debug!(%resource, %txn, queued = entry.waiters.len(), "waiting for lock");

        loop {
            let timed_out = match deadline {
                Some(deadline) => self.handoff.wait_until(&mut table, deadline).timed_out(),
                None => {
                    self.handoff.wait(&mut table);
                    false
                }
            };

            let Some(entry) = table.get_mut(resource) else {
                return Err(CoreError::invalid_operation(format!(
                    "lock entry for {resource} vanished while {txn} was queued"
                )));
            };
            if entry.holder == Some(txn) {
                tracing::debug!(%resource, %txn, "lock handed off");
                return Ok(());
            }
            if timed_out || deadline.is_some_and(|d| Instant::now() >= d) {
                entry.waiters.retain(|w| *w != txn);
                if entry.holder.is_none() && entry.waiters.is_empty() {
                    table.remove(resource);
                }
                let waited = timeout.unwrap_or_default();
                tracing::warn!(%resource, %txn, ?waited, "lock wait timed out");
                return Err(CoreError::LockTimeout {
                    resource_id: resource.clone(),
                    waited,
                });
            }
        }
    }

    /// Releases `txn`'s lock on `resource`, handing it to the next waiter.
    ///
    /// Returns false if `txn` did not hold the lock.
    pub fn release(&self, resource: &ResourceId, txn: TransactionId) -> bool {
        let mut table = self.table.lock();
        let released = Self::release_locked(&mut table, resource, txn);
        if released {
            self.handoff.notify_all();
        }
        released
    }

    /// Releases every lock held by `txn`. Returns how many were released.
    pub fn release_all(&self, txn: TransactionId) -> usize {
        let mut table = self.table.lock();
        let held: Vec<ResourceId> = table
            .iter()
            .filter(|(_, entry)| entry.holder == Some(txn))
            .map(|(resource, _)| resource.clone())
            .collect();
        for resource in &held {
            Self::release_locked(&mut table, resource, txn);
        }
        if !held.is_empty() {
            self.handoff.notify_all();
        }
        held.len()
    }

    fn release_locked(
        table: &mut HashMap<ResourceId, LockEntry>,
        resource: &ResourceId,
        txn: TransactionId,
    ) -> bool {
        let Some(entry) = table.get_mut(resource) else {
            return false;
        };
        if entry.holder != Some(txn) {
            return false;
        }
        entry.holder = entry.waiters.pop_front();
        match entry.holder {
            Some(next) => tracing::debug!(%resource, from = %txn, to = %next, "lock released"),
            None => {
                tracing::debug!(%resource, %txn, "lock released");
                table.remove(resource);
            }
        }
        true
    }

    /// Returns the current holder of a resource's lock.
    #[must_use]
    pub fn holder(&self, resource: &ResourceId) -> Option<TransactionId> {
        self.table.lock().get(resource).and_then(|e| e.holder)
    }

    /// Returns how many transactions are queued on a resource.
    #[must_use]
    pub fn queue_len(&self, resource: &ResourceId) -> usize {
        self.table.lock().get(resource).map_or(0, |e| e.waiters.len())
    }

    /// Returns how many resources are currently locked.
    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.table
            .lock()
            .values()
            .filter(|e| e.holder.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::thread;

    fn flight() -> ResourceId {
        ResourceId::new("FL100")
    }

    fn wait_for_queue(locks: &LockManager, resource: &ResourceId, len: usize) {
        let start = Instant::now();
        while locks.queue_len(resource) < len {
            assert!(start.elapsed() < Duration::from_secs(5), "waiters never queued");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn uncontended_acquire_and_release() {
        let locks = LockManager::new();
        let t1 = TransactionId::new(1);

        locks.acquire(&flight(), t1, None).unwrap();
        assert_eq!(locks.holder(&flight()), Some(t1));
        assert_eq!(locks.locked_count(), 1);

        assert!(locks.release(&flight(), t1));
        assert_eq!(locks.holder(&flight()), None);
        assert_eq!(locks.locked_count(), 0);
    }

    #[test]
    fn reacquire_by_holder_is_noop() {
        let locks = LockManager::new();
        let t1 = TransactionId::new(1);
        locks.acquire(&flight(), t1, None).unwrap();
        locks.acquire(&flight(), t1, Some(Duration::ZERO)).unwrap();
        assert_eq!(locks.queue_len(&flight()), 0);
    }

    #[test]
    fn unrepresentable_timeout_waits_without_deadline() {
        let locks = Arc::new(LockManager::new());
        let holder = TransactionId::new(1);
        locks.acquire(&flight(), holder, Some(Duration::MAX)).unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || locks.acquire(&flight(), TransactionId::new(2), Some(Duration::MAX)))
        };
        wait_for_queue(&locks, &flight(), 1);
        assert!(locks.release(&flight(), holder));
        waiter.join().unwrap().unwrap();
        assert_eq!(locks.holder(&flight()), Some(TransactionId::new(2)));
    }

    #[test]
    fn release_by_non_holder_is_refused() {
        let locks = LockManager::new();
        locks.acquire(&flight(), TransactionId::new(1), None).unwrap();
        assert!(!locks.release(&flight(), TransactionId::new(2)));
        assert!(!locks.release(&ResourceId::new("other"), TransactionId::new(1)));
        assert_eq!(locks.holder(&flight()), Some(TransactionId::new(1)));
    }

    #[test]
    fn zero_timeout_on_held_lock_times_out() {
        let locks = LockManager::new();
        locks.acquire(&flight(), TransactionId::new(1), None).unwrap();

        let err = locks
            .acquire(&flight(), TransactionId::new(2), Some(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
        assert_eq!(locks.queue_len(&flight()), 0);
    }

    #[test]
    fn timed_out_waiter_is_never_granted() {
        let locks = Arc::new(LockManager::new());
        let holder = TransactionId::new(1);
        let late = TransactionId::new(2);
        locks.acquire(&flight(), holder, None).unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || locks.acquire(&flight(), late, Some(Duration::from_millis(20))))
        };
        assert!(waiter.join().unwrap().is_err());

        assert!(locks.release(&flight(), holder));
        assert_eq!(locks.holder(&flight()), None);
    }

    #[test]
    fn waiters_are_granted_in_arrival_order() {
        let locks = Arc::new(LockManager::new());
        let order = Arc::new(StdMutex::new(Vec::new()));
        let first = TransactionId::new(100);
        locks.acquire(&flight(), first, None).unwrap();

        let mut handles = Vec::new();
        for i in 1..=4u64 {
            let txn = TransactionId::new(100 + i);
            let locks_ref = Arc::clone(&locks);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                locks_ref.acquire(&flight(), txn, None).unwrap();
                order.lock().unwrap().push(txn);
                locks_ref.release(&flight(), txn);
            }));
            // Queue them one at a time so arrival order is known.
            wait_for_queue(&locks, &flight(), i as usize);
        }

        locks.release(&flight(), first);
        for h in handles {
            h.join().unwrap();
        }

        let order = order.lock().unwrap().clone();
        let expected: Vec<_> = (101..=104).map(TransactionId::new).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn newcomer_cannot_barge_past_queue() {
        let locks = Arc::new(LockManager::new());
        let holder = TransactionId::new(1);
        locks.acquire(&flight(), holder, None).unwrap();

        let queued = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                locks.acquire(&flight(), TransactionId::new(2), None).unwrap();
            })
        };
        wait_for_queue(&locks, &flight(), 1);

        locks.release(&flight(), holder);
        queued.join().unwrap();
        assert_eq!(locks.holder(&flight()), Some(TransactionId::new(2)));

        let err = locks
            .acquire(&flight(), TransactionId::new(3), Some(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
    }

    #[test]
    fn release_all_frees_every_resource_of_txn() {
        let locks = LockManager::new();
        let t1 = TransactionId::new(1);
        locks.acquire(&ResourceId::new("a"), t1, None).unwrap();
        locks.acquire(&ResourceId::new("b"), t1, None).unwrap();
        locks.acquire(&ResourceId::new("c"), TransactionId::new(2), None).unwrap();

        assert_eq!(locks.release_all(t1), 2);
        assert_eq!(locks.locked_count(), 1);
        assert_eq!(locks.release_all(t1), 0);
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let locks = Arc::new(LockManager::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for round in 0..25u64 {
                        let txn = TransactionId::new(1_000 + i * 100 + round);
                        locks.acquire(&flight(), txn, None).unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        locks.release(&flight(), txn);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.locked_count(), 0);
    }
}
