//! Reservation engine.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::layout::{self, ResourceRecord, UnitRecord};
use crate::lock::LockManager;
use crate::reservation::outcome::Reservation;
use crate::stats::EngineStats;
use crate::transaction::TransactionManager;
use crate::types::{RequesterId, ResourceId, UnitId};
use reservo_executor::{Connector, StatementExecutor};
use std::sync::Arc;
use std::time::Duration;

/// Books units out of finite resource pools for concurrent callers.
///
/// Each operation opens its own connection and transaction, locks the one
/// resource it touches, and performs its read-check-write sequence inside
/// [`TransactionManager::run_in_transaction`]. The lock is released when that
/// transaction ends, whatever the outcome.
///
/// For any resource, across any number of concurrent `reserve` calls, the
/// number of successful reservations never exceeds `total_units`, and
/// `available_units` always equals `total_units` minus the units held.
///
/// The engine is `Sync`; share it between threads with an `Arc`.
///
/// # Example
///
/// ```rust
/// use reservo_core::{layout, ReservationEngine, RequesterId, ResourceId};
/// use reservo_executor::InMemoryEngine;
///
/// let db = InMemoryEngine::new();
/// db.create_table(layout::RESOURCES, &layout::resource_columns(&[])).unwrap();
/// db.create_table(layout::UNITS, &layout::unit_columns(&[])).unwrap();
/// let engine = ReservationEngine::new(db);
///
/// let flight = ResourceId::new("FL100");
/// engine.create_resource(&flight, 1).unwrap();
///
/// let alice = engine.reserve(&flight, &RequesterId::new("alice"), None);
/// let bob = engine.reserve(&flight, &RequesterId::new("bob"), None);
/// assert!(alice.is_success());
/// assert!(bob.is_exhausted());
/// ```
pub struct ReservationEngine<C> {
    /// Source of fresh connections.
    connector: C,
    /// Resource locks shared by every session.
    locks: Arc<LockManager>,
    /// Shared counters.
    stats: Arc<EngineStats>,
    /// Configuration.
    config: Config,
}

impl<C: Connector> ReservationEngine<C> {
    /// Creates an engine with the default configuration.
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, Config::default())
    }

    /// Creates an engine with a custom configuration.
    pub fn with_config(connector: C, config: Config) -> Self {
        Self {
            connector,
            locks: Arc::new(LockManager::new()),
            stats: Arc::new(EngineStats::new()),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the engine statistics.
    #[must_use]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Returns the lock manager.
    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Opens a session on a fresh connection.
    ///
    /// The session shares this engine's locks and stats, so callers can run
    /// their own `begin`/`commit`/`rollback` brackets alongside reservations.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if no connection could be opened.
    pub fn session(&self) -> CoreResult<TransactionManager<C::Connection>> {
        let connection = self.connector.connect()?;
        Ok(TransactionManager::new(connection)
            .with_lock_manager(Arc::clone(&self.locks))
            .with_stats(Arc::clone(&self.stats)))
    }

    /// Provisions a resource with `total_units` free units, atomically.
    ///
    /// Units are named `<resource>/0001` onwards.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `total_units` is zero or above
    /// [`Config::max_units_per_resource`], `Data` if the resource exists.
    pub fn create_resource(
        &self,
        resource_id: &ResourceId,
        total_units: u32,
    ) -> CoreResult<Vec<UnitId>> {
        if total_units == 0 || total_units > self.config.max_units_per_resource {
            return Err(CoreError::invalid_operation(format!(
                "total_units must be between 1 and {}, got {total_units}",
                self.config.max_units_per_resource
            )));
        }

        let mut session = self.session()?;
        let units = session.run_in_transaction(|tx| {
            tx.execute(&layout::insert_resource(resource_id, total_units))?;
            (1..=total_units)
                .map(|index| -> CoreResult<UnitId> {
                    let unit = UnitId::for_resource(resource_id, index);
                    tx.execute(&layout::insert_unit(&unit, resource_id))?;
                    Ok(unit)
                })
                .collect::<CoreResult<Vec<_>>>()
        })?;

        tracing::info!(resource = %resource_id, total_units, "resource created");
        Ok(units)
    }

    /// Reserves any free unit of a resource for `requester_id`.
    ///
    /// Blocks for the resource lock up to `timeout`, or
    /// [`Config::lock_timeout`] when `None`.
    pub fn reserve(
        &self,
        resource_id: &ResourceId,
        requester_id: &RequesterId,
        timeout: Option<Duration>,
    ) -> Reservation {
        let timeout = timeout.or(self.config.lock_timeout);
        let result = self.session().and_then(|mut session| {
            session.run_in_transaction(|tx| {
                tx.lock(resource_id, timeout)?;
                let resource = load_resource(tx, resource_id)?;
                if resource.available_units == 0 {
                    return Err(CoreError::ResourceExhausted {
                        resource_id: resource_id.clone(),
                    });
                }

                let row = tx
                    .execute(&layout::first_free_unit(resource_id))?
                    .into_first()
                    .ok_or_else(|| {
                        CoreError::invalid_record(format!(
                            "resource {resource_id} reports {} available but has no free unit",
                            resource.available_units
                        ))
                    })?;
                let unit = UnitRecord::from_row(&row)?;
                take_unit(tx, &resource, &unit.id, requester_id)?;
                Ok(unit.id)
            })
        });
        self.conclude(resource_id, requester_id, result)
    }

    /// Reserves one specific unit of a resource for `requester_id`.
    ///
    /// Fails with `UnitUnavailable` if the unit is held, `ResourceExhausted`
    /// if the pool is empty, and `UnitNotFound` if the unit does not belong
    /// to the resource.
    pub fn reserve_unit(
        &self,
        resource_id: &ResourceId,
        unit_id: &UnitId,
        requester_id: &RequesterId,
        timeout: Option<Duration>,
    ) -> Reservation {
        let timeout = timeout.or(self.config.lock_timeout);
        let result = self.session().and_then(|mut session| {
            session.run_in_transaction(|tx| {
                tx.lock(resource_id, timeout)?;
                let resource = load_resource(tx, resource_id)?;
                let unit = load_unit(tx, unit_id)?;
                if unit.resource_id != *resource_id {
                    return Err(CoreError::UnitNotFound {
                        unit_id: unit_id.clone(),
                    });
                }
                if resource.available_units == 0 {
                    return Err(CoreError::ResourceExhausted {
                        resource_id: resource_id.clone(),
                    });
                }
                if !unit.is_free() {
                    return Err(CoreError::UnitUnavailable {
                        unit_id: unit_id.clone(),
                    });
                }
                take_unit(tx, &resource, unit_id, requester_id)?;
                Ok(unit_id.clone())
            })
        });
        self.conclude(resource_id, requester_id, result)
    }

    /// Returns a held unit to its pool.
    ///
    /// Releasing a unit that is already free succeeds without changing
    /// anything.
    ///
    /// The owning resource is looked up with an unlocked read before the
    /// transaction opens, which costs one extra round trip. Through a scoped
    /// connector, a unit belonging to another tenant is reported as
    /// `UnitNotFound`.
    ///
    /// # Errors
    ///
    /// Returns `UnitNotFound` for unknown units, `LockTimeout` if the resource
    /// lock is not granted in time, or the executor's error.
    pub fn release(&self, unit_id: &UnitId, timeout: Option<Duration>) -> CoreResult<()> {
        let timeout = timeout.or(self.config.lock_timeout);
        // A unit never moves between resources, so an unlocked read finds the right lock.
        let resource_id = self.unit(unit_id)?.resource_id;

        let mut session = self.session()?;
        let changed = session.run_in_transaction(|tx| {
            tx.lock(&resource_id, timeout)?;
            let unit = load_unit(tx, unit_id)?;
            if unit.is_free() {
                return Ok(false);
            }

            let resource = load_resource(tx, &resource_id)?;
            if resource.available_units >= resource.total_units {
                return Err(CoreError::invalid_record(format!(
                    "unit {unit_id} is held but resource {resource_id} is full"
                )));
            }
            if tx.execute(&layout::free_unit(unit_id))?.affected() != 1 {
                return Err(CoreError::invalid_record(format!(
                    "unit {unit_id} changed while locked"
                )));
            }
            set_available(tx, &resource, resource.available_units + 1)?;
            Ok(true)
        })?;

        self.stats.record_release(changed);
        tracing::debug!(unit = %unit_id, resource = %resource_id, changed, "unit released");
        Ok(())
    }

    /// Reads a resource without locking it.
    ///
    /// The result may be stale by the time it is returned and must not be
    /// used to decide whether to reserve.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for unknown resources.
    pub fn resource(&self, resource_id: &ResourceId) -> CoreResult<ResourceRecord> {
        load_resource(&mut self.session()?, resource_id)
    }

    /// Reads `available_units` without locking. May be stale.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for unknown resources.
    pub fn available_units(&self, resource_id: &ResourceId) -> CoreResult<u32> {
        Ok(self.resource(resource_id)?.available_units)
    }

    /// Reads a unit without locking. May be stale.
    ///
    /// # Errors
    ///
    /// Returns `UnitNotFound` for unknown units.
    pub fn unit(&self, unit_id: &UnitId) -> CoreResult<UnitRecord> {
        load_unit(&mut self.session()?, unit_id)
    }

    /// Reads who holds a unit without locking. May be stale.
    ///
    /// # Errors
    ///
    /// Returns `UnitNotFound` for unknown units.
    pub fn holder_of(&self, unit_id: &UnitId) -> CoreResult<Option<RequesterId>> {
        Ok(self.unit(unit_id)?.holder)
    }

    fn conclude(
        &self,
        resource_id: &ResourceId,
        requester_id: &RequesterId,
        result: CoreResult<UnitId>,
    ) -> Reservation {
        match &result {
            Ok(unit) => {
                self.stats.record_granted();
                tracing::debug!(resource = %resource_id, requester = %requester_id, %unit, "reservation granted");
            }
            Err(CoreError::ResourceExhausted { .. } | CoreError::UnitUnavailable { .. }) => {
                self.stats.record_rejected();
                tracing::debug!(resource = %resource_id, requester = %requester_id, "reservation rejected");
            }
            Err(err) => {
                self.stats.record_failed();
                tracing::warn!(resource = %resource_id, requester = %requester_id, error = %err, "reservation failed");
            }
        }
        result.into()
    }
}

impl<C> std::fmt::Debug for ReservationEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationEngine")
            .field("config", &self.config)
            .field("locked", &self.locks.locked_count())
            .finish_non_exhaustive()
    }
}

fn load_resource<E: StatementExecutor>(
    tx: &mut TransactionManager<E>,
    resource_id: &ResourceId,
) -> CoreResult<ResourceRecord> {
    let row = tx
        .execute(&layout::select_resource(resource_id))?
        .into_first()
        .ok_or_else(|| CoreError::ResourceNotFound {
            resource_id: resource_id.clone(),
        })?;
    ResourceRecord::from_row(&row)
}

fn load_unit<E: StatementExecutor>(
    tx: &mut TransactionManager<E>,
    unit_id: &UnitId,
) -> CoreResult<UnitRecord> {
    let row = tx
        .execute(&layout::select_unit(unit_id))?
        .into_first()
        .ok_or_else(|| CoreError::UnitNotFound {
            unit_id: unit_id.clone(),
        })?;
    UnitRecord::from_row(&row)
}

/// Marks `unit_id` held and takes one unit off the pool. Caller holds the lock.
fn take_unit<E: StatementExecutor>(
    tx: &mut TransactionManager<E>,
    resource: &ResourceRecord,
    unit_id: &UnitId,
    requester_id: &RequesterId,
) -> CoreResult<()> {
    if tx.execute(&layout::hold_unit(unit_id, requester_id))?.affected() != 1 {
        return Err(CoreError::UnitUnavailable {
            unit_id: unit_id.clone(),
        });
    }
    set_available(tx, resource, resource.available_units - 1)
}

fn set_available<E: StatementExecutor>(
    tx: &mut TransactionManager<E>,
    resource: &ResourceRecord,
    available: u32,
) -> CoreResult<()> {
    let outcome = tx.execute(&layout::set_available(
        &resource.id,
        resource.available_units,
        available,
    ))?;
    if outcome.affected() != 1 {
        return Err(CoreError::invalid_record(format!(
            "available_units of {} changed while locked",
            resource.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::UnitStatus;
    use reservo_executor::{ExecError, InMemoryEngine};

    fn flight() -> ResourceId {
        ResourceId::new("FL100")
    }

    fn requester(name: &str) -> RequesterId {
        RequesterId::new(name)
    }

    fn create_engine(units: u32) -> (InMemoryEngine, ReservationEngine<InMemoryEngine>) {
        let db = layout::tests::installed();
        let engine = ReservationEngine::new(db.clone());
        engine.create_resource(&flight(), units).unwrap();
        (db, engine)
    }

    #[test]
    fn create_resource_provisions_free_units() {
        let (db, engine) = create_engine(3);
        let resource = engine.resource(&flight()).unwrap();
        assert_eq!(resource.total_units, 3);
        assert_eq!(resource.available_units, 3);
        assert_eq!(db.row_count(layout::UNITS), 3);

        let unit = engine.unit(&UnitId::new("FL100/0001")).unwrap();
        assert_eq!(unit.status, UnitStatus::Free);
    }

    #[test]
    fn create_resource_validates_size() {
        let (_db, engine) = create_engine(1);
        let other = ResourceId::new("FL200");
        assert!(matches!(
            engine.create_resource(&other, 0),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            engine.create_resource(&other, 10_001),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn create_duplicate_resource_is_atomic_data_error() {
        let (db, engine) = create_engine(2);
        let err = engine.create_resource(&flight(), 5).unwrap_err();
        assert!(err.is_data());
        assert_eq!(db.row_count(layout::UNITS), 2);
        assert_eq!(engine.available_units(&flight()).unwrap(), 2);
    }

    #[test]
    fn reserve_takes_one_unit() {
        let (_db, engine) = create_engine(2);
        let alice = requester("alice");

        let reservation = engine.reserve(&flight(), &alice, None);
        assert!(reservation.is_success());
        let unit = reservation.unit_id.unwrap();

        assert_eq!(engine.available_units(&flight()).unwrap(), 1);
        assert_eq!(engine.holder_of(&unit).unwrap(), Some(alice));
        assert_eq!(engine.locks().locked_count(), 0);
    }

    #[test]
    fn reserve_on_empty_pool_is_exhausted() {
        let (_db, engine) = create_engine(1);
        assert!(engine.reserve(&flight(), &requester("alice"), None).is_success());

        let bob = engine.reserve(&flight(), &requester("bob"), None);
        assert!(bob.is_exhausted());
        assert_eq!(engine.available_units(&flight()).unwrap(), 0);

        let snap = engine.stats().snapshot();
        assert_eq!(snap.reservations_granted, 1);
        assert_eq!(snap.reservations_rejected, 1);
    }

    #[test]
    fn reserve_unknown_resource() {
        let (_db, engine) = create_engine(1);
        let r = engine.reserve(&ResourceId::new("nope"), &requester("alice"), None);
        assert!(matches!(r.reason, Some(CoreError::ResourceNotFound { .. })));
    }

    #[test]
    fn data_error_mid_reservation_rolls_back() {
        let (db, engine) = create_engine(2);
        db.fail_next_write(ExecError::data("column \"sss\" does not exist"));

        let r = engine.reserve(&flight(), &requester("alice"), None);
        assert!(!r.is_success());
        assert!(r.reason.as_ref().is_some_and(CoreError::is_data));

        assert_eq!(engine.available_units(&flight()).unwrap(), 2);
        assert_eq!(engine.locks().locked_count(), 0);
        assert!(engine.reserve(&flight(), &requester("alice"), None).is_success());
    }

    #[test]
    fn connection_error_fails_reservation() {
        let (db, engine) = create_engine(2);
        db.set_unavailable(true);
        let r = engine.reserve(&flight(), &requester("alice"), None);
        assert!(r.reason.as_ref().is_some_and(CoreError::is_connection));

        db.set_unavailable(false);
        assert_eq!(engine.available_units(&flight()).unwrap(), 2);
        assert_eq!(engine.stats().snapshot().reservations_failed, 1);
    }

    #[test]
    fn lock_timeout_leaves_pool_untouched() {
        let (_db, engine) = create_engine(2);
        let mut holder = engine.session().unwrap();
        holder.begin().unwrap();
        holder.lock(&flight(), None).unwrap();

        let r = engine.reserve(&flight(), &requester("bob"), Some(Duration::from_millis(20)));
        assert!(r.is_lock_timeout());

        holder.rollback().unwrap();
        assert_eq!(engine.available_units(&flight()).unwrap(), 2);
        assert_eq!(engine.stats().snapshot().lock_timeouts, 1);
    }

    #[test]
    fn reserve_specific_unit() {
        let (_db, engine) = create_engine(3);
        let seat = UnitId::new("FL100/0002");

        let alice = engine.reserve_unit(&flight(), &seat, &requester("alice"), None);
        assert_eq!(alice.unit_id.as_ref(), Some(&seat));

        let bob = engine.reserve_unit(&flight(), &seat, &requester("bob"), None);
        assert!(matches!(bob.reason, Some(CoreError::UnitUnavailable { .. })));
        assert_eq!(engine.available_units(&flight()).unwrap(), 2);
        assert_eq!(engine.holder_of(&seat).unwrap(), Some(requester("alice")));
    }

    #[test]
    fn reserve_unit_of_other_resource_is_not_found() {
        let (_db, engine) = create_engine(1);
        let other = ResourceId::new("FL200");
        engine.create_resource(&other, 1).unwrap();

        let r = engine.reserve_unit(&flight(), &UnitId::new("FL200/0001"), &requester("a"), None);
        assert!(matches!(r.reason, Some(CoreError::UnitNotFound { .. })));
        assert_eq!(engine.available_units(&other).unwrap(), 1);
    }

    #[test]
    fn release_returns_unit_to_pool() {
        let (_db, engine) = create_engine(1);
        let unit = engine
            .reserve(&flight(), &requester("alice"), None)
            .unit_id
            .unwrap();

        engine.release(&unit, None).unwrap();
        assert_eq!(engine.available_units(&flight()).unwrap(), 1);
        assert_eq!(engine.holder_of(&unit).unwrap(), None);
        assert!(engine.reserve(&flight(), &requester("bob"), None).is_success());
    }

    #[test]
    fn release_is_idempotent() {
        let (_db, engine) = create_engine(2);
        let unit = engine
            .reserve(&flight(), &requester("alice"), None)
            .unit_id
            .unwrap();

        engine.release(&unit, None).unwrap();
        engine.release(&unit, None).unwrap();

        assert_eq!(engine.available_units(&flight()).unwrap(), 2);
        let snap = engine.stats().snapshot();
        assert_eq!(snap.releases, 1);
        assert_eq!(snap.noop_releases, 1);
    }

    #[test]
    fn unbounded_timeout_is_accepted() {
        let (_db, engine) = create_engine(2);
        let forever = Some(Duration::MAX);

        let unit = engine
            .reserve(&flight(), &requester("alice"), forever)
            .unit_id
            .unwrap();
        let first = UnitId::for_resource(&flight(), 1);
        let other = if unit == first {
            UnitId::for_resource(&flight(), 2)
        } else {
            first
        };
        assert!(engine
            .reserve_unit(&flight(), &other, &requester("bob"), forever)
            .is_success());
        engine.release(&unit, forever).unwrap();

        assert_eq!(engine.available_units(&flight()).unwrap(), 1);
        assert_eq!(engine.locks().locked_count(), 0);
    }

    #[test]
    fn release_unknown_unit() {
        let (_db, engine) = create_engine(1);
        assert!(matches!(
            engine.release(&UnitId::new("FL100/9999"), None),
            Err(CoreError::UnitNotFound { .. })
        ));
    }

    #[test]
    fn session_exposes_transaction_control() {
        let (db, engine) = create_engine(1);
        let mut session = engine.session().unwrap();
        session.begin().unwrap();
        session
            .execute(&layout::set_available(&flight(), 1, 0))
            .unwrap();
        session.rollback().unwrap();
        assert_eq!(
            db.row(layout::RESOURCES, "FL100").unwrap().int(layout::AVAILABLE_UNITS),
            Some(1)
        );
    }
}
