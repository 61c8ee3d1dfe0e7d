//! Test fixtures and engine helpers.
//!
//! Provides convenience functions for setting up a reference engine with the
//! storage layout installed and a resource already provisioned.

use reservo_core::{layout, Config, RequesterId, ReservationEngine, ResourceId, UnitId};
use reservo_executor::{ExecResult, InMemoryEngine};

/// Creates the reservation tables on a reference engine.
///
/// `extra_columns` are appended to both tables, e.g. a tenant column for
/// scoped connectors.
///
/// # Errors
///
/// Returns a data error if either table already exists.
pub fn install_layout(db: &InMemoryEngine, extra_columns: &[&str]) -> ExecResult<()> {
    db.create_table(layout::RESOURCES, &layout::resource_columns(extra_columns))?;
    db.create_table(layout::UNITS, &layout::unit_columns(extra_columns))
}

/// Resource id used by the single-resource fixtures.
pub const DEFAULT_RESOURCE: &str = "FL100";

/// A reservation engine over a fresh in-memory store.
pub struct TestEngine {
    /// Direct handle on the store, for assertions and fault injection.
    pub db: InMemoryEngine,
    /// The engine under test.
    pub engine: ReservationEngine<InMemoryEngine>,
    /// The seeded resource.
    pub resource: ResourceId,
    /// Units of the seeded resource, in creation order.
    pub units: Vec<UnitId>,
}

impl TestEngine {
    /// Creates an engine with one resource of `units` units.
    pub fn seeded(units: u32) -> Self {
        Self::with_config(units, Config::default())
    }

    /// Creates an engine with a custom configuration and one resource.
    pub fn with_config(units: u32, config: Config) -> Self {
        let db = InMemoryEngine::new();
        install_layout(&db, &[]).expect("Failed to install layout");
        let engine = ReservationEngine::with_config(db.clone(), config);
        let resource = ResourceId::new(DEFAULT_RESOURCE);
        let units = engine
            .create_resource(&resource, units)
            .expect("Failed to create resource");
        Self {
            db,
            engine,
            resource,
            units,
        }
    }

    /// Adds another resource and returns its units.
    pub fn add_resource(&self, id: &str, units: u32) -> Vec<UnitId> {
        self.engine
            .create_resource(&ResourceId::new(id), units)
            .expect("Failed to create resource")
    }

    /// Returns the committed `available_units` of the seeded resource.
    pub fn available(&self) -> u32 {
        self.engine
            .available_units(&self.resource)
            .expect("Seeded resource vanished")
    }

    /// Counts committed held units of a resource.
    pub fn held_units(&self, resource: &ResourceId) -> usize {
        let mut session = self.engine.session().expect("Failed to open session");
        session
            .execute(
                &reservo_executor::Statement::scan(layout::UNITS)
                    .filter(layout::RESOURCE_ID, resource.as_str())
                    .filter(layout::STATUS, layout::UnitStatus::Held.as_str()),
            )
            .expect("Failed to scan units")
            .into_rows()
            .len()
    }
}

impl std::ops::Deref for TestEngine {
    type Target = ReservationEngine<InMemoryEngine>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test against a freshly seeded engine.
///
/// # Example
///
/// ```rust,ignore
/// use reservo_testkit::with_seeded_engine;
///
/// #[test]
/// fn my_test() {
///     with_seeded_engine(2, |fixture| {
///         assert_eq!(fixture.available(), 2);
///     });
/// }
/// ```
pub fn with_seeded_engine<F, R>(units: u32, f: F) -> R
where
    F: FnOnce(&TestEngine) -> R,
{
    let fixture = TestEngine::seeded(units);
    f(&fixture)
}

/// Creates a bare store holding `employees(first_name, last_name)`.
///
/// Used by the batch-discipline tests, which need an ordinary table rather
/// than the reservation layout.
pub fn employees_engine() -> InMemoryEngine {
    let db = InMemoryEngine::new();
    db.create_table("employees", &["first_name", "last_name"])
        .expect("Failed to create employees");
    db
}

/// Returns a deterministic requester id.
pub fn requester(n: usize) -> RequesterId {
    RequesterId::new(format!("client-{n:04}"))
}
