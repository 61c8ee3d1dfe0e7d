//! The reservation engine over a tenant-scoped connector.

use reservo_core::{layout, CoreError, RequesterId, ReservationEngine, ResourceId};
use reservo_executor::{InMemoryEngine, Predicate, ScopedConnector, Value};
use reservo_testkit::fixtures::install_layout;

const TENANT: &str = "tenant_id";

fn scoped_engine(db: &InMemoryEngine, tenant: &str) -> ReservationEngine<ScopedConnector<InMemoryEngine>> {
    ReservationEngine::new(ScopedConnector::new(
        db.clone(),
        Predicate::eq(TENANT, tenant),
    ))
}

#[test]
fn tenants_see_only_their_own_rows() {
    let db = InMemoryEngine::new();
    install_layout(&db, &[TENANT]).unwrap();

    let acme = scoped_engine(&db, "acme");
    let globex = scoped_engine(&db, "globex");

    let acme_flight = ResourceId::new("ACME-1");
    acme.create_resource(&acme_flight, 2).unwrap();

    let row = db.row(layout::RESOURCES, "ACME-1").unwrap();
    assert_eq!(row.get(TENANT), Some(&Value::text("acme")));

    let r = globex.reserve(&acme_flight, &RequesterId::new("mallory"), None);
    assert!(matches!(
        r.reason,
        Some(reservo_core::CoreError::ResourceNotFound { .. })
    ));
    assert_eq!(acme.available_units(&acme_flight).unwrap(), 2);

    let r = acme.reserve(&acme_flight, &RequesterId::new("alice"), None);
    assert!(r.is_success());
    let unit = r.unit_id.unwrap();
    assert!(matches!(
        globex.release(&unit, None),
        Err(CoreError::UnitNotFound { .. })
    ));
    assert_eq!(acme.holder_of(&unit).unwrap(), Some(RequesterId::new("alice")));
}
