//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use reservo_core::{RequesterId, ReservationEngine, ResourceId};
use reservo_executor::InMemoryEngine;
use reservo_testkit::fixtures::install_layout;

/// Builds an engine with `resources` resources of `units` units each.
pub fn seeded_engine(
    resources: usize,
    units: u32,
) -> (ReservationEngine<InMemoryEngine>, Vec<ResourceId>) {
    let db = InMemoryEngine::new();
    install_layout(&db, &[]).expect("Failed to install layout");
    let engine = ReservationEngine::new(db);
    let ids: Vec<_> = (0..resources)
        .map(|i| ResourceId::new(format!("BENCH{i:04}")))
        .collect();
    for id in &ids {
        engine
            .create_resource(id, units)
            .expect("Failed to create resource");
    }
    (engine, ids)
}

/// Picks a resource uniformly at random.
pub fn random_resource<'a, R: Rng>(rng: &mut R, resources: &'a [ResourceId]) -> &'a ResourceId {
    &resources[rng.gen_range(0..resources.len())]
}

/// Generates a random requester id.
pub fn random_requester<R: Rng>(rng: &mut R) -> RequesterId {
    RequesterId::new(format!("bench-{:08x}", rng.gen::<u32>()))
}
