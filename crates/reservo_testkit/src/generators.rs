//! Property-based test generators using proptest.
//!
//! Provides strategies for generating identifiers and reservation workloads.

use proptest::prelude::*;
use reservo_core::{RequesterId, ResourceId};

/// Strategy for generating valid resource ids.
pub fn resource_id_strategy() -> impl Strategy<Value = ResourceId> {
    prop::string::string_regex("[A-Z]{2}[0-9]{1,4}")
        .expect("Invalid regex")
        .prop_map(ResourceId::new)
}

/// Strategy for generating requester ids.
pub fn requester_id_strategy() -> impl Strategy<Value = RequesterId> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}")
        .expect("Invalid regex")
        .prop_map(RequesterId::new)
}

/// Strategy for a resource pool size.
pub fn pool_size_strategy() -> impl Strategy<Value = u32> {
    1u32..=16
}

/// A single step of a reservation workload.
#[derive(Debug, Clone)]
pub enum ReservationOp {
    /// Reserve any unit for requester `n`.
    Reserve(usize),
    /// Reserve the unit at this index of the pool.
    ReserveUnit(usize, usize),
    /// Release the unit at this index of the pool, held or not.
    Release(usize),
}

/// Strategy for generating a single workload step.
pub fn reservation_op_strategy() -> impl Strategy<Value = ReservationOp> {
    prop_oneof![
        4 => (0usize..64).prop_map(ReservationOp::Reserve),
        1 => (0usize..64, 0usize..32).prop_map(|(n, unit)| ReservationOp::ReserveUnit(n, unit)),
        3 => (0usize..32).prop_map(ReservationOp::Release),
    ]
}

/// Strategy for generating a workload of bounded length.
pub fn reservation_workload_strategy(
    max_len: usize,
) -> impl Strategy<Value = Vec<ReservationOp>> {
    prop::collection::vec(reservation_op_strategy(), 0..max_len)
}
