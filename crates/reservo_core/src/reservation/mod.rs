//! Reservations against finite resource pools.
//!
//! Every check-then-mutate operation runs while holding the resource's lock
//! and inside one explicit transaction, so the number of granted
//! reservations can never exceed a resource's `total_units`.

mod engine;
mod outcome;

pub use engine::ReservationEngine;
pub use outcome::Reservation;
