//! # Reservo Core
//!
//! Transactional reservation engine for finite resource pools.
//!
//! This crate provides:
//! - An explicit transaction state machine with auto-commit outside `begin`
//! - Poisoning of an explicit transaction after any failed statement
//! - A per-resource exclusive lock manager with FCFS hand-off and timeouts
//! - A reservation engine that checks and decrements a pool under one lock
//!   and one transaction bracket
//!
//! The storage engine is an external collaborator reached only through
//! [`reservo_executor::StatementExecutor`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod layout;
mod lock;
mod reservation;
mod stats;
mod transaction;
mod types;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use layout::{ResourceRecord, UnitRecord, UnitStatus};
pub use lock::LockManager;
pub use reservation::{Reservation, ReservationEngine};
pub use stats::{EngineStats, StatsSnapshot};
pub use transaction::{Transaction, TransactionManager, TransactionState};
pub use types::{RequesterId, ResourceId, TransactionId, UnitId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
