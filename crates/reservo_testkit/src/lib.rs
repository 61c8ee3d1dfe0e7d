//! # Reservo Testkit
//!
//! Test utilities for reservo.
//!
//! This crate provides:
//! - Fixtures that install the storage layout and seed resources
//! - A concurrent stress harness that counts simultaneous lock holders
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reservo_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_engine() {
//!     with_seeded_engine(3, |fixture| {
//!         let r = fixture.reserve(&fixture.resource, &requester(0), None);
//!         assert!(r.is_success());
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
