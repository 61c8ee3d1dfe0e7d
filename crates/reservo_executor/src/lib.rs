//! # Reservo Executor
//!
//! The statement execution boundary for reservo.
//!
//! This crate is the only place where control leaves the reservation core.
//! Executors are **opaque**: the transaction layer hands them statements and
//! receives either an [`Outcome`] or a classified [`ExecError`]. It never looks
//! inside a statement.
//!
//! ## Design Principles
//!
//! - One connection per logical caller; a connection owns its transaction block
//! - Failures are classified as data errors or connection errors, nothing else
//! - Outside an explicit block, every statement commits on its own
//!
//! ## Available Executors
//!
//! - [`InMemoryEngine`] / [`InMemoryConnection`] - Reference engine for tests and demos
//! - [`ScopedExecutor`] - Decorator that pins every statement to one tenant
//!
//! ## Example
//!
//! ```rust
//! use reservo_executor::{Connector, InMemoryEngine, Statement, StatementExecutor, Value};
//!
//! let engine = InMemoryEngine::new();
//! engine.create_table("employees", &["last_name"]).unwrap();
//!
//! let mut conn = engine.connect().unwrap();
//! conn.execute(&Statement::insert("employees", "1", [("last_name", Value::text("Smith"))]))
//!     .unwrap();
//! let rows = conn.execute(&Statement::get("employees", "1")).unwrap().into_rows();
//! assert_eq!(rows[0].get("last_name"), Some(&Value::text("Smith")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod executor;
mod memory;
mod scoped;
mod statement;

pub use error::{ExecError, ExecResult, FailureKind};
pub use executor::{Connector, StatementExecutor};
pub use memory::{InMemoryConnection, InMemoryEngine};
pub use scoped::{ScopedConnector, ScopedExecutor};
pub use statement::{Outcome, Predicate, Row, Statement, Value, ID_COLUMN};
