//! Transaction management.
//!
//! A [`TransactionManager`] owns one connection and decides, per statement,
//! whether it runs inside an explicit transaction or auto-commits on its own:
//! - **Idle**: every statement is its own implicit transaction
//! - **Active**: statements accumulate until `commit` or `rollback`
//! - **Poisoned**: a statement failed; everything but `rollback` is refused

mod manager;
mod state;

pub use manager::TransactionManager;
pub use state::{Transaction, TransactionState};
