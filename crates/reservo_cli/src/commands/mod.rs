//! CLI command implementations.

pub mod batch_demo;
pub mod simulate;
