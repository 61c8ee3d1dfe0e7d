//! Simulate command implementation.

use reservo_core::{Config, CoreError};
use reservo_testkit::{run_reservation_stress, StressConfig, StressTestResult};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Simulation parameters.
#[derive(Debug, Clone, Serialize)]
pub struct Options {
    /// Units per resource.
    pub units: u32,
    /// Concurrent clients.
    pub clients: usize,
    /// Resources clients are spread over.
    pub resources: usize,
    /// Time spent holding the lock, in milliseconds.
    pub hold_ms: u64,
    /// Lock timeout in milliseconds; `None` waits forever.
    pub timeout_ms: Option<u64>,
}

/// Simulation report.
#[derive(Debug, Serialize)]
pub struct SimulateResult {
    /// Parameters the run used.
    pub options: Options,
    /// What happened.
    pub outcome: StressTestResult,
    /// True if no resource was oversold and the lock was never shared.
    pub consistent: bool,
}

/// Runs the simulation and returns its report.
pub fn simulate(options: &Options) -> Result<SimulateResult, CoreError> {
    if options.clients == 0 || options.resources == 0 {
        return Err(CoreError::invalid_operation(
            "clients and resources must both be at least 1",
        ));
    }

    let stress = StressConfig {
        units: options.units,
        clients: options.clients,
        resources: options.resources,
        hold: Duration::from_millis(options.hold_ms),
        lock_timeout: None,
    };
    let config = Config::new().lock_timeout(options.timeout_ms.map(Duration::from_millis));

    info!(
        units = options.units,
        clients = options.clients,
        resources = options.resources,
        "starting simulation"
    );
    let outcome = run_reservation_stress(&stress, config)?;

    let capacity = u64::from(options.units) * options.resources as u64;
    let remaining: u64 = outcome
        .final_available
        .iter()
        .map(|(_, available)| u64::from(*available))
        .sum();
    let consistent = outcome.max_concurrent_holders <= 1
        && outcome.successful_ops as u64 <= capacity
        && remaining + outcome.successful_ops as u64 == capacity;

    Ok(SimulateResult {
        options: options.clone(),
        outcome,
        consistent,
    })
}

/// Runs the simulate command.
pub fn run(options: &Options, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = simulate(options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            result.outcome.print_summary("Reservation simulation");
            println!(
                "Consistent: {}",
                if result.consistent { "yes" } else { "NO" }
            );
        }
    }

    if !result.consistent {
        return Err("simulation observed an inconsistent outcome".into());
    }
    Ok(())
}
