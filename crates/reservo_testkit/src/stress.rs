//! Stress tests for reservo.
//!
//! Runs many concurrent clients against a [`ReservationEngine`] and counts
//! how many of them are ever inside the same resource's critical section.

use parking_lot::Mutex;
use reservo_core::{layout, CoreError, RequesterId, ReservationEngine, ResourceId};
use reservo_executor::{Connector, ExecResult, Outcome, Statement, StatementExecutor};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Total reservation attempts.
    pub total_ops: usize,
    /// Reservations granted.
    pub successful_ops: usize,
    /// Reservations refused because the pool was empty.
    pub exhausted_ops: usize,
    /// Reservations that gave up waiting for the lock.
    pub timed_out_ops: usize,
    /// Reservations that failed for any other reason.
    pub failed_ops: usize,
    /// Highest number of clients seen inside one resource's critical section.
    pub max_concurrent_holders: usize,
    /// Committed `available_units` per resource after the run.
    pub final_available: Vec<(String, u32)>,
    /// Total duration.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

impl StressTestResult {
    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Granted: {}", self.successful_ops);
        println!("Exhausted: {}", self.exhausted_ops);
        println!("Lock timeouts: {}", self.timed_out_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Max concurrent holders: {}", self.max_concurrent_holders);
        for (resource, available) in &self.final_available {
            println!("Available on {}: {}", resource, available);
        }
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Units per resource.
    pub units: u32,
    /// Number of concurrent clients, one reservation each.
    pub clients: usize,
    /// Number of resources; client `i` targets resource `i % resources`.
    pub resources: usize,
    /// Time each client spends inside the critical section.
    pub hold: Duration,
    /// Lock timeout per reservation. `None` uses the engine's config.
    pub lock_timeout: Option<Duration>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            units: 10,
            clients: 50,
            resources: 1,
            hold: Duration::ZERO,
            lock_timeout: None,
        }
    }
}

impl StressConfig {
    /// Resource ids used by a run with this configuration.
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        (0..self.resources.max(1))
            .map(|i| ResourceId::new(format!("R{:03}", i + 1)))
            .collect()
    }
}

/// Counts connections inside each resource's critical section.
///
/// A connection enters when, inside an explicit block, it first reads a
/// resource row, which the engine only does after the resource lock is
/// granted. It leaves when the block ends.
#[derive(Debug, Default)]
pub struct HolderProbe {
    inside: Mutex<HashMap<String, usize>>,
    max: AtomicUsize,
    hold: Duration,
}

impl HolderProbe {
    /// Creates a probe that keeps each holder inside for `hold`.
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    /// Highest count observed for any single resource.
    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    fn enter(&self, resource: &str) {
        let now = {
            let mut inside = self.inside.lock();
            let count = inside.entry(resource.to_string()).or_default();
            *count += 1;
            *count
        };
        self.max.fetch_max(now, Ordering::SeqCst);
        if !self.hold.is_zero() {
            thread::sleep(self.hold);
        }
    }

    fn leave(&self, resource: &str) {
        if let Some(count) = self.inside.lock().get_mut(resource) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Connector whose connections report to a [`HolderProbe`].
#[derive(Debug, Clone)]
pub struct ProbedConnector<C> {
    inner: C,
    probe: Arc<HolderProbe>,
}

impl<C> ProbedConnector<C> {
    /// Wraps `inner`.
    pub fn new(inner: C, probe: Arc<HolderProbe>) -> Self {
        Self { inner, probe }
    }
}

impl<C: Connector> Connector for ProbedConnector<C> {
    type Connection = ProbedConnection<C::Connection>;

    fn connect(&self) -> ExecResult<Self::Connection> {
        Ok(ProbedConnection {
            inner: self.inner.connect()?,
            probe: Arc::clone(&self.probe),
            in_block: false,
            entered: None,
        })
    }
}

/// A connection instrumented by [`ProbedConnector`].
#[derive(Debug)]
pub struct ProbedConnection<E> {
    inner: E,
    probe: Arc<HolderProbe>,
    in_block: bool,
    entered: Option<String>,
}

impl<E> ProbedConnection<E> {
    fn leave(&mut self) {
        if let Some(resource) = self.entered.take() {
            self.probe.leave(&resource);
        }
    }
}

impl<E: StatementExecutor> StatementExecutor for ProbedConnection<E> {
    fn execute(&mut self, statement: &Statement) -> ExecResult<Outcome> {
        match statement {
            Statement::Begin => {
                let outcome = self.inner.execute(statement)?;
                self.in_block = true;
                Ok(outcome)
            }
            Statement::Commit | Statement::Rollback => {
                self.leave();
                self.in_block = false;
                self.inner.execute(statement)
            }
            Statement::Get { table, id, .. }
                if self.in_block && self.entered.is_none() && table == layout::RESOURCES =>
            {
                self.probe.enter(id);
                self.entered = Some(id.clone());
                self.inner.execute(statement)
            }
            _ => self.inner.execute(statement),
        }
    }
}

impl<E> Drop for ProbedConnection<E> {
    fn drop(&mut self) {
        self.leave();
    }
}

/// Runs `config.clients` concurrent reservations against `engine`.
///
/// The resources named by [`StressConfig::resource_ids`] must already exist.
/// Pass an engine built on a [`ProbedConnector`] to have the probe observe
/// the run; `max_concurrent_holders` is read from `probe`.
pub fn stress_concurrent_reserve<C>(
    engine: Arc<ReservationEngine<C>>,
    probe: &HolderProbe,
    config: &StressConfig,
) -> StressTestResult
where
    C: Connector + 'static,
{
    let resources = Arc::new(config.resource_ids());
    let start = Instant::now();

    let handles: Vec<_> = (0..config.clients)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let resources = Arc::clone(&resources);
            let timeout = config.lock_timeout;
            thread::spawn(move || {
                let resource = &resources[i % resources.len()];
                let requester = RequesterId::new(format!("client-{i:04}"));
                engine.reserve(resource, &requester, timeout)
            })
        })
        .collect();

    let mut successful = 0usize;
    let mut exhausted = 0usize;
    let mut timed_out = 0usize;
    let mut failed = 0usize;
    for handle in handles {
        let reservation = handle.join().expect("Thread panicked");
        match reservation.reason {
            None => successful += 1,
            Some(CoreError::ResourceExhausted { .. }) => exhausted += 1,
            Some(CoreError::LockTimeout { .. }) => timed_out += 1,
            Some(_) => failed += 1,
        }
    }
    let duration = start.elapsed();

    let final_available = resources
        .iter()
        .map(|r| {
            let available = engine.available_units(r).unwrap_or_default();
            (r.to_string(), available)
        })
        .collect();

    let total = config.clients;
    let ops_per_second = if duration.as_secs_f64() > 0.0 {
        total as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    StressTestResult {
        total_ops: total,
        successful_ops: successful,
        exhausted_ops: exhausted,
        timed_out_ops: timed_out,
        failed_ops: failed,
        max_concurrent_holders: probe.max_concurrent(),
        final_available,
        duration,
        ops_per_second,
    }
}

/// Builds a probed engine over a fresh store, seeds the configured
/// resources, and runs [`stress_concurrent_reserve`].
pub fn run_reservation_stress(
    config: &StressConfig,
    engine_config: reservo_core::Config,
) -> Result<StressTestResult, CoreError> {
    let db = reservo_executor::InMemoryEngine::new();
    crate::fixtures::install_layout(&db, &[])?;
    let probe = Arc::new(HolderProbe::new(config.hold));
    let engine = ReservationEngine::with_config(
        ProbedConnector::new(db, Arc::clone(&probe)),
        engine_config,
    );
    for resource in config.resource_ids() {
        engine.create_resource(&resource, config.units)?;
    }
    Ok(stress_concurrent_reserve(
        Arc::new(engine),
        &probe,
        config,
    ))
}
