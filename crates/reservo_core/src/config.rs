//! Engine configuration.

use std::time::Duration;

/// Configuration for a [`crate::ReservationEngine`].
#[derive(Debug, Clone)]
pub struct Config {
    /// How long `reserve`/`release` wait for a resource lock when the caller
    /// gives no timeout. `None` waits forever.
    pub lock_timeout: Option<Duration>,

    /// Upper bound on `total_units` accepted by `create_resource`.
    pub max_units_per_resource: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout: Some(Duration::from_secs(5)),
            max_units_per_resource: 10_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default lock wait.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the maximum pool size.
    #[must_use]
    pub const fn max_units_per_resource(mut self, max: u32) -> Self {
        self.max_units_per_resource = max;
        self
    }
}
