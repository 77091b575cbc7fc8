//! Memory-aware backpressure for the gatherer pool
//!
//! Polling against an external, non-event-driven OS resource is the
//! simplest correct design here; the probe is injected so tests can mock
//! the pressure curve or disable the governor entirely. Sustained
//! below-floor memory stalls the calling worker indefinitely: the
//! reducers keep draining, which is what eventually frees headroom.

use std::sync::Mutex;
use std::time::Duration;

use sysinfo::System;

/// How often a stalled worker re-samples available memory.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Produces the current available-memory fraction, in percent.
type HeadroomProbe = Box<dyn Fn() -> f64 + Send + Sync>;

/// Blocks gatherer workers while system memory headroom is below a floor.
pub struct MemoryGovernor {
    floor_percent: f64,
    poll_interval: Duration,
    probe: HeadroomProbe,
}

impl MemoryGovernor {
    /// Governor backed by live system sampling.
    ///
    /// `floor_percent` is the minimum available-memory fraction (0..=100)
    /// a worker needs before it may materialize another table.
    #[must_use]
    pub fn sampled(floor_percent: f64) -> Self {
        let system = Mutex::new(System::new());
        Self {
            floor_percent,
            poll_interval: POLL_INTERVAL,
            probe: Box::new(move || {
                let mut system = match system.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                system.refresh_memory();
                let total = system.total_memory();
                if total == 0 {
                    return 100.0;
                }
                #[allow(clippy::cast_precision_loss)]
                let fraction = system.available_memory() as f64 / total as f64;
                fraction * 100.0
            }),
        }
    }

    /// Governor that never blocks (for tests and single-shot runs).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            floor_percent: 0.0,
            poll_interval: POLL_INTERVAL,
            probe: Box::new(|| 100.0),
        }
    }

    /// Governor with an injected probe and poll interval (for tests).
    #[must_use]
    pub fn with_probe(
        floor_percent: f64,
        poll_interval: Duration,
        probe: impl Fn() -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            floor_percent,
            poll_interval,
            probe: Box::new(probe),
        }
    }

    /// Block the calling worker until available memory is at or above the
    /// configured floor.
    pub fn await_headroom(&self) {
        loop {
            if (self.probe)() >= self.floor_percent {
                return;
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Configured floor, in percent of total memory.
    #[must_use]
    pub const fn floor_percent(&self) -> f64 {
        self.floor_percent
    }
}

impl std::fmt::Debug for MemoryGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGovernor")
            .field("floor_percent", &self.floor_percent)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
