//! Engine-internal counters and gauges.
//!
//! These are the engine's own accuracy and health instruments (pacing
//! accuracy, listener/exporter failures, adaptive phase activity), separate
//! from the per-execution metrics pipeline in [`crate::metrics`].

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge holding an `f64` that can move in both directions.
#[derive(Debug)]
pub struct Gauge {
    bits: AtomicU64,
}

impl Gauge {
    /// Creates a gauge at zero.
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Sets the gauge.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// All engine-level instruments in one place.
#[derive(Debug, Default)]
pub struct EngineGauges {
    /// Most recent target rate handed to the pacer.
    pub target_tps: Gauge,
    /// Achieved submission rate over the whole run so far.
    pub actual_tps: Gauge,
    /// Relative pacing error `|actual - target| / target`.
    pub tps_error: Gauge,
    /// Rate currently selected by an adaptive pattern, if one is attached.
    pub adaptive_tps: Gauge,
    /// Adaptive phase transitions observed.
    pub adaptive_phase_changes: Counter,
    /// Exporter invocations that returned an error.
    pub exporter_errors: Counter,
    /// Shutdown callbacks that failed or timed out.
    pub shutdown_callback_errors: Counter,
}

impl EngineGauges {
    /// Creates a zeroed instrument set.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increments() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_gauge_holds_floats() {
        let gauge = Gauge::new();
        assert_eq!(gauge.get(), 0.0);
        gauge.set(42.5);
        assert_eq!(gauge.get(), 42.5);
        gauge.set(-1.25);
        assert_eq!(gauge.get(), -1.25);
    }
}
