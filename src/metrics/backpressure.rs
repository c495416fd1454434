//! Backpressure capability for the adaptive controller.
//!
//! A backpressure provider reports downstream saturation as a scalar in
//! [0, 1] — connection-pool utilization, queue depth against capacity, or
//! whatever signal the integration has. The controller treats higher values
//! as pressure to back off.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Scalar saturation signal in [0, 1].
pub trait BackpressureProvider: Send + Sync {
    /// Current downstream saturation; implementations should clamp to [0, 1].
    fn backpressure(&self) -> f64;
}

/// A constant backpressure value, mainly for tests and calibration runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackpressure(f64);

impl FixedBackpressure {
    /// Creates a provider that always reports `value`, clamped to [0, 1].
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

impl BackpressureProvider for FixedBackpressure {
    fn backpressure(&self) -> f64 {
        self.0
    }
}

/// A backpressure cell that integrations update from their own feedback
/// loops (pool monitors, queue gauges).
#[derive(Debug, Clone, Default)]
pub struct SharedBackpressure {
    bits: Arc<AtomicU64>,
}

impl SharedBackpressure {
    /// Creates a cell reporting 0.0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the reported value, clamped to [0, 1].
    pub fn set(&self, value: f64) {
        self.bits
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }
}

impl BackpressureProvider for SharedBackpressure {
    fn backpressure(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
