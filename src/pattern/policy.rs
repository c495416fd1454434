//! Ramp decision policy: the pure judgment at the heart of the closed loop.
//!
//! The controller separates *sensing* (the [`ControlSnapshot`] assembled
//! from providers each tick) from *judging* (this module) from *acting*
//! (the phase machine in [`super::adaptive`]). A policy is a pure function
//! of one snapshot, which keeps it trivially testable and swappable.

/// Per-tick view of the live signals, clamped into range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSnapshot {
    /// Lifetime failure fraction in [0, 1].
    pub failure_rate: f64,
    /// Failure fraction over the controller's recent window, in [0, 1].
    pub recent_failure_rate: f64,
    /// Downstream saturation in [0, 1].
    pub backpressure: f64,
    /// Total executions recorded so far.
    pub total_executions: u64,
}

impl ControlSnapshot {
    /// Builds a snapshot, clamping every rate into [0, 1].
    ///
    /// Providers occasionally return transient garbage (races during
    /// counter resets); the controller never sees values outside range.
    pub fn clamped(
        failure_rate: f64,
        recent_failure_rate: f64,
        backpressure: f64,
        total_executions: u64,
    ) -> Self {
        Self {
            failure_rate: clamp_rate(failure_rate),
            recent_failure_rate: clamp_rate(recent_failure_rate),
            backpressure: clamp_rate(backpressure),
            total_executions,
        }
    }

    /// The snapshot used before anything has executed: all signals zero.
    pub fn idle() -> Self {
        Self {
            failure_rate: 0.0,
            recent_failure_rate: 0.0,
            backpressure: 0.0,
            total_executions: 0,
        }
    }
}

fn clamp_rate(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Judgment over a [`ControlSnapshot`].
pub trait RampDecisionPolicy: Send + Sync {
    /// True when the system looks healthy enough to push harder.
    fn should_ramp_up(&self, metrics: &ControlSnapshot) -> bool;

    /// True when the system shows strain and the target should drop.
    fn should_ramp_down(&self, metrics: &ControlSnapshot) -> bool;

    /// True when a controller stuck at the minimum rate may try climbing
    /// again.
    fn can_recover_from_minimum(&self, metrics: &ControlSnapshot) -> bool;
}

/// Default error-threshold for the default policy.
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.01;
/// Backpressure ceiling below which the default policy keeps ramping up.
pub const DEFAULT_RAMP_UP_BACKPRESSURE: f64 = 0.3;
/// Backpressure floor at which the default policy demands a ramp-down.
pub const DEFAULT_RAMP_DOWN_BACKPRESSURE: f64 = 0.7;
/// Backpressure under which recovery from minimum is always allowed.
pub const DEFAULT_RECOVERY_LOW_BACKPRESSURE: f64 = 0.3;
/// Backpressure under which recovery is allowed when recent failures are low.
pub const DEFAULT_RECOVERY_MODERATE_BACKPRESSURE: f64 = 0.5;

/// Threshold-based policy.
///
/// Ramp up while both failure rate and backpressure are comfortably low;
/// ramp down as soon as either crosses its ceiling; allow recovery from
/// the minimum either under very low backpressure, or under moderate
/// backpressure once recent failures have subsided.
#[derive(Debug, Clone, Copy)]
pub struct DefaultRampPolicy {
    error_threshold: f64,
    ramp_up_backpressure: f64,
    ramp_down_backpressure: f64,
    recovery_low_backpressure: f64,
    recovery_moderate_backpressure: f64,
}

impl DefaultRampPolicy {
    /// Creates a policy with custom thresholds.
    pub fn new(
        error_threshold: f64,
        ramp_up_backpressure: f64,
        ramp_down_backpressure: f64,
        recovery_low_backpressure: f64,
        recovery_moderate_backpressure: f64,
    ) -> Self {
        Self {
            error_threshold,
            ramp_up_backpressure,
            ramp_down_backpressure,
            recovery_low_backpressure,
            recovery_moderate_backpressure,
        }
    }

    /// The configured error threshold.
    pub fn error_threshold(&self) -> f64 {
        self.error_threshold
    }
}

impl Default for DefaultRampPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_ERROR_THRESHOLD,
            DEFAULT_RAMP_UP_BACKPRESSURE,
            DEFAULT_RAMP_DOWN_BACKPRESSURE,
            DEFAULT_RECOVERY_LOW_BACKPRESSURE,
            DEFAULT_RECOVERY_MODERATE_BACKPRESSURE,
        )
    }
}

impl RampDecisionPolicy for DefaultRampPolicy {
    fn should_ramp_up(&self, metrics: &ControlSnapshot) -> bool {
        metrics.failure_rate < self.error_threshold
            && metrics.backpressure < self.ramp_up_backpressure
    }

    fn should_ramp_down(&self, metrics: &ControlSnapshot) -> bool {
        metrics.failure_rate >= self.error_threshold
            || metrics.backpressure >= self.ramp_down_backpressure
    }

    fn can_recover_from_minimum(&self, metrics: &ControlSnapshot) -> bool {
        metrics.backpressure < self.recovery_low_backpressure
            || (metrics.recent_failure_rate < self.error_threshold
                && metrics.backpressure < self.recovery_moderate_backpressure)
    }
}
