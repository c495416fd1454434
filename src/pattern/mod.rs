//! Load patterns: the throughput schedule the engine follows.
//!
//! A [`LoadPattern`] answers one question per tick — "what TPS should the
//! engine target right now?" — plus a few capability probes the engine uses
//! instead of case-analyzing pattern types:
//!
//! - [`LoadPattern::supports_warmup_cooldown`] /
//!   [`LoadPattern::should_record_metrics`] let a pattern run tasks whose
//!   results are discarded (warmup/cooldown windows)
//! - [`LoadPattern::adaptive_events`] exposes the closed-loop controller's
//!   phase/TPS event stream when the pattern has one
//!
//! Returning `0.0` from [`LoadPattern::target_tps`] is the terminal signal:
//! the engine exits its submission loop within one pacing wakeup.
//!
//! Open-loop patterns live in [`simple`]; the closed-loop
//! [`AdaptiveLoadPattern`] and its decision policy live in [`adaptive`] and
//! [`policy`].

mod adaptive;
mod policy;
mod simple;

use std::time::Duration;

pub use adaptive::{
    AdaptiveConfig, AdaptiveConfigBuilder, AdaptiveEventSource, AdaptiveLoadPattern,
    AdaptivePhase, AdaptiveState, PhaseListener,
};
pub use policy::{
    ControlSnapshot, DefaultRampPolicy, RampDecisionPolicy, DEFAULT_ERROR_THRESHOLD,
    DEFAULT_RAMP_DOWN_BACKPRESSURE, DEFAULT_RAMP_UP_BACKPRESSURE,
    DEFAULT_RECOVERY_LOW_BACKPRESSURE, DEFAULT_RECOVERY_MODERATE_BACKPRESSURE,
};
pub use simple::{RampUpLoad, RampUpSustainLoad, StaticLoad, WarmupCooldownLoad};

/// A time-varying target throughput schedule.
///
/// Implementations must be cheap to query: the engine calls
/// [`target_tps`](Self::target_tps) once per submission.
pub trait LoadPattern: Send + Sync {
    /// Target transactions per second at `elapsed` since run start.
    ///
    /// A value `<= 0.0` is terminal: the engine stops submitting.
    fn target_tps(&self, elapsed: Duration) -> f64;

    /// Total scheduled duration, or `None` for open-ended patterns that
    /// terminate by returning zero from [`target_tps`](Self::target_tps).
    fn total_duration(&self) -> Option<Duration>;

    /// Whether this pattern has warmup/cooldown windows during which tasks
    /// run but results are not recorded.
    fn supports_warmup_cooldown(&self) -> bool {
        false
    }

    /// Whether results at `elapsed` should be recorded into metrics.
    fn should_record_metrics(&self, _elapsed: Duration) -> bool {
        true
    }

    /// Closed-loop phase/TPS event capability, when the pattern has one.
    ///
    /// The engine probes this once at registration; open-loop patterns
    /// return `None`.
    fn adaptive_events(&self) -> Option<&dyn AdaptiveEventSource> {
        None
    }
}
