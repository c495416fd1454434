//! Closed-loop adaptive load pattern.
//!
//! [`AdaptiveLoadPattern`] selects a target TPS by reading live failure-rate
//! and backpressure signals, converging on the highest throughput the system
//! sustains without elevated failures. It cycles through four phases:
//!
//! - **RampUp** — climb by `ramp_increment` every `ramp_interval` while the
//!   policy approves
//! - **RampDown** — back off by `ramp_decrement` per interval after strain;
//!   remember the last known good rate
//! - **Sustain** — hold the recovered rate for `sustain_duration`
//! - **Complete** — terminal; `target_tps` returns 0 and the engine exits
//!
//! State lives in a single [`ArcSwap`] cell replaced by compare-and-swap, so
//! `target_tps` can race with listeners and observers without a lock on the
//! hot path. Adjustments are gated by `ramp_interval`, which is the
//! hysteresis that keeps the controller from thrashing.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metrics::{BackpressureProvider, MetricsProvider, DEFAULT_RECENT_WINDOW};

use super::policy::{ControlSnapshot, DefaultRampPolicy, RampDecisionPolicy};
use super::LoadPattern;

// ============================================================================
// Phase & State
// ============================================================================

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdaptivePhase {
    /// Climbing toward the maximum rate.
    RampUp,
    /// Backing off after strain.
    RampDown,
    /// Holding a known-good rate.
    Sustain,
    /// Terminal; the run is over.
    Complete,
}

impl std::fmt::Display for AdaptivePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RampUp => write!(f, "ramp-up"),
            Self::RampDown => write!(f, "ramp-down"),
            Self::Sustain => write!(f, "sustain"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Immutable controller state, replaced wholesale on each decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveState {
    /// Rate currently in effect. Zero only in [`AdaptivePhase::Complete`].
    pub current_tps: f64,
    /// Current phase.
    pub phase: AdaptivePhase,
    /// Elapsed-millis timestamp of the last evaluated adjustment tick.
    pub last_adjustment_millis: u64,
    /// Consecutive strain-free intervals observed in RampDown.
    pub stable_count: u32,
    /// The rate in effect just before the most recent ramp-down.
    pub last_known_good_tps: f64,
    /// Elapsed-millis timestamp at which the current phase was entered.
    pub phase_entry_millis: u64,
}

// ============================================================================
// Configuration
// ============================================================================

/// Immutable adaptive controller configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveConfig {
    /// Rate at which the controller starts.
    pub initial_tps: f64,
    /// Floor the controller never goes below.
    pub min_tps: f64,
    /// Ceiling the controller never exceeds.
    pub max_tps: f64,
    /// TPS added per approved ramp-up interval.
    pub ramp_increment: f64,
    /// TPS removed per strained interval.
    pub ramp_decrement: f64,
    /// Minimum wall time between two decisions.
    pub ramp_interval: Duration,
    /// How long to hold a recovered rate before completing.
    pub sustain_duration: Duration,
    /// Strain-free intervals required to exit RampDown.
    pub stable_intervals_required: u32,
}

impl AdaptiveConfig {
    /// Starts building a configuration.
    pub fn builder() -> AdaptiveConfigBuilder {
        AdaptiveConfigBuilder::default()
    }
}

/// Builder for [`AdaptiveConfig`]; contracts are checked at [`build`].
///
/// [`build`]: AdaptiveConfigBuilder::build
#[derive(Debug, Clone)]
pub struct AdaptiveConfigBuilder {
    initial_tps: f64,
    min_tps: f64,
    max_tps: f64,
    ramp_increment: f64,
    ramp_decrement: f64,
    ramp_interval: Duration,
    sustain_duration: Duration,
    stable_intervals_required: u32,
}

impl Default for AdaptiveConfigBuilder {
    fn default() -> Self {
        Self {
            initial_tps: 10.0,
            min_tps: 1.0,
            max_tps: 100.0,
            ramp_increment: 10.0,
            ramp_decrement: 20.0,
            ramp_interval: Duration::from_secs(10),
            sustain_duration: Duration::from_secs(300),
            stable_intervals_required: 3,
        }
    }
}

impl AdaptiveConfigBuilder {
    /// Sets the starting rate.
    pub fn initial_tps(mut self, tps: f64) -> Self {
        self.initial_tps = tps;
        self
    }

    /// Sets the floor rate.
    pub fn min_tps(mut self, tps: f64) -> Self {
        self.min_tps = tps;
        self
    }

    /// Sets the ceiling rate.
    pub fn max_tps(mut self, tps: f64) -> Self {
        self.max_tps = tps;
        self
    }

    /// Sets the per-interval ramp-up step.
    pub fn ramp_increment(mut self, tps: f64) -> Self {
        self.ramp_increment = tps;
        self
    }

    /// Sets the per-interval ramp-down step.
    pub fn ramp_decrement(mut self, tps: f64) -> Self {
        self.ramp_decrement = tps;
        self
    }

    /// Sets the minimum wall time between decisions.
    pub fn ramp_interval(mut self, interval: Duration) -> Self {
        self.ramp_interval = interval;
        self
    }

    /// Sets how long a recovered rate is held before completing.
    pub fn sustain_duration(mut self, duration: Duration) -> Self {
        self.sustain_duration = duration;
        self
    }

    /// Sets the strain-free interval count required to exit RampDown.
    pub fn stable_intervals_required(mut self, count: u32) -> Self {
        self.stable_intervals_required = count;
        self
    }

    /// Validates the contracts and produces the immutable config.
    pub fn build(self) -> Result<AdaptiveConfig> {
        if self.min_tps <= 0.0 {
            return Err(Error::validation("min_tps", "must be positive"));
        }
        if self.initial_tps < self.min_tps {
            return Err(Error::validation(
                "initial_tps",
                format!("must be >= min_tps ({})", self.min_tps),
            ));
        }
        if self.max_tps < self.initial_tps {
            return Err(Error::validation(
                "max_tps",
                format!("must be >= initial_tps ({})", self.initial_tps),
            ));
        }
        if self.ramp_increment <= 0.0 {
            return Err(Error::validation("ramp_increment", "must be positive"));
        }
        if self.ramp_decrement <= 0.0 {
            return Err(Error::validation("ramp_decrement", "must be positive"));
        }
        if self.ramp_interval.is_zero() {
            return Err(Error::validation("ramp_interval", "must be positive"));
        }
        if self.stable_intervals_required == 0 {
            return Err(Error::validation(
                "stable_intervals_required",
                "must be at least 1",
            ));
        }
        Ok(AdaptiveConfig {
            initial_tps: self.initial_tps,
            min_tps: self.min_tps,
            max_tps: self.max_tps,
            ramp_increment: self.ramp_increment,
            ramp_decrement: self.ramp_decrement,
            ramp_interval: self.ramp_interval,
            sustain_duration: self.sustain_duration,
            stable_intervals_required: self.stable_intervals_required,
        })
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Observer of controller events.
///
/// Callbacks run on the caller's context immediately after the state
/// replacement that committed the change. Panics are caught, logged, and
/// counted; they never reach the engine loop.
pub trait PhaseListener: Send + Sync {
    /// Called when the controller changes phase.
    fn on_phase_change(&self, _from: AdaptivePhase, _to: AdaptivePhase, _tps: f64) {}

    /// Called when the target TPS changes.
    fn on_tps_adjustment(&self, _old_tps: f64, _new_tps: f64, _phase: AdaptivePhase) {}
}

/// Capability the engine probes to observe controller events without
/// knowing the concrete pattern type.
pub trait AdaptiveEventSource: Send + Sync {
    /// Registers a listener for phase and TPS events.
    fn register_listener(&self, listener: Arc<dyn PhaseListener>);

    /// Current controller phase.
    fn current_phase(&self) -> AdaptivePhase;

    /// Rate currently in effect.
    fn current_tps(&self) -> f64;

    /// Number of listener callbacks that panicked.
    fn listener_error_count(&self) -> u64;
}

// ============================================================================
// Adaptive Load Pattern
// ============================================================================

/// The closed-loop controller. See the module docs for the phase machine.
pub struct AdaptiveLoadPattern {
    config: AdaptiveConfig,
    metrics: Arc<dyn MetricsProvider>,
    backpressure: Option<Arc<dyn BackpressureProvider>>,
    policy: Arc<dyn RampDecisionPolicy>,
    state: ArcSwap<AdaptiveState>,
    listeners: RwLock<Vec<Arc<dyn PhaseListener>>>,
    listener_errors: AtomicU64,
}

impl AdaptiveLoadPattern {
    /// Creates a controller reading from `metrics`, with no backpressure
    /// provider and the default decision policy.
    pub fn new(config: AdaptiveConfig, metrics: Arc<dyn MetricsProvider>) -> Self {
        let initial = AdaptiveState {
            current_tps: config.initial_tps,
            phase: AdaptivePhase::RampUp,
            last_adjustment_millis: 0,
            stable_count: 0,
            last_known_good_tps: config.initial_tps,
            phase_entry_millis: 0,
        };
        Self {
            config,
            metrics,
            backpressure: None,
            policy: Arc::new(DefaultRampPolicy::default()),
            state: ArcSwap::from_pointee(initial),
            listeners: RwLock::new(Vec::new()),
            listener_errors: AtomicU64::new(0),
        }
    }

    /// Attaches a backpressure provider.
    pub fn with_backpressure(mut self, provider: Arc<dyn BackpressureProvider>) -> Self {
        self.backpressure = Some(provider);
        self
    }

    /// Replaces the decision policy.
    pub fn with_policy(mut self, policy: Arc<dyn RampDecisionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// The immutable configuration this controller runs with.
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// A copy of the current state.
    pub fn state(&self) -> AdaptiveState {
        **self.state.load()
    }

    fn control_snapshot(&self) -> ControlSnapshot {
        let total = self.metrics.total_executions();
        if total == 0 {
            return ControlSnapshot::idle();
        }
        let backpressure = self
            .backpressure
            .as_ref()
            .map(|provider| provider.backpressure())
            .unwrap_or(0.0);
        ControlSnapshot::clamped(
            self.metrics.failure_rate(),
            self.metrics.recent_failure_rate(DEFAULT_RECENT_WINDOW),
            backpressure,
            total,
        )
    }

    fn enter_ramp_down(&self, cur: &AdaptiveState, next: &mut AdaptiveState, now_millis: u64) {
        let cfg = &self.config;
        next.last_known_good_tps = (cur.current_tps - cfg.ramp_increment).max(cfg.min_tps);
        next.current_tps = (cur.current_tps - cfg.ramp_decrement).max(cfg.min_tps);
        next.phase = AdaptivePhase::RampDown;
        next.stable_count = 0;
        next.phase_entry_millis = now_millis;
    }

    fn complete(next: &mut AdaptiveState, now_millis: u64) {
        next.phase = AdaptivePhase::Complete;
        next.current_tps = 0.0;
        next.phase_entry_millis = now_millis;
    }

    /// Computes the successor state for one adjustment tick.
    fn decide(
        &self,
        cur: &AdaptiveState,
        metrics: &ControlSnapshot,
        now_millis: u64,
    ) -> AdaptiveState {
        let cfg = &self.config;
        let sustain_millis = cfg.sustain_duration.as_millis() as u64;
        let mut next = *cur;
        next.last_adjustment_millis = now_millis;

        match cur.phase {
            AdaptivePhase::RampUp => {
                if self.policy.should_ramp_down(metrics) {
                    self.enter_ramp_down(cur, &mut next, now_millis);
                } else if cur.current_tps >= cfg.max_tps {
                    next.phase = AdaptivePhase::Sustain;
                    next.phase_entry_millis = now_millis;
                } else if self.policy.should_ramp_up(metrics) {
                    next.current_tps = (cur.current_tps + cfg.ramp_increment).min(cfg.max_tps);
                    next.stable_count = 0;
                }
            }
            AdaptivePhase::RampDown => {
                let at_minimum = cur.current_tps <= cfg.min_tps;
                let in_phase = now_millis.saturating_sub(cur.phase_entry_millis);
                if self.policy.should_ramp_down(metrics) {
                    next.stable_count = 0;
                    if at_minimum {
                        // Pinned at the floor with no relief: finish once the
                        // sustain budget is spent.
                        if in_phase >= sustain_millis {
                            Self::complete(&mut next, now_millis);
                        }
                    } else {
                        next.current_tps =
                            (cur.current_tps - cfg.ramp_decrement).max(cfg.min_tps);
                    }
                } else if at_minimum {
                    if self.policy.can_recover_from_minimum(metrics) {
                        next.phase = AdaptivePhase::RampUp;
                        next.current_tps = (cfg.min_tps + cfg.ramp_increment).min(cfg.max_tps);
                        next.stable_count = 0;
                        next.phase_entry_millis = now_millis;
                    } else if in_phase >= sustain_millis {
                        Self::complete(&mut next, now_millis);
                    } else {
                        next.stable_count = cur.stable_count + 1;
                    }
                } else {
                    next.stable_count = cur.stable_count + 1;
                    if next.stable_count >= cfg.stable_intervals_required {
                        next.phase = AdaptivePhase::Sustain;
                        next.current_tps = cur.last_known_good_tps;
                        next.stable_count = 0;
                        next.phase_entry_millis = now_millis;
                    }
                }
            }
            AdaptivePhase::Sustain => {
                if self.policy.should_ramp_down(metrics) {
                    self.enter_ramp_down(cur, &mut next, now_millis);
                } else if now_millis.saturating_sub(cur.phase_entry_millis) >= sustain_millis {
                    Self::complete(&mut next, now_millis);
                }
            }
            AdaptivePhase::Complete => {}
        }
        next
    }

    fn notify(&self, old: &AdaptiveState, new: &AdaptiveState) {
        let phase_changed = old.phase != new.phase;
        let tps_changed = (old.current_tps - new.current_tps).abs() > f64::EPSILON;
        if !phase_changed && !tps_changed {
            return;
        }

        if phase_changed {
            debug!(
                from = %old.phase,
                to = %new.phase,
                tps = new.current_tps,
                "adaptive phase change"
            );
        }

        let listeners = self.listeners.read().clone();
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                if phase_changed {
                    listener.on_phase_change(old.phase, new.phase, new.current_tps);
                }
                if tps_changed {
                    listener.on_tps_adjustment(old.current_tps, new.current_tps, new.phase);
                }
            }));
            if outcome.is_err() {
                self.listener_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    from = %old.phase,
                    to = %new.phase,
                    "adaptive listener panicked; continuing"
                );
            }
        }
    }
}

impl AdaptiveEventSource for AdaptiveLoadPattern {
    fn register_listener(&self, listener: Arc<dyn PhaseListener>) {
        self.listeners.write().push(listener);
    }

    fn current_phase(&self) -> AdaptivePhase {
        self.state.load().phase
    }

    fn current_tps(&self) -> f64 {
        self.state.load().current_tps
    }

    fn listener_error_count(&self) -> u64 {
        self.listener_errors.load(Ordering::Relaxed)
    }
}

impl LoadPattern for AdaptiveLoadPattern {
    fn target_tps(&self, elapsed: Duration) -> f64 {
        let now_millis = elapsed.as_millis() as u64;
        let interval_millis = self.config.ramp_interval.as_millis() as u64;

        loop {
            let cur = self.state.load_full();
            if cur.phase == AdaptivePhase::Complete {
                return 0.0;
            }
            if now_millis.saturating_sub(cur.last_adjustment_millis) < interval_millis {
                return cur.current_tps;
            }

            let snapshot = self.control_snapshot();
            let next = self.decide(&cur, &snapshot, now_millis);
            let next_arc = Arc::new(next);
            let prev = self.state.compare_and_swap(&cur, next_arc);
            if Arc::ptr_eq(&*prev, &cur) {
                self.notify(&cur, &next);
                return next.current_tps;
            }
            // Lost the race; re-read and retry.
        }
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }

    fn adaptive_events(&self) -> Option<&dyn AdaptiveEventSource> {
        Some(self)
    }
}

impl std::fmt::Debug for AdaptiveLoadPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveLoadPattern")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;

    /// Provider whose signals the tests steer directly.
    #[derive(Default)]
    struct ScriptedProvider {
        failure_rate_bits: StdAtomicU64,
        recent_bits: StdAtomicU64,
        total: StdAtomicU64,
    }

    impl ScriptedProvider {
        fn set(&self, failure_rate: f64, recent: f64, total: u64) {
            self.failure_rate_bits
                .store(failure_rate.to_bits(), Ordering::Release);
            self.recent_bits.store(recent.to_bits(), Ordering::Release);
            self.total.store(total, Ordering::Release);
        }
    }

    impl MetricsProvider for ScriptedProvider {
        fn failure_rate(&self) -> f64 {
            f64::from_bits(self.failure_rate_bits.load(Ordering::Acquire))
        }

        fn recent_failure_rate(&self, _window: Duration) -> f64 {
            f64::from_bits(self.recent_bits.load(Ordering::Acquire))
        }

        fn total_executions(&self) -> u64 {
            self.total.load(Ordering::Acquire)
        }
    }

    fn config() -> AdaptiveConfig {
        AdaptiveConfig::builder()
            .initial_tps(10.0)
            .min_tps(1.0)
            .max_tps(50.0)
            .ramp_increment(10.0)
            .ramp_decrement(20.0)
            .ramp_interval(Duration::from_millis(100))
            .sustain_duration(Duration::from_secs(1))
            .stable_intervals_required(2)
            .build()
            .unwrap()
    }

    fn millis(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_builder_validates_bounds() {
        assert!(AdaptiveConfig::builder().min_tps(0.0).build().is_err());
        assert!(AdaptiveConfig::builder()
            .min_tps(10.0)
            .initial_tps(5.0)
            .build()
            .is_err());
        assert!(AdaptiveConfig::builder()
            .initial_tps(10.0)
            .max_tps(5.0)
            .build()
            .is_err());
        assert!(AdaptiveConfig::builder().ramp_increment(0.0).build().is_err());
        assert!(AdaptiveConfig::builder()
            .stable_intervals_required(0)
            .build()
            .is_err());
        assert!(AdaptiveConfig::builder()
            .ramp_interval(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_holds_between_intervals() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set(0.0, 0.0, 100);
        let pattern = AdaptiveLoadPattern::new(config(), provider);
        assert_eq!(pattern.target_tps(millis(0)), 10.0);
        assert_eq!(pattern.target_tps(millis(50)), 10.0);
        // Interval elapsed: one increment.
        assert_eq!(pattern.target_tps(millis(100)), 20.0);
        // Held again until the next interval.
        assert_eq!(pattern.target_tps(millis(150)), 20.0);
    }

    #[test]
    fn test_healthy_system_ramps_to_max_then_sustains() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set(0.0, 0.0, 100);
        let pattern = AdaptiveLoadPattern::new(config(), provider);

        let mut now = 0;
        let mut seen_max = false;
        for _ in 0..10 {
            now += 100;
            let tps = pattern.target_tps(millis(now));
            assert!(tps <= 50.0);
            if (tps - 50.0).abs() < f64::EPSILON {
                seen_max = true;
            }
        }
        assert!(seen_max, "should have reached max_tps");
        assert_eq!(pattern.current_phase(), AdaptivePhase::Sustain);

        // Sustain expires after sustain_duration, then terminal zero.
        now += 1000;
        assert_eq!(pattern.target_tps(millis(now)), 0.0);
        assert_eq!(pattern.current_phase(), AdaptivePhase::Complete);
        assert_eq!(pattern.target_tps(millis(now + 100)), 0.0);
    }

    #[test]
    fn test_failures_drive_to_minimum_and_hold() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set(0.5, 0.5, 100);
        let pattern = AdaptiveLoadPattern::new(config(), provider);

        let mut now = 0;
        for _ in 0..5 {
            now += 100;
            pattern.target_tps(millis(now));
        }
        let state = pattern.state();
        assert_eq!(state.phase, AdaptivePhase::RampDown);
        assert_eq!(state.current_tps, 1.0);

        // Still failing: pinned at the floor.
        now += 100;
        assert_eq!(pattern.target_tps(millis(now)), 1.0);
    }

    #[test]
    fn test_ramp_down_records_last_known_good() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set(0.0, 0.0, 100);
        let pattern = AdaptiveLoadPattern::new(config(), provider.clone());

        // Climb to 30.
        pattern.target_tps(millis(100));
        pattern.target_tps(millis(200));
        assert_eq!(pattern.current_tps(), 30.0);

        // Strain: back off, remembering 30 - increment = 20.
        provider.set(0.9, 0.9, 200);
        pattern.target_tps(millis(300));
        let state = pattern.state();
        assert_eq!(state.phase, AdaptivePhase::RampDown);
        assert_eq!(state.last_known_good_tps, 20.0);
        assert_eq!(state.current_tps, 10.0);

        // Recovery for stable_intervals_required ticks restores the
        // last known good rate in Sustain.
        provider.set(0.0, 0.0, 300);
        pattern.target_tps(millis(400));
        pattern.target_tps(millis(500));
        let state = pattern.state();
        assert_eq!(state.phase, AdaptivePhase::Sustain);
        assert_eq!(state.current_tps, 20.0);
    }

    #[test]
    fn test_recovery_from_minimum_reenters_ramp_up() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set(0.5, 0.5, 100);
        let pattern = AdaptiveLoadPattern::new(config(), provider.clone());

        let mut now = 0;
        for _ in 0..3 {
            now += 100;
            pattern.target_tps(millis(now));
        }
        assert_eq!(pattern.state().current_tps, 1.0);

        // Failures clear with no backpressure: climb out of the floor.
        provider.set(0.0, 0.0, 200);
        now += 100;
        let tps = pattern.target_tps(millis(now));
        assert_eq!(tps, 11.0);
        assert_eq!(pattern.current_phase(), AdaptivePhase::RampUp);
    }

    #[test]
    fn test_pinned_at_minimum_completes_after_sustain_budget() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set(1.0, 1.0, 100);
        let pattern = AdaptiveLoadPattern::new(config(), provider);

        let mut now = 0;
        // Reach the floor.
        for _ in 0..3 {
            now += 100;
            pattern.target_tps(millis(now));
        }
        assert_eq!(pattern.state().current_tps, 1.0);

        // Keep failing past the sustain budget measured from RampDown entry.
        now += 1100;
        assert_eq!(pattern.target_tps(millis(now)), 0.0);
        assert_eq!(pattern.current_phase(), AdaptivePhase::Complete);
    }

    #[test]
    fn test_backpressure_alone_forces_ramp_down() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set(0.0, 0.0, 100);
        let pattern = AdaptiveLoadPattern::new(config(), provider)
            .with_backpressure(Arc::new(crate::metrics::FixedBackpressure::new(0.9)));

        pattern.target_tps(millis(100));
        assert_eq!(pattern.current_phase(), AdaptivePhase::RampDown);
        // Never exceeded initial + one increment.
        assert!(pattern.current_tps() <= 20.0);
    }

    #[test]
    fn test_zero_executions_counts_as_healthy() {
        let provider = Arc::new(ScriptedProvider::default());
        // total = 0: rates are treated as zero even though the provider
        // would report garbage.
        provider.set(1.0, 1.0, 0);
        let pattern = AdaptiveLoadPattern::new(config(), provider);
        let tps = pattern.target_tps(millis(100));
        assert_eq!(tps, 20.0, "idle system should ramp up");
    }

    #[test]
    fn test_tps_stays_within_bounds() {
        let provider = Arc::new(ScriptedProvider::default());
        let pattern = AdaptiveLoadPattern::new(config(), provider.clone());
        let mut now = 0;
        for round in 0..40 {
            // Alternate strain and health to push both bounds.
            let failing = (round / 4) % 2 == 0;
            provider.set(if failing { 0.8 } else { 0.0 }, 0.0, 100 + round);
            now += 100;
            pattern.target_tps(millis(now));
            let state = pattern.state();
            if state.phase != AdaptivePhase::Complete {
                assert!(
                    state.current_tps >= 1.0 && state.current_tps <= 50.0,
                    "tps {} out of bounds in {:?}",
                    state.current_tps,
                    state.phase
                );
            }
        }
    }

    #[test]
    fn test_listeners_observe_phase_changes_and_survive_panics() {
        struct Recorder {
            changes: parking_lot::Mutex<Vec<(AdaptivePhase, AdaptivePhase)>>,
        }
        impl PhaseListener for Recorder {
            fn on_phase_change(&self, from: AdaptivePhase, to: AdaptivePhase, _tps: f64) {
                self.changes.lock().push((from, to));
            }
        }
        struct Panicker;
        impl PhaseListener for Panicker {
            fn on_phase_change(&self, _: AdaptivePhase, _: AdaptivePhase, _: f64) {
                panic!("listener bug");
            }
        }

        let provider = Arc::new(ScriptedProvider::default());
        provider.set(0.5, 0.5, 100);
        let pattern = AdaptiveLoadPattern::new(config(), provider);
        let recorder = Arc::new(Recorder {
            changes: parking_lot::Mutex::new(Vec::new()),
        });
        pattern.register_listener(Arc::new(Panicker));
        pattern.register_listener(recorder.clone());

        pattern.target_tps(millis(100));
        assert_eq!(
            recorder.changes.lock().as_slice(),
            &[(AdaptivePhase::RampUp, AdaptivePhase::RampDown)]
        );
        assert_eq!(pattern.listener_error_count(), 1);
    }

    #[test]
    fn test_total_duration_is_open_ended() {
        let provider = Arc::new(ScriptedProvider::default());
        let pattern = AdaptiveLoadPattern::new(config(), provider);
        assert_eq!(pattern.total_duration(), None);
        assert!(pattern.adaptive_events().is_some());
    }
}
