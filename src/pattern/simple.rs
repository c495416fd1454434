//! Open-loop load patterns.
//!
//! These patterns compute a target TPS purely from elapsed time. They are
//! the workhorses for calibration runs and regression baselines; the
//! closed-loop pattern lives in [`super::adaptive`].

use std::time::Duration;

use super::LoadPattern;

/// Fraction of the peak rate used as the floor while ramping.
///
/// Zero is reserved for the terminal signal, and a near-zero target would
/// stall the pacer with a near-infinite first interval, so ramps clamp
/// their low end to this fraction of the peak.
const RAMP_FLOOR_FRACTION: f64 = 0.1;

fn ramp_floor(raw: f64, peak: f64) -> f64 {
    if peak <= 0.0 {
        0.0
    } else {
        raw.max(peak * RAMP_FLOOR_FRACTION)
    }
}

/// Constant TPS for a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct StaticLoad {
    tps: f64,
    duration: Duration,
}

impl StaticLoad {
    /// Creates a constant-rate pattern.
    pub fn new(tps: f64, duration: Duration) -> Self {
        Self { tps, duration }
    }

    /// The configured rate.
    pub fn tps(&self) -> f64 {
        self.tps
    }
}

impl LoadPattern for StaticLoad {
    fn target_tps(&self, elapsed: Duration) -> f64 {
        if elapsed >= self.duration {
            0.0
        } else {
            self.tps
        }
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.duration)
    }
}

/// Linear ramp from a starting TPS to an end TPS, then a hold window at
/// the end rate.
///
/// A zero `hold` gives plain ramp-then-terminate.
#[derive(Debug, Clone, Copy)]
pub struct RampUpLoad {
    start_tps: f64,
    end_tps: f64,
    ramp: Duration,
    hold: Duration,
}

impl RampUpLoad {
    /// Creates a linear ramp from `start_tps` to `end_tps` over `ramp`,
    /// holding at `end_tps` for `hold` afterwards.
    pub fn new(start_tps: f64, end_tps: f64, ramp: Duration, hold: Duration) -> Self {
        Self {
            start_tps,
            end_tps,
            ramp,
            hold,
        }
    }
}

impl LoadPattern for RampUpLoad {
    fn target_tps(&self, elapsed: Duration) -> f64 {
        if elapsed < self.ramp {
            let fraction = elapsed.as_secs_f64() / self.ramp.as_secs_f64();
            let raw = self.start_tps + (self.end_tps - self.start_tps) * fraction;
            if self.start_tps > 0.0 {
                raw
            } else {
                ramp_floor(raw, self.end_tps)
            }
        } else if elapsed < self.ramp + self.hold {
            self.end_tps
        } else {
            0.0
        }
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.ramp + self.hold)
    }
}

/// Ramp from zero to a peak, then hold the peak.
///
/// The classic trapezoid profile: over `ramp` the target climbs linearly
/// from 0 to `peak_tps`, then holds there for `sustain`.
#[derive(Debug, Clone, Copy)]
pub struct RampUpSustainLoad {
    peak_tps: f64,
    ramp: Duration,
    sustain: Duration,
}

impl RampUpSustainLoad {
    /// Creates a ramp-then-sustain pattern.
    pub fn new(peak_tps: f64, ramp: Duration, sustain: Duration) -> Self {
        Self {
            peak_tps,
            ramp,
            sustain,
        }
    }
}

impl LoadPattern for RampUpSustainLoad {
    fn target_tps(&self, elapsed: Duration) -> f64 {
        if elapsed < self.ramp {
            ramp_floor(
                self.peak_tps * elapsed.as_secs_f64() / self.ramp.as_secs_f64(),
                self.peak_tps,
            )
        } else if elapsed < self.ramp + self.sustain {
            self.peak_tps
        } else {
            0.0
        }
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.ramp + self.sustain)
    }
}

/// Steady load bracketed by warmup and cooldown windows whose results are
/// executed but not recorded.
///
/// The target ramps from 0 to `tps` across the warmup, holds during the
/// steady window, and ramps back down across the cooldown. Only the steady
/// window records metrics.
#[derive(Debug, Clone, Copy)]
pub struct WarmupCooldownLoad {
    tps: f64,
    warmup: Duration,
    steady: Duration,
    cooldown: Duration,
}

impl WarmupCooldownLoad {
    /// Creates a warmup/steady/cooldown pattern.
    pub fn new(tps: f64, warmup: Duration, steady: Duration, cooldown: Duration) -> Self {
        Self {
            tps,
            warmup,
            steady,
            cooldown,
        }
    }
}

impl LoadPattern for WarmupCooldownLoad {
    fn target_tps(&self, elapsed: Duration) -> f64 {
        let steady_end = self.warmup + self.steady;
        let total = steady_end + self.cooldown;
        if elapsed < self.warmup {
            if self.warmup.is_zero() {
                self.tps
            } else {
                ramp_floor(
                    self.tps * elapsed.as_secs_f64() / self.warmup.as_secs_f64(),
                    self.tps,
                )
            }
        } else if elapsed < steady_end {
            self.tps
        } else if elapsed < total {
            let into_cooldown = (elapsed - steady_end).as_secs_f64();
            ramp_floor(
                self.tps * (1.0 - into_cooldown / self.cooldown.as_secs_f64()),
                self.tps,
            )
        } else {
            0.0
        }
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.warmup + self.steady + self.cooldown)
    }

    fn supports_warmup_cooldown(&self) -> bool {
        true
    }

    fn should_record_metrics(&self, elapsed: Duration) -> bool {
        elapsed >= self.warmup && elapsed < self.warmup + self.steady
    }
}
