//! Configuration for VajraPulse runs.
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - A YAML file supplied on the command line
//! - Environment variables (`VAJRAPULSE_*`), applied after file load
//! - Command-line arguments (applied by the CLI layer, highest precedence)
//!
//! Durations accept humantime suffixes (`100ms`, `5s`, `2m`, `1h`).

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metrics::normalize_percentiles;
use crate::pattern::{AdaptiveConfig, DefaultRampPolicy};
use crate::engine::ShutdownConfig;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "VAJRAPULSE_";

/// Which load pattern a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternKind {
    /// Constant TPS for the configured duration.
    Static,
    /// Linear ramp from zero to the configured TPS, then hold it for the
    /// configured duration.
    RampUp,
    /// Ramp to the configured TPS, then sustain it.
    RampSustain,
    /// Closed-loop adaptive control.
    Adaptive,
}

impl FromStr for PatternKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "static" => Ok(Self::Static),
            "ramp-up" => Ok(Self::RampUp),
            "ramp-sustain" => Ok(Self::RampSustain),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(Error::invalid_config(
                "load_pattern",
                format!("unknown pattern '{other}' (expected static, ramp-up, ramp-sustain, or adaptive)"),
            )),
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::RampUp => write!(f, "ramp-up"),
            Self::RampSustain => write!(f, "ramp-sustain"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Latency-threshold reporting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Percentiles to report, each in [0, 1].
    pub percentiles: Vec<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            percentiles: crate::metrics::DEFAULT_PERCENTILES.to_vec(),
        }
    }
}

/// Shutdown timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSection {
    /// Budget for graceful draining.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
    /// Additional budget after workers are cancelled.
    #[serde(with = "humantime_serde")]
    pub force_timeout: Duration,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            drain_timeout: crate::engine::DEFAULT_DRAIN_TIMEOUT,
            force_timeout: crate::engine::DEFAULT_FORCE_TIMEOUT,
        }
    }
}

/// Adaptive controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveSection {
    /// Starting rate.
    pub initial_tps: f64,
    /// Ceiling rate.
    pub max_tps: f64,
    /// Floor rate.
    pub min_tps: f64,
    /// TPS added per approved interval.
    pub ramp_increment: f64,
    /// TPS removed per strained interval.
    pub ramp_decrement: f64,
    /// Minimum wall time between decisions.
    #[serde(with = "humantime_serde")]
    pub ramp_interval: Duration,
    /// How long to hold a recovered rate before completing.
    #[serde(with = "humantime_serde")]
    pub sustain_duration: Duration,
    /// Strain-free intervals required to exit a ramp-down.
    pub stable_intervals_required: u32,
    /// Failure-rate ceiling for healthy operation.
    pub error_threshold: f64,
    /// Backpressure ceiling below which ramping up continues.
    pub backpressure_ramp_up: f64,
    /// Backpressure floor that forces a ramp-down.
    pub backpressure_ramp_down: f64,
}

impl Default for AdaptiveSection {
    fn default() -> Self {
        Self {
            initial_tps: 10.0,
            max_tps: 1000.0,
            min_tps: 1.0,
            ramp_increment: 10.0,
            ramp_decrement: 20.0,
            ramp_interval: Duration::from_secs(10),
            sustain_duration: Duration::from_secs(300),
            stable_intervals_required: 3,
            error_threshold: crate::pattern::DEFAULT_ERROR_THRESHOLD,
            backpressure_ramp_up: crate::pattern::DEFAULT_RAMP_UP_BACKPRESSURE,
            backpressure_ramp_down: crate::pattern::DEFAULT_RAMP_DOWN_BACKPRESSURE,
        }
    }
}

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Target TPS for open-loop patterns.
    pub tps: f64,
    /// Run duration for open-loop patterns.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Which pattern to run.
    pub load_pattern: PatternKind,
    /// Ramp window for ramping patterns.
    #[serde(with = "humantime_serde")]
    pub ramp_duration: Duration,
    /// Sustain window for the ramp-sustain pattern.
    #[serde(with = "humantime_serde")]
    pub sustain_duration: Duration,
    /// Latency reporting settings.
    pub thresholds: Thresholds,
    /// Shutdown timeouts.
    pub shutdown: ShutdownSection,
    /// Interval between periodic exports.
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    /// Adaptive controller settings.
    pub adaptive: AdaptiveSection,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tps: 100.0,
            duration: Duration::from_secs(60),
            load_pattern: PatternKind::Static,
            ramp_duration: Duration::from_secs(30),
            sustain_duration: Duration::from_secs(60),
            thresholds: Thresholds::default(),
            shutdown: ShutdownSection::default(),
            report_interval: crate::engine::DEFAULT_REPORT_INTERVAL,
            adaptive: AdaptiveSection::default(),
        }
    }
}

impl RunConfig {
    /// Loads configuration: file (if given), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::ConfigFileNotFound(path.to_path_buf()));
                }
                let text = std::fs::read_to_string(path)?;
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses configuration from a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Applies `VAJRAPULSE_*` environment overrides. Unparseable values are
    /// ignored in favor of the existing setting.
    pub fn apply_env_overrides(&mut self) {
        if let Some(tps) = env_parse::<f64>("TPS") {
            self.tps = tps;
        }
        if let Some(duration) = env_duration("DURATION") {
            self.duration = duration;
        }
        if let Ok(pattern) = std::env::var(format!("{ENV_PREFIX}LOAD_PATTERN")) {
            if let Ok(kind) = pattern.parse() {
                self.load_pattern = kind;
            }
        }
        if let Some(ramp) = env_duration("RAMP_DURATION") {
            self.ramp_duration = ramp;
        }
        if let Some(sustain) = env_duration("SUSTAIN_DURATION") {
            self.sustain_duration = sustain;
        }
        if let Some(drain) = env_duration("DRAIN_TIMEOUT") {
            self.shutdown.drain_timeout = drain;
        }
        if let Some(force) = env_duration("FORCE_TIMEOUT") {
            self.shutdown.force_timeout = force;
        }
        if let Some(interval) = env_duration("REPORT_INTERVAL") {
            self.report_interval = interval;
        }
        if let Some(initial) = env_parse::<f64>("ADAPTIVE_INITIAL_TPS") {
            self.adaptive.initial_tps = initial;
        }
        if let Some(max) = env_parse::<f64>("ADAPTIVE_MAX_TPS") {
            self.adaptive.max_tps = max;
        }
        if let Some(min) = env_parse::<f64>("ADAPTIVE_MIN_TPS") {
            self.adaptive.min_tps = min;
        }
    }

    /// Validates the whole configuration.
    pub fn validate(&self) -> Result<()> {
        if self.load_pattern != PatternKind::Adaptive {
            if self.tps <= 0.0 {
                return Err(Error::invalid_config("tps", "must be positive"));
            }
            if self.duration.is_zero() {
                return Err(Error::invalid_config("duration", "must be positive"));
            }
        }
        normalize_percentiles(&self.thresholds.percentiles)?;
        if self.load_pattern == PatternKind::Adaptive {
            self.adaptive_config()?;
        }
        Ok(())
    }

    /// Builds the adaptive controller configuration from this file's
    /// settings.
    pub fn adaptive_config(&self) -> Result<AdaptiveConfig> {
        AdaptiveConfig::builder()
            .initial_tps(self.adaptive.initial_tps)
            .min_tps(self.adaptive.min_tps)
            .max_tps(self.adaptive.max_tps)
            .ramp_increment(self.adaptive.ramp_increment)
            .ramp_decrement(self.adaptive.ramp_decrement)
            .ramp_interval(self.adaptive.ramp_interval)
            .sustain_duration(self.adaptive.sustain_duration)
            .stable_intervals_required(self.adaptive.stable_intervals_required)
            .build()
    }

    /// Builds the decision policy from this file's thresholds.
    pub fn ramp_policy(&self) -> DefaultRampPolicy {
        DefaultRampPolicy::new(
            self.adaptive.error_threshold,
            self.adaptive.backpressure_ramp_up,
            self.adaptive.backpressure_ramp_down,
            crate::pattern::DEFAULT_RECOVERY_LOW_BACKPRESSURE,
            crate::pattern::DEFAULT_RECOVERY_MODERATE_BACKPRESSURE,
        )
    }

    /// Shutdown timeouts as the engine consumes them.
    pub fn shutdown_config(&self) -> ShutdownConfig {
        ShutdownConfig {
            drain_timeout: self.shutdown.drain_timeout,
            force_timeout: self.shutdown.force_timeout,
            ..ShutdownConfig::default()
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .and_then(|value| value.parse().ok())
}

fn env_duration(key: &str) -> Option<Duration> {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .and_then(|value| humantime::parse_duration(&value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_defaults_validate() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
tps: 250
duration: 90s
load_pattern: ramp-sustain
ramp_duration: 15s
sustain_duration: 45s
thresholds:
  percentiles: [0.5, 0.95, 0.999]
shutdown:
  drain_timeout: 2s
  force_timeout: 4s
report_interval: 5s
adaptive:
  initial_tps: 20
  max_tps: 400
  min_tps: 2
  ramp_increment: 20
  ramp_decrement: 40
  ramp_interval: 500ms
  sustain_duration: 30s
  stable_intervals_required: 2
  error_threshold: 0.05
"#;
        let config = RunConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.tps, 250.0);
        assert_eq!(config.duration, Duration::from_secs(90));
        assert_eq!(config.load_pattern, PatternKind::RampSustain);
        assert_eq!(config.thresholds.percentiles, vec![0.5, 0.95, 0.999]);
        assert_eq!(config.shutdown.drain_timeout, Duration::from_secs(2));
        assert_eq!(config.adaptive.ramp_interval, Duration::from_millis(500));
        config.validate().unwrap();

        let adaptive = config.adaptive_config().unwrap();
        assert_eq!(adaptive.initial_tps, 20.0);
        assert_eq!(adaptive.stable_intervals_required, 2);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = RunConfig::from_yaml("tps: 42\n").unwrap();
        assert_eq!(config.tps, 42.0);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.load_pattern, PatternKind::Static);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = RunConfig::default();
        config.tps = 0.0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.thresholds.percentiles = vec![2.0];
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.load_pattern = PatternKind::Adaptive;
        config.adaptive.min_tps = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pattern_kind_parsing() {
        assert_eq!("static".parse::<PatternKind>().unwrap(), PatternKind::Static);
        assert_eq!(
            "ramp-sustain".parse::<PatternKind>().unwrap(),
            PatternKind::RampSustain
        );
        assert!("linear".parse::<PatternKind>().is_err());
        assert_eq!(PatternKind::Adaptive.to_string(), "adaptive");
    }

    #[test]
    #[serial]
    fn test_env_overrides_applied_after_load() {
        std::env::set_var("VAJRAPULSE_TPS", "777");
        std::env::set_var("VAJRAPULSE_DURATION", "3m");
        std::env::set_var("VAJRAPULSE_LOAD_PATTERN", "adaptive");
        std::env::set_var("VAJRAPULSE_DRAIN_TIMEOUT", "1500ms");

        let config = RunConfig::load(None).unwrap();
        assert_eq!(config.tps, 777.0);
        assert_eq!(config.duration, Duration::from_secs(180));
        assert_eq!(config.load_pattern, PatternKind::Adaptive);
        assert_eq!(config.shutdown.drain_timeout, Duration::from_millis(1500));

        std::env::remove_var("VAJRAPULSE_TPS");
        std::env::remove_var("VAJRAPULSE_DURATION");
        std::env::remove_var("VAJRAPULSE_LOAD_PATTERN");
        std::env::remove_var("VAJRAPULSE_DRAIN_TIMEOUT");
    }

    #[test]
    #[serial]
    fn test_unparseable_env_values_are_ignored() {
        std::env::set_var("VAJRAPULSE_TPS", "not-a-number");
        let config = RunConfig::load(None).unwrap();
        assert_eq!(config.tps, 100.0);
        std::env::remove_var("VAJRAPULSE_TPS");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = RunConfig::load(Some(Path::new("/nonexistent/vajrapulse.yml")));
        assert!(matches!(result, Err(Error::ConfigFileNotFound(_))));
    }
}
