//! Command-line interface for the VajraPulse binary.
//!
//! The CLI is a thin layer over [`RunConfig`](crate::config::RunConfig):
//! flags override whatever the configuration file and environment provided.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::config::{PatternKind, RunConfig};

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}

/// VajraPulse: adaptive load generation.
#[derive(Parser, Debug)]
#[command(
    name = "vajrapulse",
    version,
    about = "Drive a task at a target throughput and stream aggregated metrics",
    long_about = None
)]
pub struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long, env = "VAJRAPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target TPS for open-loop patterns.
    #[arg(long)]
    pub tps: Option<f64>,

    /// Run duration for open-loop patterns (e.g. 30s, 5m).
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Load pattern: static, ramp-up, ramp-sustain, or adaptive.
    #[arg(long, value_parser = PatternKind::from_str)]
    pub load_pattern: Option<PatternKind>,

    /// Ramp window for ramping patterns.
    #[arg(long, value_parser = parse_duration)]
    pub ramp_duration: Option<Duration>,

    /// Sustain window for the ramp-sustain pattern.
    #[arg(long, value_parser = parse_duration)]
    pub sustain_duration: Option<Duration>,

    /// Budget for graceful draining at shutdown.
    #[arg(long, value_parser = parse_duration)]
    pub shutdown_timeout: Option<Duration>,

    /// Additional budget after workers are cancelled.
    #[arg(long, value_parser = parse_duration)]
    pub force_timeout: Option<Duration>,

    /// Interval between periodic metric exports.
    #[arg(long, value_parser = parse_duration)]
    pub report_interval: Option<Duration>,

    /// Adaptive: starting TPS.
    #[arg(long)]
    pub initial_tps: Option<f64>,

    /// Adaptive: ceiling TPS.
    #[arg(long)]
    pub max_tps: Option<f64>,

    /// Adaptive: floor TPS.
    #[arg(long)]
    pub min_tps: Option<f64>,

    /// Demo task: mean simulated latency.
    #[arg(long, value_parser = parse_duration, default_value = "10ms")]
    pub task_latency: Duration,

    /// Demo task: latency jitter (uniform, +/-).
    #[arg(long, value_parser = parse_duration, default_value = "5ms")]
    pub task_jitter: Duration,

    /// Demo task: failure probability in [0, 1].
    #[arg(long, default_value_t = 0.0)]
    pub task_failure_rate: f64,

    /// Also emit JSON-lines snapshots on stdout.
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Applies flag overrides on top of a loaded configuration.
    pub fn apply_to(&self, config: &mut RunConfig) {
        if let Some(tps) = self.tps {
            config.tps = tps;
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(pattern) = self.load_pattern {
            config.load_pattern = pattern;
        }
        if let Some(ramp) = self.ramp_duration {
            config.ramp_duration = ramp;
        }
        if let Some(sustain) = self.sustain_duration {
            config.sustain_duration = sustain;
            config.adaptive.sustain_duration = sustain;
        }
        if let Some(drain) = self.shutdown_timeout {
            config.shutdown.drain_timeout = drain;
        }
        if let Some(force) = self.force_timeout {
            config.shutdown.force_timeout = force;
        }
        if let Some(interval) = self.report_interval {
            config.report_interval = interval;
        }
        if let Some(initial) = self.initial_tps {
            config.adaptive.initial_tps = initial;
        }
        if let Some(max) = self.max_tps {
            config.adaptive.max_tps = max;
        }
        if let Some(min) = self.min_tps {
            config.adaptive.min_tps = min;
        }
    }
}
