//! Value types for the metrics pipeline.
//!
//! This module provides the immutable snapshot types produced by the
//! collector, the run-scoped context attached to every export, and the
//! percentile normalization applied at construction time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Percentile Normalization
// ============================================================================

/// Default percentile set used when the configuration does not supply one.
pub const DEFAULT_PERCENTILES: &[f64] = &[0.5, 0.9, 0.99];

/// Normalizes a user-supplied percentile list.
///
/// Each value must lie in [0, 1]. Values are rounded to 3 decimal places,
/// deduplicated, and sorted ascending. An empty input is rejected.
pub fn normalize_percentiles(input: &[f64]) -> Result<Vec<f64>> {
    if input.is_empty() {
        return Err(Error::validation(
            "percentiles",
            "at least one percentile is required",
        ));
    }
    let mut normalized: Vec<f64> = Vec::with_capacity(input.len());
    for &p in input {
        if !(0.0..=1.0).contains(&p) || !p.is_finite() {
            return Err(Error::validation(
                "percentiles",
                format!("percentile {p} is outside [0, 1]"),
            ));
        }
        normalized.push((p * 1000.0).round() / 1000.0);
    }
    normalized.sort_by(|a, b| a.partial_cmp(b).expect("finite percentiles"));
    normalized.dedup();
    Ok(normalized)
}

// ============================================================================
// Snapshot Types
// ============================================================================

/// One percentile of the latency distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileLatency {
    /// Percentile key in [0, 1], normalized to 3 decimal places.
    pub percentile: f64,
    /// Latency at that percentile.
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
}

/// Statistical summary of the latency distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    /// Arithmetic mean latency.
    #[serde(with = "humantime_serde")]
    pub mean: Duration,
    /// Standard deviation estimate.
    #[serde(with = "humantime_serde")]
    pub stddev: Duration,
    /// Minimum recorded latency.
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    /// Maximum recorded latency.
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl LatencySummary {
    /// A summary with every field zero, used before any execution records.
    pub fn zero() -> Self {
        Self {
            mean: Duration::ZERO,
            stddev: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }
}

/// Client-side counters reported by the task implementation.
///
/// Missing means zero; each record replaces the previous value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientMetrics {
    /// Connection-pool utilization in [0, 1].
    pub pool_utilization: f64,
    /// Depth of the client-side request queue.
    pub queue_depth: u64,
    /// Errors observed by the client but not surfaced as task failures.
    pub client_errors: u64,
}

/// Immutable aggregated view of a run's metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    /// Total executions recorded (successes + failures).
    pub total_executions: u64,
    /// Total successful executions.
    pub total_successes: u64,
    /// Total failed executions.
    pub total_failures: u64,
    /// Submissions dropped by pool admission or draining.
    pub dropped_submissions: u64,
    /// Failure fraction in [0, 1]; 0 when nothing has executed.
    pub failure_rate: f64,
    /// Configured percentiles of the latency distribution, sorted ascending.
    pub percentiles: Vec<PercentileLatency>,
    /// Mean/stddev/min/max of the latency distribution.
    pub latency: LatencySummary,
    /// Latest client-side counters, if any were reported.
    pub client: Option<ClientMetrics>,
    /// Identifier of the run this snapshot belongs to.
    pub run_id: String,
}

impl AggregatedMetrics {
    /// An empty snapshot for the given run.
    pub fn empty(run_id: impl Into<String>) -> Self {
        Self {
            total_executions: 0,
            total_successes: 0,
            total_failures: 0,
            dropped_submissions: 0,
            failure_rate: 0.0,
            percentiles: Vec::new(),
            latency: LatencySummary::zero(),
            client: None,
            run_id: run_id.into(),
        }
    }

    /// Generates a multi-line text summary for end-of-run output.
    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "VajraPulse Run Summary\n\
            ======================\n\
            Run: {}\n\
            \n\
            Executions:\n\
            - Total: {}\n\
            - Succeeded: {}\n\
            - Failed: {}\n\
            - Dropped: {}\n\
            - Failure Rate: {:.2}%\n\
            \n\
            Latency:\n\
            - Mean: {:?} (stddev {:?})\n\
            - Range: {:?} .. {:?}\n",
            self.run_id,
            self.total_executions,
            self.total_successes,
            self.total_failures,
            self.dropped_submissions,
            self.failure_rate * 100.0,
            self.latency.mean,
            self.latency.stddev,
            self.latency.min,
            self.latency.max,
        );
        for p in &self.percentiles {
            text.push_str(&format!(
                "- p{:.1}: {:?}\n",
                p.percentile * 100.0,
                p.latency
            ));
        }
        if let Some(client) = &self.client {
            text.push_str(&format!(
                "\nClient:\n- Pool Utilization: {:.1}%\n- Queue Depth: {}\n- Client Errors: {}\n",
                client.pool_utilization * 100.0,
                client.queue_depth,
                client.client_errors,
            ));
        }
        text
    }
}

// ============================================================================
// Run Context
// ============================================================================

/// Static information about the host running the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Hostname of the machine.
    pub hostname: String,
    /// Operating system family.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// Engine version that produced the run.
    pub engine_version: String,
}

impl SystemInfo {
    /// Gathers system information for the current host.
    pub fn gather() -> Self {
        Self {
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Run-scoped identity, set at engine start and immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Stable run identifier.
    pub run_id: String,
    /// Wall-clock start time of the run.
    pub started_at: DateTime<Utc>,
    /// Host information.
    pub system: SystemInfo,
}

impl RunContext {
    /// Creates a fresh context with a random run id.
    pub fn generate() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            system: SystemInfo::gather(),
        }
    }
}
