//! Thread-safe recording of task outcomes and snapshot production.
//!
//! [`MetricsCollector`] is mutated by every worker: counters are lock-free
//! atomics, the latency distribution is an HdrHistogram behind a short
//! `parking_lot` lock, and the recent-window ring is fully atomic. Readers
//! (the periodic reporter and the cached provider) pull immutable
//! [`AggregatedMetrics`] values via [`MetricsCollector::snapshot`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::metrics::types::{
    normalize_percentiles, AggregatedMetrics, ClientMetrics, LatencySummary, PercentileLatency,
    DEFAULT_PERCENTILES,
};
use crate::metrics::window::RecentWindow;
use crate::task::TaskResult;

/// Lowest trackable latency, in microseconds.
const HISTOGRAM_LOW_MICROS: u64 = 1;
/// Highest trackable latency, in microseconds (one hour).
const HISTOGRAM_HIGH_MICROS: u64 = 3_600_000_000;
/// Histogram precision in significant value digits.
const HISTOGRAM_SIGFIGS: u8 = 3;
/// Distinct failure causes tracked before the tally stops growing.
const MAX_TRACKED_CAUSES: usize = 100;

fn new_latency_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(HISTOGRAM_LOW_MICROS, HISTOGRAM_HIGH_MICROS, HISTOGRAM_SIGFIGS)
        .expect("histogram bounds are compile-time constants")
}

// ============================================================================
// Snapshot Scratch
// ============================================================================

/// Reusable buffer for snapshot assembly.
///
/// Copying the live histogram is the expensive part of a snapshot; a
/// call site that snapshots at high frequency keeps one scratch and passes
/// it to [`MetricsCollector::snapshot_with`] to avoid reallocating the
/// counts array every time. Scratches are per-call-site, never shared.
pub struct SnapshotScratch {
    histogram: Histogram<u64>,
}

impl SnapshotScratch {
    /// Creates an empty scratch buffer.
    pub fn new() -> Self {
        Self {
            histogram: new_latency_histogram(),
        }
    }
}

impl Default for SnapshotScratch {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Metrics Collector
// ============================================================================

/// Central recorder for per-execution outcomes.
pub struct MetricsCollector {
    /// Successful executions.
    successes: AtomicU64,
    /// Failed executions.
    failures: AtomicU64,
    /// Submissions dropped before execution.
    dropped: AtomicU64,
    /// Normalized percentile keys, sorted ascending.
    percentiles: Vec<f64>,
    /// Latency distribution in microseconds.
    histogram: Mutex<Histogram<u64>>,
    /// Per-cause failure tally, bounded at [`MAX_TRACKED_CAUSES`].
    causes: RwLock<HashMap<String, u64>>,
    /// Time-bucketed ring for recent failure-rate queries.
    recent: RecentWindow,
    /// Latest client-side counters.
    client: RwLock<Option<ClientMetrics>>,
    /// Run this collector belongs to.
    run_id: String,
}

impl MetricsCollector {
    /// Creates a collector with the default percentile set.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self::with_percentiles(run_id, DEFAULT_PERCENTILES)
            .expect("default percentiles are valid")
    }

    /// Creates a collector with a user-supplied percentile set.
    ///
    /// The set is normalized (rounded to 3 decimal places, deduplicated,
    /// sorted ascending) and rejected if empty or out of range.
    pub fn with_percentiles(run_id: impl Into<String>, percentiles: &[f64]) -> Result<Self> {
        Ok(Self {
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            percentiles: normalize_percentiles(percentiles)?,
            histogram: Mutex::new(new_latency_histogram()),
            causes: RwLock::new(HashMap::new()),
            recent: RecentWindow::default(),
            client: RwLock::new(None),
            run_id: run_id.into(),
        })
    }

    /// The normalized percentile keys this collector reports.
    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    /// Records a task outcome.
    pub fn record(&self, result: &TaskResult) {
        match result {
            TaskResult::Success { latency } => self.record_success(*latency),
            TaskResult::Failure { latency, cause } => self.record_failure(*latency, cause),
        }
    }

    /// Records a successful execution.
    pub fn record_success(&self, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.recent.record(true);
        self.observe_latency(latency);
    }

    /// Records a failed execution.
    pub fn record_failure(&self, latency: Duration, cause: &str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.recent.record(false);
        self.observe_latency(latency);

        let mut causes = self.causes.write();
        if let Some(count) = causes.get_mut(cause) {
            *count += 1;
        } else if causes.len() < MAX_TRACKED_CAUSES {
            causes.insert(cause.to_string(), 1);
        }
    }

    /// Counts a submission that was dropped before execution.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Replaces the latest client-side counters.
    pub fn record_client_metrics(&self, metrics: ClientMetrics) {
        *self.client.write() = Some(metrics);
    }

    fn observe_latency(&self, latency: Duration) {
        let micros = (latency.as_micros() as u64)
            .clamp(HISTOGRAM_LOW_MICROS, HISTOGRAM_HIGH_MICROS);
        self.histogram.lock().saturating_record(micros);
    }

    /// Total executions recorded so far.
    pub fn total_executions(&self) -> u64 {
        self.successes.load(Ordering::Relaxed) + self.failures.load(Ordering::Relaxed)
    }

    /// Dropped-submission count.
    pub fn dropped_submissions(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Lifetime failure fraction in [0, 1]; 0 when nothing has executed.
    pub fn failure_rate(&self) -> f64 {
        let failures = self.failures.load(Ordering::Relaxed);
        let total = self.successes.load(Ordering::Relaxed) + failures;
        if total == 0 {
            0.0
        } else {
            failures as f64 / total as f64
        }
    }

    /// Failure fraction over the trailing `window`.
    pub fn recent_failure_rate(&self, window: Duration) -> f64 {
        self.recent.failure_rate(window)
    }

    /// Per-cause failure tally, most frequent first.
    pub fn failure_causes(&self) -> Vec<(String, u64)> {
        let mut causes: Vec<(String, u64)> = self
            .causes
            .read()
            .iter()
            .map(|(cause, count)| (cause.clone(), *count))
            .collect();
        causes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        causes
    }

    /// Produces an immutable snapshot, allocating a fresh scratch buffer.
    pub fn snapshot(&self) -> AggregatedMetrics {
        self.snapshot_with(&mut SnapshotScratch::new())
    }

    /// Produces an immutable snapshot using a caller-owned scratch buffer.
    ///
    /// The live histogram is copied into the scratch under the lock;
    /// percentile extraction happens outside it.
    pub fn snapshot_with(&self, scratch: &mut SnapshotScratch) -> AggregatedMetrics {
        {
            let live = self.histogram.lock();
            scratch.histogram.reset();
            scratch
                .histogram
                .add(&*live)
                .expect("scratch histogram shares the live histogram's bounds");
        }

        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let total = successes + failures;

        let histogram = &scratch.histogram;
        let percentiles = self
            .percentiles
            .iter()
            .map(|&p| PercentileLatency {
                percentile: p,
                latency: Duration::from_micros(histogram.value_at_quantile(p)),
            })
            .collect();

        let latency = if histogram.is_empty() {
            LatencySummary::zero()
        } else {
            LatencySummary {
                mean: Duration::from_secs_f64(histogram.mean() / 1e6),
                stddev: Duration::from_secs_f64(histogram.stdev() / 1e6),
                min: Duration::from_micros(histogram.min()),
                max: Duration::from_micros(histogram.max()),
            }
        };

        AggregatedMetrics {
            total_executions: total,
            total_successes: successes,
            total_failures: failures,
            dropped_submissions: self.dropped.load(Ordering::Relaxed),
            failure_rate: if total == 0 {
                0.0
            } else {
                failures as f64 / total as f64
            },
            percentiles,
            latency,
            client: *self.client.read(),
            run_id: self.run_id.clone(),
        }
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("run_id", &self.run_id)
            .field("successes", &self.successes.load(Ordering::Relaxed))
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
