//! Metrics pipeline for VajraPulse.
//!
//! This module is the feedback channel between the workers executing tasks
//! and everything that wants to know how the run is going:
//!
//! - **Collector**: lock-free counters plus an HdrHistogram latency
//!   distribution, fed a [`TaskResult`](crate::task::TaskResult) per
//!   execution
//! - **Recent window**: time-bucketed ring answering "what fraction failed
//!   in the last N seconds"
//! - **Provider**: the read-only, TTL-cached capability the adaptive
//!   controller consumes
//! - **Backpressure**: downstream saturation signal in [0, 1]
//!
//! # Example
//!
//! ```rust,ignore
//! use vajrapulse::metrics::{CachedMetricsProvider, MetricsCollector, MetricsProvider};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let collector = Arc::new(MetricsCollector::new("run-42"));
//! collector.record_success(Duration::from_millis(12));
//!
//! let provider = CachedMetricsProvider::new(collector.clone());
//! assert!(provider.failure_rate() < 0.01);
//!
//! let snapshot = collector.snapshot();
//! println!("p99 = {:?}", snapshot.percentiles.last());
//! ```

mod backpressure;
mod collector;
mod provider;
mod types;
mod window;

pub use backpressure::{BackpressureProvider, FixedBackpressure, SharedBackpressure};
pub use collector::{MetricsCollector, SnapshotScratch};
pub use provider::{
    CachedMetricsProvider, MetricsProvider, DEFAULT_CACHE_TTL, DEFAULT_RECENT_WINDOW,
};
pub use types::{
    normalize_percentiles, AggregatedMetrics, ClientMetrics, LatencySummary, PercentileLatency,
    RunContext, SystemInfo, DEFAULT_PERCENTILES,
};
pub use window::{RecentWindow, DEFAULT_WINDOW_CAPACITY_SECS};
