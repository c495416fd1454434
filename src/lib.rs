//! # VajraPulse - Adaptive Load Generation
//!
//! VajraPulse drives a user-supplied task at a time-varying target
//! throughput (transactions per second), records per-execution latency and
//! success/failure, and streams aggregated metrics to pluggable exporters.
//! Its centerpiece is a closed-loop adaptive controller that converges on
//! the highest TPS a system sustains without elevated failures or
//! backpressure.
//!
//! ## Core Concepts
//!
//! - **Task**: the unit of work, with `init`/`execute`/`teardown` lifecycle
//! - **Load pattern**: the throughput schedule (static, ramping, or
//!   adaptive closed-loop)
//! - **Engine**: the paced submission loop and its lightweight workers
//! - **Metrics**: lock-free counters plus a latency histogram, snapshotted
//!   periodically
//! - **Exporters**: consumers of the metrics stream (console, JSON lines,
//!   or custom integrations)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ExecutionEngine                           │
//! │     tick ──> LoadPattern::target_tps ──> RateController          │
//! └─────────────────────────────────────────────────────────────────┘
//!        │                                          │
//!        │ (adaptive reads back)                    ▼
//! ┌──────┴───────────┐                 ┌─────────────────────────┐
//! │ MetricsProvider  │                 │   worker per submission  │
//! │  (TTL cache)     │                 │   TaskLifecycle::execute │
//! └──────▲───────────┘                 └────────────┬────────────┘
//!        │                                          │ TaskResult
//! ┌──────┴──────────────────────────────────────────▼────────────┐
//! │                      MetricsCollector                         │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//!                    MetricsReporter ──> exporters
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use vajrapulse::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let task = Arc::new(FnTask::new(|_iteration| async {
//!         // call the system under test here
//!         TaskResult::success(Duration::from_millis(8))
//!     }));
//!
//!     let engine = ExecutionEngine::builder()
//!         .task(task)
//!         .pattern(Arc::new(StaticLoad::new(200.0, Duration::from_secs(30))))
//!         .exporter(Arc::new(ConsoleExporter::new()))
//!         .build()?;
//!
//!     let report = engine.run().await?;
//!     println!("{}", report.summary_text());
//!     Ok(())
//! }
//! ```
//!
//! Closed-loop runs wire the collector into the pattern before building:
//!
//! ```rust,ignore
//! let collector = Arc::new(MetricsCollector::new("search-tier"));
//! let provider = Arc::new(CachedMetricsProvider::new(collector.clone()));
//! let pattern = Arc::new(AdaptiveLoadPattern::new(
//!     AdaptiveConfig::builder().initial_tps(10.0).max_tps(500.0).build()?,
//!     provider,
//! ));
//! let engine = ExecutionEngine::builder()
//!     .task(task)
//!     .pattern(pattern)
//!     .metrics_collector(collector)
//!     .build()?;
//! ```

#![warn(clippy::all)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of the most commonly needed types.

    // Error handling
    pub use crate::error::{Error, Result};

    // Task contract
    pub use crate::task::{DemoTask, FnTask, TaskLifecycle, TaskResult};

    // Execution engine
    pub use crate::engine::{
        EngineState, ExecutionEngine, ExecutionEngineBuilder, ShutdownConfig, ShutdownManager,
    };

    // Load patterns
    pub use crate::pattern::{
        AdaptiveConfig, AdaptiveLoadPattern, AdaptivePhase, LoadPattern, PhaseListener,
        RampUpLoad, RampUpSustainLoad, StaticLoad, WarmupCooldownLoad,
    };

    // Metrics pipeline
    pub use crate::metrics::{
        AggregatedMetrics, BackpressureProvider, CachedMetricsProvider, ClientMetrics,
        MetricsCollector, MetricsProvider, RunContext,
    };

    // Exporters
    pub use crate::export::{ConsoleExporter, JsonLinesExporter, MetricsExporter};

    // Configuration
    pub use crate::config::{PatternKind, RunConfig};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases for VajraPulse operations.
///
/// Construction-time contract violations and lifecycle misuse are errors;
/// business-level task failures are data
/// ([`TaskResult::Failure`](task::TaskResult)) and never abort a run.
pub mod error;

/// The task contract: `init`/`execute`/`teardown` plus [`task::TaskResult`].
pub mod task;

// ============================================================================
// Metrics Pipeline
// ============================================================================

/// Per-execution recording, snapshot assembly, and the read-only provider
/// capability the adaptive controller consumes.
pub mod metrics;

// ============================================================================
// Load Patterns
// ============================================================================

/// Throughput schedules, from constant-rate to the closed-loop
/// [`AdaptiveLoadPattern`](pattern::AdaptiveLoadPattern).
pub mod pattern;

// ============================================================================
// Execution Engine
// ============================================================================

/// The paced submission loop, worker dispatch, pacing accuracy gauges,
/// periodic reporting, and bounded shutdown.
pub mod engine;

// ============================================================================
// Exporters
// ============================================================================

/// Metrics exporters: console and JSON-lines built in, custom integrations
/// via [`export::MetricsExporter`].
pub mod export;

// ============================================================================
// Configuration & CLI
// ============================================================================

/// YAML run configuration with `VAJRAPULSE_*` environment overrides.
pub mod config;

/// Command-line argument surface for the binary.
pub mod cli;

pub use error::{Error, Result};

/// Returns the current version of VajraPulse.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
