//! Core execution engine with paced submission and bounded shutdown.
//!
//! [`ExecutionEngine`] is the top-level orchestrator. Each tick it asks the
//! [`LoadPattern`] for a target TPS, lets the [`RateController`] pace the
//! next submission, and runs the task on a lightweight worker (one tokio
//! task per in-flight execution — no fixed-size pool). Per-call outcomes
//! feed the [`MetricsCollector`]; a periodic [`MetricsReporter`] fans
//! snapshots out to exporters.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --run()--> Running --pattern ends / stop() / signal--> Draining
//!      --workers finish or force timeout--> Stopped
//! ```
//!
//! `run()` is single-shot; a second invocation fails. Shutdown is driven by
//! the [`ShutdownManager`] and is idempotent.
//!
//! # Example
//!
//! ```rust,ignore
//! use vajrapulse::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = ExecutionEngine::builder()
//!     .task(Arc::new(DemoTask::default()))
//!     .pattern(Arc::new(StaticLoad::new(100.0, Duration::from_secs(10))))
//!     .exporter(Arc::new(ConsoleExporter::new()))
//!     .build()?;
//! let report = engine.run().await?;
//! println!("executed {}", report.total_executions);
//! ```

mod gauges;
mod rate;
mod reporter;
mod shutdown;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::export::MetricsExporter;
use crate::metrics::{AggregatedMetrics, MetricsCollector, RunContext};
use crate::pattern::{AdaptivePhase, LoadPattern, PhaseListener};
use crate::task::{TaskLifecycle, TaskResult};

pub use gauges::{Counter, EngineGauges, Gauge};
pub use rate::{RateController, Wait};
pub use reporter::{MetricsReporter, DEFAULT_REPORT_INTERVAL};
pub use shutdown::{
    ShutdownCallback, ShutdownConfig, ShutdownManager, DEFAULT_CALLBACK_TIMEOUT,
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_FORCE_TIMEOUT,
};

// ============================================================================
// Engine State
// ============================================================================

/// Engine lifecycle state. Transitions are forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    /// Built but not started.
    Idle = 0,
    /// Submission loop active.
    Running = 1,
    /// Draining in-flight work.
    Draining = 2,
    /// Terminal.
    Stopped = 3,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Atomic holder for [`EngineState`] with CAS transitions.
pub(crate) struct StateCell {
    bits: AtomicU8,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            bits: AtomicU8::new(EngineState::Idle as u8),
        }
    }

    pub(crate) fn load(&self) -> EngineState {
        match self.bits.load(Ordering::Acquire) {
            0 => EngineState::Idle,
            1 => EngineState::Running,
            2 => EngineState::Draining,
            _ => EngineState::Stopped,
        }
    }

    /// Forward-only CAS; returns whether this call performed the move.
    pub(crate) fn transition(&self, from: EngineState, to: EngineState) -> bool {
        self.bits
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ExecutionEngine`]; contracts are checked at
/// [`build`](Self::build).
pub struct ExecutionEngineBuilder {
    task: Option<Arc<dyn TaskLifecycle>>,
    pattern: Option<Arc<dyn LoadPattern>>,
    collector: Option<Arc<MetricsCollector>>,
    percentiles: Option<Vec<f64>>,
    shutdown: ShutdownConfig,
    report_interval: Duration,
    exporters: Vec<Arc<dyn MetricsExporter>>,
    install_signal_handler: bool,
    context: Option<RunContext>,
}

impl Default for ExecutionEngineBuilder {
    fn default() -> Self {
        Self {
            task: None,
            pattern: None,
            collector: None,
            percentiles: None,
            shutdown: ShutdownConfig::default(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            exporters: Vec::new(),
            install_signal_handler: false,
            context: None,
        }
    }
}

impl ExecutionEngineBuilder {
    /// Sets the task to drive. Required.
    pub fn task(mut self, task: Arc<dyn TaskLifecycle>) -> Self {
        self.task = Some(task);
        self
    }

    /// Sets the load pattern to follow. Required.
    pub fn pattern(mut self, pattern: Arc<dyn LoadPattern>) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Supplies a pre-built collector (for closed-loop wiring where the
    /// pattern already reads from it). Mutually exclusive with
    /// [`percentiles`](Self::percentiles).
    pub fn metrics_collector(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Sets the latency percentiles to report.
    pub fn percentiles(mut self, percentiles: Vec<f64>) -> Self {
        self.percentiles = Some(percentiles);
        self
    }

    /// Sets shutdown timeouts.
    pub fn shutdown_config(mut self, config: ShutdownConfig) -> Self {
        self.shutdown = config;
        self
    }

    /// Sets the interval between periodic exports.
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Adds a metrics exporter.
    pub fn exporter(mut self, exporter: Arc<dyn MetricsExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    /// Opts into installing SIGINT/SIGTERM handlers that trigger the drain.
    ///
    /// Off by default so tests never install process-wide handlers.
    pub fn install_signal_handler(mut self, install: bool) -> Self {
        self.install_signal_handler = install;
        self
    }

    /// Supplies a run context instead of generating one.
    pub fn run_context(mut self, context: RunContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> Result<ExecutionEngine> {
        let task = self
            .task
            .ok_or_else(|| Error::validation("task", "a task is required"))?;
        let pattern = self
            .pattern
            .ok_or_else(|| Error::validation("pattern", "a load pattern is required"))?;
        if self.collector.is_some() && self.percentiles.is_some() {
            return Err(Error::validation(
                "percentiles",
                "set percentiles on the supplied collector, not on the builder",
            ));
        }

        let context = self.context.unwrap_or_else(RunContext::generate);
        let collector = match self.collector {
            Some(collector) => collector,
            None => match self.percentiles {
                Some(percentiles) => Arc::new(MetricsCollector::with_percentiles(
                    context.run_id.clone(),
                    &percentiles,
                )?),
                None => Arc::new(MetricsCollector::new(context.run_id.clone())),
            },
        };

        let state = Arc::new(StateCell::new());
        let pacing_cancel = CancellationToken::new();
        let hard_cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let in_flight = Arc::new(AtomicU64::new(0));
        let gauges = Arc::new(EngineGauges::new());
        let shutdown = Arc::new(ShutdownManager::new(
            self.shutdown,
            state.clone(),
            pacing_cancel.clone(),
            hard_cancel.clone(),
            tracker.clone(),
            in_flight.clone(),
            gauges.clone(),
        ));

        Ok(ExecutionEngine {
            task,
            pattern,
            collector,
            context,
            state,
            pacing_cancel,
            hard_cancel,
            tracker,
            in_flight,
            gauges,
            shutdown,
            exporters: self.exporters,
            report_interval: self.report_interval,
            install_signal_handler: self.install_signal_handler,
        })
    }
}

// ============================================================================
// Execution Engine
// ============================================================================

/// Orchestrates a run: paced submissions, worker dispatch, metrics, and
/// shutdown. See the module docs for the lifecycle.
pub struct ExecutionEngine {
    task: Arc<dyn TaskLifecycle>,
    pattern: Arc<dyn LoadPattern>,
    collector: Arc<MetricsCollector>,
    context: RunContext,
    state: Arc<StateCell>,
    pacing_cancel: CancellationToken,
    hard_cancel: CancellationToken,
    tracker: TaskTracker,
    in_flight: Arc<AtomicU64>,
    gauges: Arc<EngineGauges>,
    shutdown: Arc<ShutdownManager>,
    exporters: Vec<Arc<dyn MetricsExporter>>,
    report_interval: Duration,
    install_signal_handler: bool,
}

impl ExecutionEngine {
    /// Starts building an engine.
    pub fn builder() -> ExecutionEngineBuilder {
        ExecutionEngineBuilder::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state.load()
    }

    /// The collector this engine records into.
    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// The run context attached to every export.
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Engine-level instruments (pacing accuracy, error counters).
    pub fn gauges(&self) -> Arc<EngineGauges> {
        self.gauges.clone()
    }

    /// The shutdown manager, for registering shutdown callbacks.
    pub fn shutdown_manager(&self) -> Arc<ShutdownManager> {
        self.shutdown.clone()
    }

    /// Workers currently executing.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Requests a graceful stop and waits until the engine is stopped.
    pub async fn stop(&self) -> EngineState {
        self.shutdown.shutdown().await
    }

    /// Runs the task under the load pattern until the pattern ends or
    /// shutdown fires; returns the final aggregated metrics.
    ///
    /// Single-shot: a second call fails with an invalid-state error.
    pub async fn run(&self) -> Result<AggregatedMetrics> {
        if !self.state.transition(EngineState::Idle, EngineState::Running) {
            return Err(Error::invalid_state(
                "run",
                EngineState::Idle.to_string(),
                self.state.load().to_string(),
            ));
        }
        info!(run_id = %self.context.run_id, "run starting");

        if let Err(error) = self.task.init().await {
            self.shutdown.shutdown().await;
            return Err(Error::invalid_state(
                "init",
                "task ready",
                format!("init failed: {error}"),
            ));
        }

        self.register_adaptive_instruments();

        let signal_task = if self.install_signal_handler {
            Some(tokio::spawn(Self::signal_watch(self.shutdown.clone())))
        } else {
            None
        };

        let reporter_cancel = CancellationToken::new();
        let reporter_task = if self.exporters.is_empty() {
            None
        } else {
            let reporter = MetricsReporter::new(
                self.collector.clone(),
                self.context.clone(),
                self.exporters.clone(),
                self.report_interval,
                reporter_cancel.clone(),
                self.gauges.clone(),
            );
            Some(tokio::spawn(reporter.run()))
        };

        self.submission_loop().await;
        self.shutdown.shutdown().await;

        if let Err(error) = self.task.teardown().await {
            warn!(run_id = %self.context.run_id, %error, "task teardown failed");
        }

        reporter_cancel.cancel();
        if let Some(task) = reporter_task {
            let _ = task.await;
        }
        if let Some(task) = signal_task {
            task.abort();
        }

        let report = self.collector.snapshot();
        info!(
            run_id = %self.context.run_id,
            total = report.total_executions,
            failure_rate = report.failure_rate,
            "run complete"
        );
        Ok(report)
    }

    async fn submission_loop(&self) {
        let start = Instant::now();
        let mut rate = RateController::new(self.pacing_cancel.clone(), self.gauges.clone());
        let mut iteration: u64 = 0;

        loop {
            if self.state.load() != EngineState::Running {
                break;
            }
            let elapsed = start.elapsed();
            if let Some(total) = self.pattern.total_duration() {
                if elapsed >= total {
                    debug!(iterations = iteration, "pattern duration elapsed");
                    break;
                }
            }
            let target = self.pattern.target_tps(elapsed);
            if target <= 0.0 {
                debug!(iterations = iteration, "pattern signaled terminal");
                break;
            }
            match rate.wait_for_next(target).await {
                Wait::Proceed => {}
                Wait::Stop | Wait::Shutdown => break,
            }
            let record = self.pattern.should_record_metrics(start.elapsed());
            self.submit(iteration, record);
            iteration += 1;
        }
    }

    /// Dispatches one work unit. Never blocks the loop: a unit refused
    /// while draining is counted as dropped.
    fn submit(&self, iteration: u64, record: bool) {
        if self.state.load() != EngineState::Running {
            self.collector.record_dropped();
            return;
        }

        let task = self.task.clone();
        let collector = self.collector.clone();
        let hard_cancel = self.hard_cancel.clone();
        let in_flight = self.in_flight.clone();
        in_flight.fetch_add(1, Ordering::Relaxed);

        self.tracker.spawn(async move {
            let started = Instant::now();
            let outcome = tokio::select! {
                outcome = AssertUnwindSafe(task.execute(iteration)).catch_unwind() => Some(outcome),
                _ = hard_cancel.cancelled() => None,
            };
            if let Some(outcome) = outcome {
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => TaskResult::failure(started.elapsed(), "task panicked"),
                };
                // A worker that outlived the force deadline must not record
                // into a stopped run.
                if record && !hard_cancel.is_cancelled() {
                    collector.record(&result);
                }
            }
            in_flight.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// The one adaptive-specific touch point: probe the event capability
    /// and wire phase/TPS instruments to it.
    fn register_adaptive_instruments(&self) {
        struct InstrumentListener {
            gauges: Arc<EngineGauges>,
        }
        impl PhaseListener for InstrumentListener {
            fn on_phase_change(&self, from: AdaptivePhase, to: AdaptivePhase, tps: f64) {
                self.gauges.adaptive_phase_changes.inc();
                self.gauges.adaptive_tps.set(tps);
                info!(%from, %to, tps, "load phase change");
            }

            fn on_tps_adjustment(&self, _old_tps: f64, new_tps: f64, _phase: AdaptivePhase) {
                self.gauges.adaptive_tps.set(new_tps);
            }
        }

        if let Some(events) = self.pattern.adaptive_events() {
            events.register_listener(Arc::new(InstrumentListener {
                gauges: self.gauges.clone(),
            }));
            self.gauges.adaptive_tps.set(events.current_tps());
        }
    }

    async fn signal_watch(shutdown: Arc<ShutdownManager>) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(error) => {
                    warn!(%error, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("failed to install ctrl-c handler");
                return;
            }
        }
        info!("shutdown signal received");
        shutdown.shutdown().await;
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("run_id", &self.context.run_id)
            .field("state", &self.state.load())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
