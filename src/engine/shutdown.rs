//! Signal-and-deadline-driven drain of in-flight work.
//!
//! [`ShutdownManager`] moves the engine from Running to Stopped while
//! bounding latency: cancel the pacing loop, give in-flight workers
//! `drain_timeout` to finish, hard-cancel whatever remains and wait up to
//! `force_timeout` more, then run registered shutdown callbacks (each under
//! its own timeout) and commit the terminal state. The first caller does the
//! work; concurrent callers wait for it to finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::task::TaskError;

use super::gauges::EngineGauges;
use super::{EngineState, StateCell};

/// Default wall-time budget for graceful draining.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Default additional budget after workers are hard-cancelled.
pub const DEFAULT_FORCE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default budget for each registered shutdown callback.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeouts governing the shutdown protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// Budget for in-flight workers to finish on their own.
    pub drain_timeout: Duration,
    /// Additional budget after outstanding workers are cancelled.
    pub force_timeout: Duration,
    /// Budget for each registered shutdown callback.
    pub callback_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            force_timeout: DEFAULT_FORCE_TIMEOUT,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }
}

/// An async callback run during shutdown, identified by name for logging.
pub type ShutdownCallback =
    Box<dyn Fn() -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync>;

/// Coordinates the Running → Draining → Stopped transition.
pub struct ShutdownManager {
    config: ShutdownConfig,
    state: Arc<StateCell>,
    pacing_cancel: CancellationToken,
    hard_cancel: CancellationToken,
    tracker: TaskTracker,
    in_flight: Arc<AtomicU64>,
    callbacks: Mutex<Vec<(String, ShutdownCallback)>>,
    gauges: Arc<EngineGauges>,
    stopped_tx: watch::Sender<bool>,
}

impl ShutdownManager {
    /// Creates a manager wired to the engine's shared state.
    pub(crate) fn new(
        config: ShutdownConfig,
        state: Arc<StateCell>,
        pacing_cancel: CancellationToken,
        hard_cancel: CancellationToken,
        tracker: TaskTracker,
        in_flight: Arc<AtomicU64>,
        gauges: Arc<EngineGauges>,
    ) -> Self {
        let (stopped_tx, _) = watch::channel(false);
        Self {
            config,
            state,
            pacing_cancel,
            hard_cancel,
            tracker,
            in_flight,
            callbacks: Mutex::new(Vec::new()),
            gauges,
            stopped_tx,
        }
    }

    /// The configured timeouts.
    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }

    /// Registers a callback to run during shutdown, bounded by
    /// [`ShutdownConfig::callback_timeout`]. Failures are counted and
    /// logged, never propagated.
    pub fn register_callback<F, Fut>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.callbacks
            .lock()
            .push((name.into(), Box::new(move || Box::pin(callback()))));
    }

    /// Drives the engine to Stopped. Idempotent: the first caller performs
    /// the drain; concurrent callers wait for it; later callers observe the
    /// terminal state immediately.
    pub async fn shutdown(&self) -> EngineState {
        let claimed = self
            .state
            .transition(EngineState::Running, EngineState::Draining)
            || self
                .state
                .transition(EngineState::Idle, EngineState::Draining);

        if !claimed {
            match self.state.load() {
                EngineState::Draining => {
                    let mut rx = self.stopped_tx.subscribe();
                    // The winner flips this after committing Stopped.
                    let _ = rx.wait_for(|stopped| *stopped).await;
                    return self.state.load();
                }
                terminal => return terminal,
            }
        }

        debug!("engine draining: interrupting submission loop");
        self.pacing_cancel.cancel();
        self.tracker.close();

        let drained = tokio::time::timeout(self.config.drain_timeout, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            warn!(
                drain_timeout = ?self.config.drain_timeout,
                in_flight = self.in_flight.load(Ordering::Relaxed),
                "drain timeout expired; cancelling outstanding workers"
            );
            self.hard_cancel.cancel();
            let forced = tokio::time::timeout(self.config.force_timeout, self.tracker.wait())
                .await
                .is_ok();
            if !forced {
                warn!(
                    force_timeout = ?self.config.force_timeout,
                    abandoned = self.in_flight.load(Ordering::Relaxed),
                    "force timeout expired; abandoning unresponsive workers"
                );
            }
        }

        self.run_callbacks().await;

        self.state
            .transition(EngineState::Draining, EngineState::Stopped);
        let _ = self.stopped_tx.send(true);
        debug!("engine stopped");
        EngineState::Stopped
    }

    async fn run_callbacks(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for (name, callback) in callbacks {
            match tokio::time::timeout(self.config.callback_timeout, callback()).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    self.gauges.shutdown_callback_errors.inc();
                    warn!(callback = %name, %error, "shutdown callback failed");
                }
                Err(_) => {
                    self.gauges.shutdown_callback_errors.inc();
                    warn!(
                        callback = %name,
                        timeout = ?self.config.callback_timeout,
                        "shutdown callback timed out"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for ShutdownManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownManager")
            .field("config", &self.config)
            .field("state", &self.state.load())
            .finish_non_exhaustive()
    }
}
