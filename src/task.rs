//! Task contract for VajraPulse load generation.
//!
//! A [`TaskLifecycle`] is the unit of work the engine drives: `init()` runs
//! once before the first submission, `execute()` runs once per paced
//! submission (concurrently, from many workers), and `teardown()` runs once
//! after the submission loop exits. Each `execute()` call produces a
//! [`TaskResult`] that feeds the metrics pipeline.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use rand::Rng;

/// Error type for task-supplied lifecycle failures.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a single task execution.
///
/// The latency carried here is what gets recorded into the latency
/// distribution. Tasks that measure a narrower span (for example,
/// server-side time excluding connection setup) may report that instead of
/// wall time; workers fall back to wall time when the task panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// The execution succeeded.
    Success {
        /// Observed latency of the execution.
        latency: Duration,
    },
    /// The execution failed at the business level.
    Failure {
        /// Observed latency of the execution.
        latency: Duration,
        /// Failure cause, used for per-cause tallies and logging.
        cause: String,
    },
}

impl TaskResult {
    /// Creates a success result.
    pub fn success(latency: Duration) -> Self {
        Self::Success { latency }
    }

    /// Creates a failure result.
    pub fn failure(latency: Duration, cause: impl Into<String>) -> Self {
        Self::Failure {
            latency,
            cause: cause.into(),
        }
    }

    /// Returns true for [`TaskResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The observed latency, regardless of outcome.
    pub fn latency(&self) -> Duration {
        match self {
            Self::Success { latency } | Self::Failure { latency, .. } => *latency,
        }
    }

    /// The failure cause, if this is a failure.
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { cause, .. } => Some(cause),
        }
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { latency } => write!(f, "success ({latency:?})"),
            Self::Failure { latency, cause } => write!(f, "failure ({latency:?}): {cause}"),
        }
    }
}

/// The unit of work driven by the execution engine.
///
/// Implementations must be re-entrant-safe: `execute()` is called
/// concurrently from many lightweight workers. `init()` and `teardown()`
/// bracket the run and are called exactly once each.
#[async_trait]
pub trait TaskLifecycle: Send + Sync {
    /// Called once before the first submission.
    ///
    /// An error here aborts the run before any task is submitted.
    async fn init(&self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Executes one iteration of the task.
    ///
    /// `iteration` is the submission ordinal, starting at 0. Business-level
    /// failures are reported through [`TaskResult::Failure`], never by
    /// panicking; a panic is converted to a failure by the worker.
    async fn execute(&self, iteration: u64) -> TaskResult;

    /// Called once after the submission loop exits (including on shutdown).
    ///
    /// Errors are logged, not propagated.
    async fn teardown(&self) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Adapter that turns a closure into a [`TaskLifecycle`].
///
/// Useful for tests and quick experiments:
///
/// ```rust,ignore
/// let task = FnTask::new(|_iteration| async {
///     TaskResult::success(Duration::from_millis(5))
/// });
/// ```
pub struct FnTask {
    f: Box<dyn Fn(u64) -> BoxFuture<'static, TaskResult> + Send + Sync>,
}

impl FnTask {
    /// Wraps an async closure as a task.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            f: Box::new(move |iteration| Box::pin(f(iteration))),
        }
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").finish_non_exhaustive()
    }
}

#[async_trait]
impl TaskLifecycle for FnTask {
    async fn execute(&self, iteration: u64) -> TaskResult {
        (self.f)(iteration).await
    }
}

/// Built-in demo task with simulated latency and a configurable failure rate.
///
/// The CLI runs this when no library consumer supplies a task. Latency is
/// drawn uniformly from `mean ± jitter` and spent in a real sleep, so the
/// engine's pacing and drain behavior are exercised end to end.
#[derive(Debug, Clone)]
pub struct DemoTask {
    mean_latency: Duration,
    jitter: Duration,
    failure_rate: f64,
}

impl DemoTask {
    /// Creates a demo task. `failure_rate` is clamped to [0, 1].
    pub fn new(mean_latency: Duration, jitter: Duration, failure_rate: f64) -> Self {
        Self {
            mean_latency,
            jitter,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for DemoTask {
    fn default() -> Self {
        Self::new(Duration::from_millis(10), Duration::from_millis(5), 0.0)
    }
}

#[async_trait]
impl TaskLifecycle for DemoTask {
    async fn execute(&self, _iteration: u64) -> TaskResult {
        let (sleep_for, failed) = {
            let mut rng = rand::thread_rng();
            let jitter_nanos = self.jitter.as_nanos() as i128;
            let offset: i128 = if jitter_nanos > 0 {
                rng.gen_range(-jitter_nanos..=jitter_nanos)
            } else {
                0
            };
            let nanos = (self.mean_latency.as_nanos() as i128 + offset).max(0) as u64;
            let failed = self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate);
            (Duration::from_nanos(nanos), failed)
        };

        tokio::time::sleep(sleep_for).await;
        if failed {
            TaskResult::failure(sleep_for, "simulated failure")
        } else {
            TaskResult::success(sleep_for)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_result_accessors() {
        let ok = TaskResult::success(Duration::from_millis(3));
        assert!(ok.is_success());
        assert_eq!(ok.latency(), Duration::from_millis(3));
        assert_eq!(ok.cause(), None);

        let err = TaskResult::failure(Duration::from_millis(7), "boom");
        assert!(!err.is_success());
        assert_eq!(err.latency(), Duration::from_millis(7));
        assert_eq!(err.cause(), Some("boom"));
    }

    #[tokio::test]
    async fn test_fn_task_executes_closure() {
        let task = FnTask::new(|iteration| async move {
            if iteration % 2 == 0 {
                TaskResult::success(Duration::from_millis(1))
            } else {
                TaskResult::failure(Duration::from_millis(1), "odd")
            }
        });

        assert!(task.execute(0).await.is_success());
        assert!(!task.execute(1).await.is_success());
    }

    #[tokio::test]
    async fn test_demo_task_always_fails_at_rate_one() {
        let task = DemoTask::new(Duration::from_millis(1), Duration::ZERO, 1.0);
        for i in 0..5 {
            assert!(!task.execute(i).await.is_success());
        }
    }

    #[tokio::test]
    async fn test_demo_task_never_fails_at_rate_zero() {
        let task = DemoTask::new(Duration::from_millis(1), Duration::ZERO, 0.0);
        for i in 0..5 {
            assert!(task.execute(i).await.is_success());
        }
    }

    #[tokio::test]
    async fn test_default_lifecycle_hooks_are_noops() {
        let task = DemoTask::default();
        assert!(task.init().await.is_ok());
        assert!(task.teardown().await.is_ok());
    }
}
