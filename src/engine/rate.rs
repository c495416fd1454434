//! Submission pacing.
//!
//! [`RateController`] converts a target TPS into inter-submission timing.
//! It keeps a single `next_submission` instant owned by the submission loop
//! (no synchronization needed) and sleeps until it, waking early when
//! shutdown fires. The target may change on every call; the controller never
//! tries to make up for historical undershoot, which bounds lag when an
//! adaptive pattern steps sharply.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::gauges::EngineGauges;

/// Outcome of one pacing wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The scheduled instant arrived; submit now.
    Proceed,
    /// The pattern signaled terminal (target TPS <= 0).
    Stop,
    /// Shutdown fired while waiting.
    Shutdown,
}

/// Paces submissions to a moving target TPS.
pub struct RateController {
    next_submission: Option<Instant>,
    started: Instant,
    submissions: u64,
    cancel: CancellationToken,
    gauges: Arc<EngineGauges>,
}

impl RateController {
    /// Creates a controller interruptible by `cancel`.
    pub fn new(cancel: CancellationToken, gauges: Arc<EngineGauges>) -> Self {
        Self {
            next_submission: None,
            started: Instant::now(),
            submissions: 0,
            cancel,
            gauges,
        }
    }

    /// Blocks until the next submission is due under `target_tps`.
    pub async fn wait_for_next(&mut self, target_tps: f64) -> Wait {
        if target_tps <= 0.0 {
            return Wait::Stop;
        }

        let interval = Duration::from_secs_f64(1.0 / target_tps);
        let now = Instant::now();
        let base = self.next_submission.map_or(now, |at| at.max(now));
        let due = base + interval;
        self.next_submission = Some(due);

        tokio::select! {
            _ = self.cancel.cancelled() => return Wait::Shutdown,
            _ = tokio::time::sleep_until(due) => {}
        }

        self.submissions += 1;
        self.publish_accuracy(target_tps);
        Wait::Proceed
    }

    /// Total submissions released so far.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    fn publish_accuracy(&self, target_tps: f64) {
        self.gauges.target_tps.set(target_tps);
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let actual = self.submissions as f64 / elapsed;
            self.gauges.actual_tps.set(actual);
            self.gauges
                .tps_error
                .set((actual - target_tps).abs() / target_tps);
        }
    }
}

impl std::fmt::Debug for RateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateController")
            .field("submissions", &self.submissions)
            .field("next_submission", &self.next_submission)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    fn controller() -> RateController {
        RateController::new(CancellationToken::new(), Arc::new(EngineGauges::new()))
    }

    #[tokio::test]
    async fn test_zero_target_is_terminal() {
        let mut rate = controller();
        assert_eq!(rate.wait_for_next(0.0).await, Wait::Stop);
        assert_eq!(rate.wait_for_next(-5.0).await, Wait::Stop);
        assert_eq!(rate.submissions(), 0);
    }

    #[tokio::test]
    async fn test_paces_to_target() {
        let mut rate = controller();
        let start = StdInstant::now();
        for _ in 0..10 {
            assert_eq!(rate.wait_for_next(100.0).await, Wait::Proceed);
        }
        let elapsed = start.elapsed();
        // 10 submissions at 100 TPS is ~100 ms of schedule.
        assert!(
            elapsed >= Duration::from_millis(90),
            "paced too fast: {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_millis(400),
            "paced too slow: {elapsed:?}"
        );
        assert_eq!(rate.submissions(), 10);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_wait() {
        let cancel = CancellationToken::new();
        let mut rate = RateController::new(cancel.clone(), Arc::new(EngineGauges::new()));

        let waiter = tokio::spawn(async move { rate.wait_for_next(0.1).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let outcome = waiter.await.unwrap();
        assert_eq!(outcome, Wait::Shutdown);
    }

    #[tokio::test]
    async fn test_target_change_does_not_compensate() {
        let mut rate = controller();
        // A slow first target must not cause a burst when the target jumps.
        assert_eq!(rate.wait_for_next(20.0).await, Wait::Proceed);
        let start = StdInstant::now();
        assert_eq!(rate.wait_for_next(1000.0).await, Wait::Proceed);
        let gap = start.elapsed();
        assert!(
            gap < Duration::from_millis(50),
            "new target should take effect immediately: {gap:?}"
        );
    }

    #[tokio::test]
    async fn test_accuracy_gauges_published() {
        let gauges = Arc::new(EngineGauges::new());
        let mut rate = RateController::new(CancellationToken::new(), gauges.clone());
        for _ in 0..5 {
            rate.wait_for_next(200.0).await;
        }
        assert_eq!(gauges.target_tps.get(), 200.0);
        assert!(gauges.actual_tps.get() > 0.0);
        assert!(gauges.tps_error.get() >= 0.0);
    }
}
