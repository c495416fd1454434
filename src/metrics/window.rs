//! Bounded recent-window failure tracking.
//!
//! [`RecentWindow`] maintains a ring of per-second buckets with atomic
//! success/failure counters, giving a lock-free failure fraction over the
//! last N seconds. The adaptive controller uses this to judge recovery
//! readiness without being skewed by failures from minutes ago.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default ring capacity in seconds.
pub const DEFAULT_WINDOW_CAPACITY_SECS: usize = 60;

struct Bucket {
    /// The elapsed-second this bucket currently represents.
    epoch: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl Bucket {
    fn new() -> Self {
        Self {
            epoch: AtomicU64::new(u64::MAX),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

/// Ring of time-bucketed counters for recent failure-rate queries.
pub struct RecentWindow {
    buckets: Vec<Bucket>,
    start: Instant,
}

impl RecentWindow {
    /// Creates a window able to answer queries up to `capacity_secs` back.
    pub fn new(capacity_secs: usize) -> Self {
        let capacity = capacity_secs.max(1);
        Self {
            buckets: (0..capacity).map(|_| Bucket::new()).collect(),
            start: Instant::now(),
        }
    }

    /// Records one outcome into the current second's bucket.
    pub fn record(&self, success: bool) {
        let sec = self.start.elapsed().as_secs();
        let bucket = &self.buckets[(sec as usize) % self.buckets.len()];

        let seen = bucket.epoch.load(Ordering::Acquire);
        if seen != sec {
            // The winning racer rotates the bucket; losing racers in the same
            // instant may land a sample before the reset. Loss is bounded to
            // one bucket turnover.
            if bucket
                .epoch
                .compare_exchange(seen, sec, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                bucket.successes.store(0, Ordering::Release);
                bucket.failures.store(0, Ordering::Release);
            }
        }

        if success {
            bucket.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            bucket.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Failure fraction over the trailing `window`.
    ///
    /// Returns 0.0 when nothing was recorded in the window. Windows longer
    /// than the ring capacity are clamped to the capacity.
    pub fn failure_rate(&self, window: Duration) -> f64 {
        let now_sec = self.start.elapsed().as_secs();
        let span = (window.as_secs().max(1)).min(self.buckets.len() as u64);
        let oldest = now_sec.saturating_sub(span - 1);

        let mut successes = 0u64;
        let mut failures = 0u64;
        for bucket in &self.buckets {
            let epoch = bucket.epoch.load(Ordering::Acquire);
            if epoch >= oldest && epoch <= now_sec {
                successes += bucket.successes.load(Ordering::Relaxed);
                failures += bucket.failures.load(Ordering::Relaxed);
            }
        }

        let total = successes + failures;
        if total == 0 {
            0.0
        } else {
            failures as f64 / total as f64
        }
    }
}

impl std::fmt::Debug for RecentWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecentWindow")
            .field("capacity_secs", &self.buckets.len())
            .finish()
    }
}

impl Default for RecentWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_rate_is_zero() {
        let window = RecentWindow::new(10);
        assert_eq!(window.failure_rate(Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn test_mixed_outcomes_fraction() {
        let window = RecentWindow::new(10);
        for _ in 0..3 {
            window.record(true);
        }
        window.record(false);
        let rate = window.failure_rate(Duration::from_secs(5));
        assert!((rate - 0.25).abs() < 1e-9, "rate was {rate}");
    }

    #[test]
    fn test_all_failures() {
        let window = RecentWindow::new(10);
        for _ in 0..4 {
            window.record(false);
        }
        assert_eq!(window.failure_rate(Duration::from_secs(5)), 1.0);
    }

    #[tokio::test]
    async fn test_old_samples_age_out() {
        let window = RecentWindow::new(4);
        for _ in 0..10 {
            window.record(false);
        }
        // After the failures fall outside a 1-second query window, fresh
        // successes dominate.
        tokio::time::sleep(Duration::from_millis(2100)).await;
        window.record(true);
        window.record(true);
        let rate = window.failure_rate(Duration::from_secs(1));
        assert_eq!(rate, 0.0, "stale failures should have aged out");
    }

    #[test]
    fn test_window_longer_than_capacity_is_clamped() {
        let window = RecentWindow::new(2);
        window.record(false);
        let rate = window.failure_rate(Duration::from_secs(3600));
        assert_eq!(rate, 1.0);
    }
}
