//! Read-only metrics capability consumed by the adaptive controller.
//!
//! The controller must never own the collector it reads from; it sees the
//! feedback channel only through [`MetricsProvider`]. The production
//! implementation, [`CachedMetricsProvider`], amortizes snapshot cost with a
//! short TTL cache so a controller polling every tick does not hammer the
//! histogram lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::metrics::collector::{MetricsCollector, SnapshotScratch};

/// Default TTL for the cached view.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(100);

/// Default trailing window captured with each cached view.
pub const DEFAULT_RECENT_WINDOW: Duration = Duration::from_secs(10);

/// Read-only view of the live failure signals.
pub trait MetricsProvider: Send + Sync {
    /// Lifetime failure fraction in [0, 1].
    fn failure_rate(&self) -> f64;

    /// Failure fraction over the trailing `window`.
    fn recent_failure_rate(&self, window: Duration) -> f64;

    /// Total executions recorded so far.
    fn total_executions(&self) -> u64;
}

/// Cached view published atomically on refresh.
struct CachedView {
    failure_rate: f64,
    recent_failure_rate: f64,
    total_executions: u64,
    expires_at: Instant,
}

/// TTL-cached adapter over [`MetricsCollector`].
///
/// Reads within the TTL reuse the cached view. On a read past expiry,
/// exactly one racer recomputes and publishes; concurrent readers see the
/// old view or the new one, never a torn value.
pub struct CachedMetricsProvider {
    collector: Arc<MetricsCollector>,
    ttl: Duration,
    recent_window: Duration,
    cached: ArcSwap<CachedView>,
    refreshing: AtomicBool,
    scratch: parking_lot::Mutex<SnapshotScratch>,
}

impl CachedMetricsProvider {
    /// Creates a provider with the default 100 ms TTL.
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self::with_ttl(collector, DEFAULT_CACHE_TTL)
    }

    /// Creates a provider with a custom TTL.
    pub fn with_ttl(collector: Arc<MetricsCollector>, ttl: Duration) -> Self {
        let initial = CachedView {
            failure_rate: 0.0,
            recent_failure_rate: 0.0,
            total_executions: 0,
            // Born expired so the first read observes real data.
            expires_at: Instant::now() - Duration::from_nanos(1),
        };
        Self {
            collector,
            ttl,
            recent_window: DEFAULT_RECENT_WINDOW,
            cached: ArcSwap::from_pointee(initial),
            refreshing: AtomicBool::new(false),
            scratch: parking_lot::Mutex::new(SnapshotScratch::new()),
        }
    }

    /// Sets the trailing window captured with each cached view.
    pub fn with_recent_window(mut self, window: Duration) -> Self {
        self.recent_window = window;
        self
    }

    fn view(&self) -> Arc<CachedView> {
        let current = self.cached.load_full();
        if Instant::now() < current.expires_at {
            return current;
        }

        // Double-checked refresh claim: one racer computes, the rest keep
        // serving the previous view.
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return current;
        }

        let fresh = {
            let mut scratch = self.scratch.lock();
            let snapshot = self.collector.snapshot_with(&mut scratch);
            CachedView {
                failure_rate: snapshot.failure_rate,
                recent_failure_rate: self.collector.recent_failure_rate(self.recent_window),
                total_executions: snapshot.total_executions,
                expires_at: Instant::now() + self.ttl,
            }
        };
        let fresh = Arc::new(fresh);
        self.cached.store(fresh.clone());
        self.refreshing.store(false, Ordering::Release);
        fresh
    }
}

impl MetricsProvider for CachedMetricsProvider {
    fn failure_rate(&self) -> f64 {
        self.view().failure_rate
    }

    fn recent_failure_rate(&self, window: Duration) -> f64 {
        if window == self.recent_window {
            self.view().recent_failure_rate
        } else {
            // Ad-hoc windows bypass the cache; the ring itself is lock-free.
            self.collector.recent_failure_rate(window)
        }
    }

    fn total_executions(&self) -> u64 {
        self.view().total_executions
    }
}

impl std::fmt::Debug for CachedMetricsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedMetricsProvider")
            .field("ttl", &self.ttl)
            .field("recent_window", &self.recent_window)
            .finish_non_exhaustive()
    }
}
