//! Metrics pipeline invariants under concurrent load.

use std::sync::Arc;
use std::time::Duration;

use vajrapulse::metrics::{
    CachedMetricsProvider, MetricsCollector, MetricsProvider, SnapshotScratch,
};

#[tokio::test]
async fn test_counts_balance_under_concurrent_writers() {
    let collector = Arc::new(MetricsCollector::new("invariants"));
    let mut handles = Vec::new();
    for worker in 0..8 {
        let collector = collector.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..1000u64 {
                if (worker + i) % 10 == 0 {
                    collector.record_failure(Duration::from_millis(5), "injected");
                } else {
                    collector.record_success(Duration::from_millis(1));
                }
            }
        }));
    }

    // Snapshot while writers are racing: the balance invariant must hold
    // at every observation point.
    let mut scratch = SnapshotScratch::new();
    for _ in 0..20 {
        let snap = collector.snapshot_with(&mut scratch);
        assert_eq!(
            snap.total_successes + snap.total_failures,
            snap.total_executions
        );
        assert!((0.0..=1.0).contains(&snap.failure_rate));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    for handle in handles {
        handle.await.unwrap();
    }
    let snap = collector.snapshot();
    assert_eq!(snap.total_executions, 8000);
    assert_eq!(snap.total_failures, 800);
}

#[tokio::test]
async fn test_snapshots_are_monotone_from_one_reader() {
    let collector = Arc::new(MetricsCollector::new("monotone"));
    let writer = {
        let collector = collector.clone();
        tokio::spawn(async move {
            for _ in 0..2000 {
                collector.record_success(Duration::from_micros(10));
                tokio::task::yield_now().await;
            }
        })
    };

    let mut scratch = SnapshotScratch::new();
    let mut last = 0;
    for _ in 0..50 {
        let total = collector.snapshot_with(&mut scratch).total_executions;
        assert!(total >= last, "total went backwards: {last} -> {total}");
        last = total;
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
}

#[tokio::test]
async fn test_cached_provider_ttl_boundary() {
    let collector = Arc::new(MetricsCollector::new("ttl"));
    let provider =
        CachedMetricsProvider::with_ttl(collector.clone(), Duration::from_millis(80));

    collector.record_success(Duration::from_millis(1));
    let first = provider.total_executions();
    collector.record_success(Duration::from_millis(1));

    // Within the TTL both reads serve the same cached view.
    let second = provider.total_executions();
    assert_eq!(first, second);

    // Past the TTL a fresher view appears.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let third = provider.total_executions();
    assert_eq!(third, 2);
}

#[tokio::test]
async fn test_recent_window_tracks_failure_bursts() {
    let collector = Arc::new(MetricsCollector::new("recent"));
    for _ in 0..50 {
        collector.record_success(Duration::from_millis(1));
    }
    assert_eq!(collector.recent_failure_rate(Duration::from_secs(5)), 0.0);

    for _ in 0..50 {
        collector.record_failure(Duration::from_millis(1), "burst");
    }
    let rate = collector.recent_failure_rate(Duration::from_secs(5));
    assert!(
        (rate - 0.5).abs() < 0.05,
        "burst should show in the recent window: {rate}"
    );
}
