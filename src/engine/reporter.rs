//! Periodic snapshot fan-out to exporters.
//!
//! The reporter is a background task that pulls a collector snapshot on an
//! interval and delivers it to every registered exporter, plus once more at
//! end of run. A failing exporter loses that snapshot and nothing else.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::export::MetricsExporter;
use crate::metrics::{MetricsCollector, RunContext, SnapshotScratch};

use super::gauges::EngineGauges;

/// Default interval between periodic exports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Interval-driven exporter fan-out.
pub struct MetricsReporter {
    collector: Arc<MetricsCollector>,
    context: RunContext,
    exporters: Vec<Arc<dyn MetricsExporter>>,
    interval: Duration,
    cancel: CancellationToken,
    gauges: Arc<EngineGauges>,
}

impl MetricsReporter {
    /// Creates a reporter; `cancel` ends the loop and triggers the final
    /// export.
    pub fn new(
        collector: Arc<MetricsCollector>,
        context: RunContext,
        exporters: Vec<Arc<dyn MetricsExporter>>,
        interval: Duration,
        cancel: CancellationToken,
        gauges: Arc<EngineGauges>,
    ) -> Self {
        Self {
            collector,
            context,
            exporters,
            interval,
            cancel,
            gauges,
        }
    }

    /// Runs until cancelled, then performs the end-of-run export.
    pub async fn run(self) {
        // Each reporter owns its scratch; snapshots at interval frequency
        // reuse the same buffer.
        let mut scratch = SnapshotScratch::new();
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; skip it so the first
        // export carries real data.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let snapshot = self.collector.snapshot_with(&mut scratch);
                    self.fan_out(&snapshot).await;
                }
                _ = self.cancel.cancelled() => {
                    let snapshot = self.collector.snapshot_with(&mut scratch);
                    self.fan_out(&snapshot).await;
                    return;
                }
            }
        }
    }

    async fn fan_out(&self, snapshot: &crate::metrics::AggregatedMetrics) {
        for exporter in &self.exporters {
            if let Err(error) = exporter.export(snapshot, &self.context).await {
                self.gauges.exporter_errors.inc();
                warn!(
                    exporter = exporter.name(),
                    run_id = %self.context.run_id,
                    %error,
                    "exporter failed; snapshot dropped for this exporter"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportError;
    use crate::metrics::AggregatedMetrics;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingExporter {
        calls: AtomicU64,
        fail: bool,
    }

    #[async_trait]
    impl MetricsExporter for CountingExporter {
        fn name(&self) -> &str {
            "counting"
        }

        async fn export(
            &self,
            _snapshot: &AggregatedMetrics,
            _context: &RunContext,
        ) -> Result<(), ExportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("export sink unavailable".into())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_reporter_exports_periodically_and_at_end() {
        let collector = Arc::new(MetricsCollector::new("reporter-test"));
        let exporter = Arc::new(CountingExporter {
            calls: AtomicU64::new(0),
            fail: false,
        });
        let cancel = CancellationToken::new();
        let reporter = MetricsReporter::new(
            collector,
            RunContext::generate(),
            vec![exporter.clone()],
            Duration::from_millis(30),
            cancel.clone(),
            Arc::new(EngineGauges::new()),
        );

        let handle = tokio::spawn(reporter.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let calls = exporter.calls.load(Ordering::SeqCst);
        // At least two periodic exports plus the final one.
        assert!(calls >= 3, "expected >= 3 exports, got {calls}");
    }

    #[tokio::test]
    async fn test_exporter_failure_is_counted_and_isolated() {
        let collector = Arc::new(MetricsCollector::new("reporter-err"));
        let failing = Arc::new(CountingExporter {
            calls: AtomicU64::new(0),
            fail: true,
        });
        let healthy = Arc::new(CountingExporter {
            calls: AtomicU64::new(0),
            fail: false,
        });
        let cancel = CancellationToken::new();
        let gauges = Arc::new(EngineGauges::new());
        let reporter = MetricsReporter::new(
            collector,
            RunContext::generate(),
            vec![failing.clone(), healthy.clone()],
            Duration::from_secs(3600),
            cancel.clone(),
            gauges.clone(),
        );

        let handle = tokio::spawn(reporter.run());
        cancel.cancel();
        handle.await.unwrap();

        // The final export ran for both despite the first one failing.
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gauges.exporter_errors.get(), 1);
    }
}
