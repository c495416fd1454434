//! Metrics exporters.
//!
//! An exporter consumes periodic [`AggregatedMetrics`] snapshots plus the
//! [`RunContext`] and ships them somewhere: the console, a JSON-lines
//! stream, or an integration of the consumer's own. Exporter errors are
//! isolated by the reporter — logged with structured context and counted,
//! never allowed to stop the run. The affected snapshot is simply dropped
//! for that exporter.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::metrics::{AggregatedMetrics, RunContext};

/// Error type exporters may surface; the reporter logs and counts it.
pub type ExportError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer of periodic metric snapshots.
#[async_trait]
pub trait MetricsExporter: Send + Sync {
    /// Short name used in logs when this exporter misbehaves.
    fn name(&self) -> &str;

    /// Delivers one snapshot. Called periodically and once at end of run.
    async fn export(
        &self,
        snapshot: &AggregatedMetrics,
        context: &RunContext,
    ) -> Result<(), ExportError>;
}

// ============================================================================
// Console Exporter
// ============================================================================

/// Human-readable console output: one progress line per snapshot.
#[derive(Debug, Default)]
pub struct ConsoleExporter;

impl ConsoleExporter {
    /// Creates a console exporter.
    pub fn new() -> Self {
        Self
    }

    fn format_line(snapshot: &AggregatedMetrics) -> String {
        let mut line = format!(
            "executions={} ok={} failed={} dropped={} failure_rate={:.2}%",
            snapshot.total_executions,
            snapshot.total_successes,
            snapshot.total_failures,
            snapshot.dropped_submissions,
            snapshot.failure_rate * 100.0,
        );
        for p in &snapshot.percentiles {
            line.push_str(&format!(
                " p{:.1}={:?}",
                p.percentile * 100.0,
                p.latency
            ));
        }
        line.push_str(&format!(" mean={:?}", snapshot.latency.mean));
        line
    }
}

#[async_trait]
impl MetricsExporter for ConsoleExporter {
    fn name(&self) -> &str {
        "console"
    }

    async fn export(
        &self,
        snapshot: &AggregatedMetrics,
        context: &RunContext,
    ) -> Result<(), ExportError> {
        println!("[{}] {}", context.run_id, Self::format_line(snapshot));
        Ok(())
    }
}

// ============================================================================
// JSON Lines Exporter
// ============================================================================

/// Machine-readable output: one JSON object per snapshot on a writer.
pub struct JsonLinesExporter {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl JsonLinesExporter {
    /// Creates an exporter writing to the given sink.
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Creates an exporter writing to standard output.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

#[async_trait]
impl MetricsExporter for JsonLinesExporter {
    fn name(&self) -> &str {
        "json-lines"
    }

    async fn export(
        &self,
        snapshot: &AggregatedMetrics,
        context: &RunContext,
    ) -> Result<(), ExportError> {
        let record = serde_json::json!({
            "run_id": context.run_id,
            "started_at": context.started_at,
            "hostname": context.system.hostname,
            "metrics": snapshot,
        });
        let line = serde_json::to_string(&record)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for JsonLinesExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesExporter").finish_non_exhaustive()
    }
}
