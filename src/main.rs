//! VajraPulse - adaptive load generation.
//!
//! This is the main entry point for the VajraPulse CLI. It wires a demo
//! task (simulated latency and failure rate) into the execution engine;
//! real workloads use the library API and supply their own
//! [`TaskLifecycle`](vajrapulse::task::TaskLifecycle).

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vajrapulse::cli::Cli;
use vajrapulse::config::{PatternKind, RunConfig};
use vajrapulse::engine::ExecutionEngine;
use vajrapulse::export::{ConsoleExporter, JsonLinesExporter};
use vajrapulse::metrics::{CachedMetricsProvider, MetricsCollector, RunContext};
use vajrapulse::pattern::{
    AdaptiveLoadPattern, LoadPattern, RampUpLoad, RampUpSustainLoad, StaticLoad,
};
use vajrapulse::task::DemoTask;
use vajrapulse::Error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run(&cli).await {
        Ok(()) => 0,
        Err(error) => {
            tracing::error!(%error, "run failed");
            eprintln!("vajrapulse: {error}");
            error.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: &Cli) -> vajrapulse::Result<()> {
    let mut config = RunConfig::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    config.validate()?;

    let context = RunContext::generate();
    let collector = Arc::new(MetricsCollector::with_percentiles(
        context.run_id.clone(),
        &config.thresholds.percentiles,
    )?);

    let pattern: Arc<dyn LoadPattern> = match config.load_pattern {
        PatternKind::Static => Arc::new(StaticLoad::new(config.tps, config.duration)),
        PatternKind::RampUp => Arc::new(RampUpLoad::new(
            0.0,
            config.tps,
            config.ramp_duration,
            config.duration,
        )),
        PatternKind::RampSustain => Arc::new(RampUpSustainLoad::new(
            config.tps,
            config.ramp_duration,
            config.sustain_duration,
        )),
        PatternKind::Adaptive => {
            let provider = Arc::new(CachedMetricsProvider::new(collector.clone()));
            Arc::new(
                AdaptiveLoadPattern::new(config.adaptive_config()?, provider)
                    .with_policy(Arc::new(config.ramp_policy())),
            )
        }
    };

    let task = Arc::new(DemoTask::new(
        cli.task_latency,
        cli.task_jitter,
        cli.task_failure_rate,
    ));

    let mut builder = ExecutionEngine::builder()
        .task(task)
        .pattern(pattern)
        .metrics_collector(collector)
        .run_context(context)
        .shutdown_config(config.shutdown_config())
        .report_interval(config.report_interval)
        .exporter(Arc::new(ConsoleExporter::new()))
        .install_signal_handler(true);
    if cli.json {
        builder = builder.exporter(Arc::new(JsonLinesExporter::stdout()));
    }
    let engine = builder.build()?;

    let report = engine.run().await?;
    println!("\n{}", report.summary_text());

    if report.total_executions == 0 && report.dropped_submissions > 0 {
        return Err(Error::Internal(
            "every submission was dropped before execution".to_string(),
        ));
    }
    Ok(())
}

/// Initialize logging based on verbosity level.
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}
