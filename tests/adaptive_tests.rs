//! End-to-end closed-loop scenarios: the adaptive pattern driving a live
//! engine through its metrics feedback channel.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{AlwaysFailingTask, CountingTask};
use parking_lot::Mutex;
use vajrapulse::engine::{EngineState, ExecutionEngine};
use vajrapulse::metrics::{CachedMetricsProvider, FixedBackpressure, MetricsCollector};
use vajrapulse::pattern::{
    AdaptiveConfig, AdaptiveLoadPattern, AdaptivePhase, LoadPattern, PhaseListener,
};

/// Records every phase transition and the highest rate ever selected.
#[derive(Default)]
struct PhaseRecorder {
    transitions: Mutex<Vec<(AdaptivePhase, AdaptivePhase)>>,
    max_tps: Mutex<f64>,
}

impl PhaseListener for PhaseRecorder {
    fn on_phase_change(&self, from: AdaptivePhase, to: AdaptivePhase, _tps: f64) {
        self.transitions.lock().push((from, to));
    }

    fn on_tps_adjustment(&self, _old_tps: f64, new_tps: f64, _phase: AdaptivePhase) {
        let mut max = self.max_tps.lock();
        if new_tps > *max {
            *max = new_tps;
        }
    }
}

fn fast_config() -> AdaptiveConfig {
    AdaptiveConfig::builder()
        .initial_tps(10.0)
        .min_tps(1.0)
        .max_tps(100.0)
        .ramp_increment(10.0)
        .ramp_decrement(30.0)
        .ramp_interval(Duration::from_millis(200))
        .sustain_duration(Duration::from_secs(1))
        .stable_intervals_required(2)
        .build()
        .unwrap()
}

fn wire_engine(
    config: AdaptiveConfig,
    task: Arc<dyn vajrapulse::task::TaskLifecycle>,
    backpressure: Option<f64>,
) -> (ExecutionEngine, Arc<PhaseRecorder>) {
    let collector = Arc::new(MetricsCollector::new("adaptive-e2e"));
    let provider = Arc::new(CachedMetricsProvider::with_ttl(
        collector.clone(),
        Duration::from_millis(50),
    ));
    let mut pattern = AdaptiveLoadPattern::new(config, provider);
    if let Some(value) = backpressure {
        pattern = pattern.with_backpressure(Arc::new(FixedBackpressure::new(value)));
    }

    let recorder = Arc::new(PhaseRecorder::default());
    if let Some(events) = pattern.adaptive_events() {
        events.register_listener(recorder.clone());
    }

    let engine = ExecutionEngine::builder()
        .task(task)
        .pattern(Arc::new(pattern))
        .metrics_collector(collector)
        .build()
        .unwrap();
    (engine, recorder)
}

#[tokio::test]
async fn test_happy_path_ramps_to_max_sustains_then_completes() {
    let (engine, recorder) = wire_engine(fast_config(), CountingTask::new(), None);

    let start = Instant::now();
    let report = engine.run().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(report.total_executions > 0);
    assert_eq!(report.failure_rate, 0.0);

    let transitions = recorder.transitions.lock().clone();
    assert!(
        transitions.contains(&(AdaptivePhase::RampUp, AdaptivePhase::Sustain)),
        "expected ramp-up to sustain, saw {transitions:?}"
    );
    assert!(
        transitions.contains(&(AdaptivePhase::Sustain, AdaptivePhase::Complete)),
        "expected sustain to complete, saw {transitions:?}"
    );
    assert_eq!(*recorder.max_tps.lock(), 100.0, "should have reached max");

    // 9 increments at 200ms plus 1s of sustain, with scheduling slack.
    assert!(
        elapsed < Duration::from_secs(6),
        "closed loop took too long: {elapsed:?}"
    );
}

#[tokio::test]
async fn test_heavy_backpressure_pins_rate_and_completes() {
    let (engine, recorder) = wire_engine(fast_config(), CountingTask::new(), Some(0.9));

    let start = Instant::now();
    engine.run().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(engine.state(), EngineState::Stopped);
    // The first decision already sees saturation: the rate never exceeds
    // the starting rate plus one increment.
    assert!(
        *recorder.max_tps.lock() <= 20.0,
        "backpressure should cap the rate, saw {}",
        *recorder.max_tps.lock()
    );
    let transitions = recorder.transitions.lock().clone();
    assert!(
        transitions.contains(&(AdaptivePhase::RampUp, AdaptivePhase::RampDown)),
        "expected an early ramp-down, saw {transitions:?}"
    );
    assert!(
        transitions
            .iter()
            .any(|(_, to)| *to == AdaptivePhase::Complete),
        "run should end in the terminal phase, saw {transitions:?}"
    );
    assert!(
        elapsed < Duration::from_secs(5),
        "pinned run should finish once the sustain budget lapses: {elapsed:?}"
    );
}

#[tokio::test]
async fn test_failing_task_drives_rate_to_minimum() {
    let (engine, recorder) = wire_engine(fast_config(), Arc::new(AlwaysFailingTask), None);
    engine.run().await.unwrap();

    let transitions = recorder.transitions.lock().clone();
    assert!(
        transitions.contains(&(AdaptivePhase::RampUp, AdaptivePhase::RampDown)),
        "failures should force a ramp-down, saw {transitions:?}"
    );
    // Decrement 30 from anywhere <= 20 lands on the floor immediately.
    assert!(*recorder.max_tps.lock() <= 20.0);
}

#[test]
fn test_pattern_exposes_canonical_config() {
    let config = fast_config();
    let collector = Arc::new(MetricsCollector::new("config-law"));
    let provider = Arc::new(CachedMetricsProvider::new(collector));
    let pattern = AdaptiveLoadPattern::new(config, provider);
    assert_eq!(*pattern.config(), config);
    assert_eq!(pattern.total_duration(), None);
}
