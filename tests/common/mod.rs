//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vajrapulse::task::{TaskError, TaskLifecycle, TaskResult};

/// Task that succeeds instantly and counts lifecycle calls.
#[derive(Debug, Default)]
pub struct CountingTask {
    pub inits: AtomicU64,
    pub executions: AtomicU64,
    pub teardowns: AtomicU64,
}

impl CountingTask {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TaskLifecycle for CountingTask {
    async fn init(&self) -> Result<(), TaskError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, _iteration: u64) -> TaskResult {
        self.executions.fetch_add(1, Ordering::SeqCst);
        TaskResult::success(Duration::from_micros(100))
    }

    async fn teardown(&self) -> Result<(), TaskError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Task that always fails.
#[derive(Debug, Default)]
pub struct AlwaysFailingTask;

#[async_trait]
impl TaskLifecycle for AlwaysFailingTask {
    async fn execute(&self, _iteration: u64) -> TaskResult {
        TaskResult::failure(Duration::from_millis(1), "injected failure")
    }
}

/// Task that sleeps for a fixed time before succeeding.
#[derive(Debug)]
pub struct SleepingTask {
    pub sleep: Duration,
}

impl SleepingTask {
    pub fn new(sleep: Duration) -> Arc<Self> {
        Arc::new(Self { sleep })
    }
}

#[async_trait]
impl TaskLifecycle for SleepingTask {
    async fn execute(&self, _iteration: u64) -> TaskResult {
        tokio::time::sleep(self.sleep).await;
        TaskResult::success(self.sleep)
    }
}
