//! Steps with a single fixed behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use batchflow_core::{BoxError, Step, StepExecution};

/// Step that always fails.
#[derive(Debug)]
pub struct FailingStep {
    name: String,
    executions: AtomicUsize,
}

impl FailingStep {
    /// Creates a failing step.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executions: AtomicUsize::new(0),
        }
    }

    /// Returns how many times the step ran.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for FailingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _execution: &mut StepExecution) -> Result<(), BoxError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Err(format!("step '{}' failed", self.name).into())
    }
}

/// Step that sleeps, then completes.
///
/// It does not look at stop requests, which makes it useful to check that
/// running work is never interrupted.
#[derive(Debug)]
pub struct SleepStep {
    name: String,
    duration: Duration,
    executions: AtomicUsize,
}

impl SleepStep {
    /// Creates a step sleeping for `duration`.
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            executions: AtomicUsize::new(0),
        }
    }

    /// Returns how many times the step ran.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for SleepStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _execution: &mut StepExecution) -> Result<(), BoxError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

/// Step that completes and asks the job to stop.
#[derive(Debug)]
pub struct TerminateOnlyStep {
    name: String,
    executions: AtomicUsize,
}

impl TerminateOnlyStep {
    /// Creates a terminating step.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executions: AtomicUsize::new(0),
        }
    }

    /// Returns how many times the step ran.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for TerminateOnlyStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, execution: &mut StepExecution) -> Result<(), BoxError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        execution.set_terminate_only();
        Ok(())
    }
}
