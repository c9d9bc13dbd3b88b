//! Stub step.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use batchflow_core::{BoxError, ExitStatus, Step, StepCounters, StepExecution};

/// Step that completes without doing any work.
#[derive(Debug)]
pub struct StubStep {
    name: String,
    exit_code: Option<String>,
    counters: StepCounters,
    start_limit: u32,
    allow_start_if_complete: bool,
    executions: AtomicUsize,
}

impl StubStep {
    /// Creates a stub step.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exit_code: None,
            counters: StepCounters::default(),
            start_limit: u32::MAX,
            allow_start_if_complete: false,
            executions: AtomicUsize::new(0),
        }
    }

    /// Sets the exit code the step leaves on its execution.
    pub fn with_exit_code(mut self, exit_code: impl Into<String>) -> Self {
        self.exit_code = Some(exit_code.into());
        self
    }

    /// Sets the counters added to every execution.
    pub fn with_counters(mut self, counters: StepCounters) -> Self {
        self.counters = counters;
        self
    }

    /// Sets the start limit.
    pub fn with_start_limit(mut self, start_limit: u32) -> Self {
        self.start_limit = start_limit;
        self
    }

    /// Lets the step run again after it completed.
    pub fn with_allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    /// Returns how many times the step ran.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for StubStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn allow_start_if_complete(&self) -> bool {
        self.allow_start_if_complete
    }

    fn start_limit(&self) -> u32 {
        self.start_limit
    }

    async fn execute(&self, execution: &mut StepExecution) -> Result<(), BoxError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        *execution.counters_mut() += self.counters;
        if let Some(exit_code) = &self.exit_code {
            execution.set_exit_status(ExitStatus::new(exit_code.clone()));
        }
        Ok(())
    }
}
