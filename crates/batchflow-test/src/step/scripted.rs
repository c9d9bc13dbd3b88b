//! Step playing back scripted outcomes.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use batchflow_core::{BoxError, ExitStatus, Step, StepExecution};

#[derive(Debug, Clone)]
enum Outcome {
    Complete,
    Exit(String),
    Fail(String),
    Terminate,
}

/// Step whose executions follow a script, one outcome per run.
///
/// Once the script is exhausted the step completes. Useful for restart
/// scenarios where a step fails on the first run and succeeds on the next.
#[derive(Debug)]
pub struct ScriptedStep {
    name: String,
    script: Mutex<VecDeque<Outcome>>,
    executions: AtomicUsize,
}

impl ScriptedStep {
    /// Creates a step with an empty script.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            executions: AtomicUsize::new(0),
        }
    }

    /// Completes on the next scripted run.
    pub fn then_complete(self) -> Self {
        self.push(Outcome::Complete)
    }

    /// Completes with a custom exit code on the next scripted run.
    pub fn then_exit(self, exit_code: impl Into<String>) -> Self {
        self.push(Outcome::Exit(exit_code.into()))
    }

    /// Fails with `message` on the next scripted run.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Outcome::Fail(message.into()))
    }

    /// Asks the job to stop on the next scripted run.
    pub fn then_terminate(self) -> Self {
        self.push(Outcome::Terminate)
    }

    /// Returns how many times the step ran.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn push(mut self, outcome: Outcome) -> Self {
        if let Ok(script) = self.script.get_mut() {
            script.push_back(outcome);
        }
        self
    }

    fn next_outcome(&self) -> Outcome {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(Outcome::Complete)
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, execution: &mut StepExecution) -> Result<(), BoxError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        match self.next_outcome() {
            Outcome::Complete => Ok(()),
            Outcome::Exit(exit_code) => {
                execution.set_exit_status(ExitStatus::new(exit_code));
                Ok(())
            }
            Outcome::Fail(message) => Err(message.into()),
            Outcome::Terminate => {
                execution.set_terminate_only();
                Ok(())
            }
        }
    }
}
