//! The opaque unit of work run by a flow.

use async_trait::async_trait;

use crate::execution::StepExecution;

/// Boxed error returned by step implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A unit of work inside a job.
///
/// The flow engine treats a step as opaque: it creates the
/// [`StepExecution`] record, hands it to [`Step::execute`], and derives the
/// outcome from what the step leaves behind. A step may set a custom exit
/// status, update counters and the execution context, or call
/// [`StepExecution::set_terminate_only`] to stop the job once it returns.
///
/// Long-running steps should poll [`StepExecution::is_stop_requested`];
/// the engine never interrupts a running step.
#[async_trait]
pub trait Step: Send + Sync {
    /// Returns the step name, unique within a flow.
    fn name(&self) -> &str;

    /// Whether the step runs again on restart even if it already completed.
    fn allow_start_if_complete(&self) -> bool {
        false
    }

    /// Maximum number of times the step may be started per job instance.
    fn start_limit(&self) -> u32 {
        u32::MAX
    }

    /// Runs the step against its execution record.
    async fn execute(&self, execution: &mut StepExecution) -> Result<(), BoxError>;
}
