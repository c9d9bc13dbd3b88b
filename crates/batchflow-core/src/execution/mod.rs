//! Execution records produced by running a job.

mod context;
mod id;
mod job;
mod step;

pub use context::ExecutionContext;
pub use id::{JobExecutionId, JobInstanceId, StepExecutionId};
pub use job::{JobExecution, JobInstance, JobParameters};
pub use step::{StepCounters, StepExecution};
