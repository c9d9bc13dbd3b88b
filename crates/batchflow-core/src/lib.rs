#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod error;
pub mod execution;
pub mod repository;
pub mod status;
mod step;

pub use error::{CoreError, CoreResult};
pub use execution::{
    ExecutionContext, JobExecution, JobExecutionId, JobInstance, JobInstanceId, JobParameters,
    StepCounters, StepExecution, StepExecutionId,
};
pub use repository::{InMemoryJobRepository, JobRepository};
pub use status::{BatchStatus, ExitStatus};
pub use step::{BoxError, Step};

/// Tracing target for core operations.
pub const TRACING_TARGET: &str = "batchflow_core";
