//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use batchflow_runtime::prelude::*;
//! ```

pub use batchflow_core::{
    BatchStatus, ExitStatus, InMemoryJobRepository, JobExecution, JobParameters, JobRepository,
    Step, StepExecution,
};

pub use crate::engine::{EngineConfig, FlowExecutor, TaskExecutor, TokioTaskExecutor};
pub use crate::error::{FlowError, FlowResult};
pub use crate::flow::{Flow, FlowBuilder, FlowDefinition, Target};
pub use crate::job::FlowJob;
pub use crate::partition::{PartitionStep, Partitioner, SimplePartitioner};
pub use crate::state::JobExecutionDecider;
pub use crate::status::{FlowExecution, FlowExecutionStatus};
