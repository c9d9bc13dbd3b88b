#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod aggregate;
pub mod engine;
mod error;
pub mod flow;
mod job;
pub mod partition;
pub mod state;
mod status;
pub mod transition;

#[doc(hidden)]
pub mod prelude;

pub use aggregate::StepExecutionAggregator;
pub use error::{FlowError, FlowResult};
pub use job::FlowJob;
pub use status::{FlowExecution, FlowExecutionStatus};

/// Tracing target for runtime operations.
pub const TRACING_TARGET: &str = "batchflow_runtime";
