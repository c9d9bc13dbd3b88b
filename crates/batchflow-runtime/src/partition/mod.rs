//! Local partitioning of a step.
//!
//! A [`PartitionStep`] is a step like any other from the flow's point of
//! view. When it runs, a [`Partitioner`] splits the work into named execution
//! contexts, the [`StepExecutionSplitter`] turns them into `<step>:<partition>`
//! step executions, and each one runs the worker step on the task executor.
//! The partition results are folded back into the manager step execution.
//!
//! On restart only the partitions that did not complete run again, each from
//! the execution context its last attempt left behind.

mod partitioner;
mod splitter;
mod step;

pub use self::partitioner::{Partitioner, SimplePartitioner};
pub use self::splitter::StepExecutionSplitter;
pub use self::step::PartitionStep;
