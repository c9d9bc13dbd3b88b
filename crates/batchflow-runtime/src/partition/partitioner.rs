//! Partitioners.

use std::collections::BTreeMap;

use batchflow_core::ExecutionContext;

/// Splits the work of a step into named execution contexts.
///
/// Partition names must be stable across runs: on restart they are used to
/// find the partitions that already completed.
pub trait Partitioner: Send + Sync {
    /// Returns up to `grid_size` partitions keyed by name.
    fn partition(&self, grid_size: usize) -> BTreeMap<String, ExecutionContext>;
}

impl<F> Partitioner for F
where
    F: Fn(usize) -> BTreeMap<String, ExecutionContext> + Send + Sync,
{
    fn partition(&self, grid_size: usize) -> BTreeMap<String, ExecutionContext> {
        self(grid_size)
    }
}

/// Partitioner creating `grid_size` empty partitions named `partition{i}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplePartitioner;

impl SimplePartitioner {
    /// Creates a new partitioner.
    pub fn new() -> Self {
        Self
    }
}

impl Partitioner for SimplePartitioner {
    fn partition(&self, grid_size: usize) -> BTreeMap<String, ExecutionContext> {
        (0..grid_size)
            .map(|i| (format!("partition{i}"), ExecutionContext::new()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_partitioner_names_partitions() {
        let partitions = SimplePartitioner::new().partition(3);
        let names: Vec<_> = partitions.keys().map(String::as_str).collect();
        assert_eq!(names, ["partition0", "partition1", "partition2"]);
        assert!(partitions.values().all(ExecutionContext::is_empty));
    }

    #[test]
    fn closures_are_partitioners() {
        let ranges = |grid_size: usize| {
            (0..grid_size)
                .map(|i| {
                    let mut context = ExecutionContext::new();
                    context.put("min", (i * 100) as i64);
                    context.put("max", (i * 100 + 99) as i64);
                    (format!("range{i}"), context)
                })
                .collect::<BTreeMap<_, _>>()
        };

        let partitions = ranges.partition(2);
        assert_eq!(partitions["range1"].get_i64("min"), Some(100));
        assert_eq!(partitions["range1"].get_i64("max"), Some(199));
    }
}
