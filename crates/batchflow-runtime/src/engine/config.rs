//! Engine configuration.

#[cfg(feature = "config")]
use clap::Args;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for the flow execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[builder(
    pattern = "owned",
    setter(into, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct EngineConfig {
    /// Maximum number of split branches or partitions running at once on the
    /// default task executor.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "max-concurrent-branches",
            env = "BATCHFLOW_MAX_CONCURRENT_BRANCHES",
            default_value = "8"
        )
    )]
    #[serde(default = "default_max_concurrent_branches")]
    #[builder(default = "default_max_concurrent_branches()")]
    pub max_concurrent_branches: usize,

    /// Number of partitions requested by partition steps that do not set
    /// their own grid size.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "default-grid-size",
            env = "BATCHFLOW_DEFAULT_GRID_SIZE",
            default_value = "4"
        )
    )]
    #[serde(default = "default_grid_size")]
    #[builder(default = "default_grid_size()")]
    pub default_grid_size: usize,
}

fn default_max_concurrent_branches() -> usize {
    8
}

fn default_grid_size() -> usize {
    4
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_branches == Some(0) {
            return Err("max_concurrent_branches must be at least 1".into());
        }
        if self.default_grid_size == Some(0) {
            return Err("default_grid_size must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_branches: default_max_concurrent_branches(),
            default_grid_size: default_grid_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let config = EngineConfigBuilder::default().build().unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_concurrent_branches, 8);
        assert_eq!(config.default_grid_size, 4);
    }

    #[test]
    fn builder_rejects_zero() {
        let result = EngineConfigBuilder::default()
            .with_max_concurrent_branches(0usize)
            .build();
        assert!(result.is_err());

        let result = EngineConfigBuilder::default()
            .with_default_grid_size(0usize)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"default_grid_size": 2}"#).unwrap();
        assert_eq!(config.default_grid_size, 2);
        assert_eq!(config.max_concurrent_branches, 8);
    }
}
