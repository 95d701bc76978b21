use crate::resilience::ErrorPolicy;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Settings shared by every node of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub runtime_name: String,
    pub runtime_uuid: Uuid,
    /// Capacity of every link. `None` makes links unbounded.
    pub channel_capacity: Option<usize>,
    pub error_policy: ErrorPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtime_name: "local".to_string(),
            runtime_uuid: Uuid::new_v4(),
            channel_capacity: Some(DEFAULT_CHANNEL_CAPACITY),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Read the `runtime_config` section of a flow document. Missing keys keep their defaults.
    pub fn from_json(config: &Value) -> Result<Self> {
        match config.get("runtime_config") {
            Some(section) => serde_json::from_value(section.clone())
                .context("Invalid runtime_config section"),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_when_section_missing() {
        let config = RuntimeConfig::from_json(&json!({ "nodes": [] })).unwrap();
        assert_eq!(config.channel_capacity, Some(DEFAULT_CHANNEL_CAPACITY));
        assert_eq!(config.error_policy, ErrorPolicy::Propagate);
        assert_eq!(config.runtime_name, "local");
    }

    #[test]
    fn test_partial_section() {
        let config = RuntimeConfig::from_json(&json!({
            "runtime_config": { "runtime_name": "edge-1", "channel_capacity": null, "error_policy": "skip" }
        }))
        .unwrap();
        assert_eq!(config.runtime_name, "edge-1");
        assert_eq!(config.channel_capacity, None);
        assert_eq!(config.error_policy, ErrorPolicy::Skip);
    }

    #[test]
    fn test_rejects_bad_types() {
        let result = RuntimeConfig::from_json(&json!({
            "runtime_config": { "channel_capacity": "lots" }
        }));
        assert!(result.is_err());
    }
}
