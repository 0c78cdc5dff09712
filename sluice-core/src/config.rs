//! Graph Configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for a [`Graph`](crate::Graph).
///
/// Every field has a default, so a partial JSON document is accepted:
///
/// ```rust
/// use sluice_core::GraphConfig;
///
/// let config = GraphConfig::from_json(r#"{ "record_trace": true }"#).unwrap();
/// assert_eq!(config.label, "graph");
/// assert!(config.record_trace);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Name attached to every log event emitted by the graph.
    pub label: String,

    /// Record every delivered visit event for later inspection.
    pub record_trace: bool,

    /// Maximum number of retained trace records. Oldest records are dropped first.
    pub trace_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            label: "graph".to_string(),
            record_trace: false,
            trace_capacity: 4096,
        }
    }
}

impl GraphConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.record_trace && self.trace_capacity == 0 {
            return Err(ConfigError::ZeroTraceCapacity);
        }
        Ok(())
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Enable trace recording with the default capacity.
    pub fn with_trace(mut self) -> Self {
        self.record_trace = true;
        self
    }
}
