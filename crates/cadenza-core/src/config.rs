//! Rendering engine configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the rendering engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub sample_rate: f64,
    /// Frames rendered per block. Graph edits take effect on block boundaries.
    pub block_size: usize,
    /// Output channels of the destination node.
    pub channels: usize,
    /// Capacity of each node's render-to-control event queue.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            block_size: 128,
            channels: 2,
            event_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if !(1..=8192).contains(&self.block_size) {
            return Err(Error::InvalidConfig(format!(
                "block_size {} out of range (1-8192 frames)",
                self.block_size
            )));
        }
        if !(1..=32).contains(&self.channels) {
            return Err(Error::InvalidConfig(format!(
                "channels {} out of range (1-32)",
                self.channels
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Duration of one block in seconds.
    pub fn block_duration(&self) -> f64 {
        self.block_size as f64 / self.sample_rate
    }
}
