//! Per-node message protocol between the control and render contexts.
//!
//! Both directions are JSON-serializable with a `type` discriminator.
//! Receivers ignore any `type` they do not recognize.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control -> render message posted to a node's processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeCommand {
    Start,
    /// Graceful stop; units with a release tail fade out before reporting `ended`.
    Stop,
    /// Hard reset to the initial state.
    Reset,
    #[serde(rename_all = "camelCase")]
    SetBuffer {
        channels: Vec<Vec<f32>>,
        #[serde(default)]
        sample_rate: Option<f64>,
    },
    Config {
        #[serde(default)]
        settings: Value,
    },
    SetActive {
        active: bool,
    },
    ReportInterval {
        seconds: f64,
    },
    /// Application-specific message.
    Custom {
        name: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(other)]
    Unrecognized,
}

/// Render -> control message emitted by a node's processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeEvent {
    Started,
    Ended,
    Looped,
    /// Periodic status, e.g. playback position in seconds.
    Update {
        position: f64,
    },
    Custom {
        name: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(other)]
    Unrecognized,
}

impl NodeCommand {
    /// Decode a JSON message. Unknown types decode to `Unrecognized`.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

impl NodeEvent {
    /// Decode a JSON message. Unknown types decode to `Unrecognized`.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// True for `started` and `ended`, the messages a voice pool consumes.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Started | Self::Ended)
    }
}
