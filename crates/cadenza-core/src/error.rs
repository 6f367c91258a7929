//! Error types for cadenza-core.

use crate::id::NodeId;
use thiserror::Error;

/// Error type for cadenza-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A node was requested for a unit that has not been registered.
    #[error("Unit '{0}' is not registered")]
    UnregisteredUnit(String),

    #[error("Unit '{unit}' has no parameter named '{name}'")]
    ParameterNotFound { unit: String, name: String },

    #[error("Node {0} has been disposed")]
    Disposed(NodeId),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("Engine: {0}")]
    Engine(#[from] EngineError),

    #[cfg(feature = "device")]
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[cfg(feature = "device")]
    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "device")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "device")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "device")]
    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by the rendering engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Rendering engine is closed")]
    Closed,

    #[error("Module '{0}' is already loaded")]
    DuplicateModule(String),

    #[error("Malformed module '{name}': {reason}")]
    MalformedModule { name: String, reason: String },

    #[error("Module '{0}' is not loaded")]
    UnknownModule(String),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("Node {node} has no output {output}")]
    InvalidOutput { node: NodeId, output: usize },

    #[error("Node {node} has no input {input}")]
    InvalidInput { node: NodeId, input: usize },

    #[error("Node {node} has no parameter {param}")]
    InvalidParam { node: NodeId, param: usize },

    #[error("Connecting {from} to {to} would create a cycle")]
    CycleDetected { from: NodeId, to: NodeId },

    #[error("{from} is not connected to {to}")]
    NotConnected { from: NodeId, to: NodeId },
}

/// The engine rejected a unit module during registration.
///
/// Registration state is left untouched, so the same definition can be
/// registered again once the cause is fixed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to register unit '{name}': {source}")]
pub struct RegistrationError {
    pub name: String,
    #[source]
    pub source: EngineError,
}
