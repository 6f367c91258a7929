//! Error types for cadenza-synth.

use thiserror::Error;

/// Result type alias for cadenza-synth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cadenza-synth.
#[derive(Debug, Error)]
pub enum Error {
    /// Graph, registry or node failure.
    #[error(transparent)]
    Core(#[from] cadenza_core::Error),

    /// Invalid configuration parameter.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<cadenza_core::RegistrationError> for Error {
    fn from(e: cadenza_core::RegistrationError) -> Self {
        Self::Core(e.into())
    }
}
