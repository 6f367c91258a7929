//! Centralized error type for the cadenza umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cadenza_core::Error),

    #[cfg(feature = "synth")]
    #[error("Synth: {0}")]
    Synth(#[from] cadenza_synth::Error),

    /// The renderer was handed to an output device or taken by the caller.
    #[error("Renderer is no longer owned by this engine")]
    RendererUnavailable,
}

impl From<cadenza_core::RegistrationError> for Error {
    fn from(e: cadenza_core::RegistrationError) -> Self {
        Self::Core(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
