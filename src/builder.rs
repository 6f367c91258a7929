//! Builder for configuring and constructing a [`Cadenza`] engine.

use crate::core::EngineConfig;
use crate::{Cadenza, Result};

/// Configures the rendering engine before it is started.
///
/// Settings are validated together in [`build`](Self::build).
///
/// # Example
///
/// ```ignore
/// use cadenza::prelude::*;
///
/// let engine = Cadenza::builder()
///     .sample_rate(48000.0)
///     .block_size(256)
///     .channels(2)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CadenzaBuilder {
    config: EngineConfig,

    #[cfg(feature = "device")]
    output_device: Option<usize>,
}

impl CadenzaBuilder {
    /// Default: 44100 Hz
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Default: 128 frames
    pub fn block_size(mut self, frames: usize) -> Self {
        self.config.block_size = frames;
        self
    }

    /// Default: 2
    pub fn channels(mut self, count: usize) -> Self {
        self.config.channels = count;
        self
    }

    /// Capacity of each node's event queue. Default: 64
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Replace every engine setting at once.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Device used by [`Cadenza::start_output`]. Default device if unset.
    #[cfg(feature = "device")]
    pub fn output_device(mut self, index: usize) -> Self {
        self.output_device = Some(index);
        self
    }

    pub fn build(self) -> Result<Cadenza> {
        let (context, renderer) = crate::core::AudioContext::new(self.config)?;

        tracing::debug!(
            sample_rate = context.sample_rate(),
            "Cadenza engine built"
        );

        Ok(Cadenza::from_parts(
            context,
            renderer,
            #[cfg(feature = "device")]
            self.output_device,
        ))
    }
}
