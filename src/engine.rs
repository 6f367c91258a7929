//! Main engine facade.

use crate::core::{
    AudioContext, AudioEngine, Destination, ParamController, ProcessingNode, Renderer,
    UnitDefinition, UnitOptions,
};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "synth")]
use crate::synth::{AllocationStrategy, VoicePool};

#[cfg(feature = "device")]
use crate::core::AudioOutput;

/// One audio graph together with whatever is currently rendering it.
///
/// The renderer starts out owned by the engine. It can be driven offline
/// through [`render_offline`](Self::render_offline), handed to an output
/// device with `start_output`, or taken with [`take_renderer`](Self::take_renderer).
/// Once it has left, render calls fail with [`Error::RendererUnavailable`].
pub struct Cadenza {
    context: AudioContext,
    renderer: Mutex<Option<Renderer>>,

    #[cfg(feature = "device")]
    output: Mutex<Option<AudioOutput>>,

    #[cfg(feature = "device")]
    output_device: Option<usize>,
}

impl Cadenza {
    pub fn builder() -> crate::CadenzaBuilder {
        crate::CadenzaBuilder::default()
    }

    pub(crate) fn from_parts(
        context: AudioContext,
        renderer: Renderer,
        #[cfg(feature = "device")] output_device: Option<usize>,
    ) -> Self {
        Self {
            context,
            renderer: Mutex::new(Some(renderer)),
            #[cfg(feature = "device")]
            output: Mutex::new(None),
            #[cfg(feature = "device")]
            output_device,
        }
    }

    /// Shared handles for building graphs directly against the core API.
    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn engine(&self) -> &Arc<AudioEngine> {
        self.context.engine()
    }

    pub fn sample_rate(&self) -> f64 {
        self.context.sample_rate()
    }

    pub fn channels(&self) -> usize {
        self.engine().config().channels
    }

    /// Seconds rendered so far.
    pub fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    pub fn destination(&self) -> Destination {
        self.context.destination()
    }

    /// Register a unit definition. Returns its name.
    ///
    /// Registering the same name twice is a no-op.
    pub fn register(&self, definition: UnitDefinition) -> Result<String> {
        Ok(self.context.register(definition)?)
    }

    pub fn create_node(&self, unit: &str, options: &UnitOptions) -> Result<ProcessingNode> {
        Ok(self.context.create_node(unit, options)?)
    }

    pub fn controller(&self, initial: f32) -> Result<ParamController> {
        Ok(self.context.controller(initial)?)
    }

    /// Pool of `count` tone voices, each connected to the destination.
    #[cfg(feature = "synth")]
    pub fn tone_voices(
        &self,
        count: usize,
        strategy: impl AllocationStrategy + 'static,
    ) -> Result<VoicePool<ProcessingNode>> {
        let mut pool = crate::synth::tone_pool(&self.context, count, strategy)?;
        let destination = self.destination();
        let keys: Vec<_> = pool.keys().collect();
        for key in keys {
            if let Some(voice) = pool.voice_mut(key) {
                voice.connect_to(destination.clone())?;
            }
        }
        Ok(pool)
    }

    /// Pool of `count` nodes of an already registered unit. Voices are left unconnected.
    #[cfg(feature = "synth")]
    pub fn voice_pool(
        &self,
        unit: &str,
        options: &UnitOptions,
        count: usize,
        strategy: impl AllocationStrategy + 'static,
    ) -> Result<VoicePool<ProcessingNode>> {
        Ok(VoicePool::from_unit(
            &self.context,
            unit,
            options,
            count,
            strategy,
        )?)
    }

    /// Run `f` against the engine-owned renderer.
    pub fn with_renderer<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Renderer) -> R,
    {
        let mut guard = self.renderer.lock();
        let renderer = guard.as_mut().ok_or(Error::RendererUnavailable)?;
        Ok(f(renderer))
    }

    /// Render `seconds` of interleaved audio.
    pub fn render_offline(&self, seconds: f64) -> Result<Vec<f32>> {
        self.with_renderer(|r| r.render_offline(seconds))
    }

    /// Fill an interleaved buffer.
    pub fn render(&self, output: &mut [f32]) -> Result<()> {
        self.with_renderer(|r| r.render(output))
    }

    /// Take the renderer out of the engine, e.g. to drive it from a custom
    /// audio callback.
    pub fn take_renderer(&self) -> Result<Renderer> {
        self.renderer.lock().take().ok_or(Error::RendererUnavailable)
    }

    /// Hand the renderer to the configured output device and start streaming.
    #[cfg(feature = "device")]
    pub fn start_output(&self) -> Result<&Self> {
        let renderer = self.take_renderer()?;
        let output = AudioOutput::start(renderer, self.output_device)?;
        tracing::info!(channels = output.channels(), "Audio output running");
        *self.output.lock() = Some(output);
        Ok(self)
    }

    #[cfg(feature = "device")]
    pub fn is_running(&self) -> bool {
        self.output.lock().is_some()
    }

    #[cfg(feature = "device")]
    pub fn list_output_devices() -> Result<Vec<String>> {
        Ok(AudioOutput::list_devices()?)
    }
}

impl std::fmt::Debug for Cadenza {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cadenza")
            .field("sample_rate", &self.sample_rate())
            .field("channels", &self.channels())
            .field("renderer_owned", &self.renderer.lock().is_some())
            .finish()
    }
}
