//! Shared fixtures for cadenza-core integration tests.
//!
//! Everything renders offline: no output device is opened.

#![allow(dead_code)]

use cadenza_core::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Block size used by the fixtures. Small, so a few blocks cover a ramp.
pub const TEST_BLOCK_SIZE: usize = 64;

pub const TEST_SAMPLE_RATE: f64 = 44100.0;

/// Floating point rounding error of per-sample interpolation.
pub const FLOAT_EPSILON: f32 = 1e-5;

pub fn test_config() -> EngineConfig {
    EngineConfig {
        sample_rate: TEST_SAMPLE_RATE,
        block_size: TEST_BLOCK_SIZE,
        ..Default::default()
    }
}

/// Fresh context and its renderer.
pub fn test_context() -> (AudioContext, Renderer) {
    AudioContext::new(test_config()).expect("Failed to create test context")
}

/// Duration of `blocks` rendered blocks, in seconds.
pub fn blocks(blocks: usize) -> f64 {
    (blocks * TEST_BLOCK_SIZE) as f64 / TEST_SAMPLE_RATE
}

/// Source unit that outputs its `amount` parameter.
pub fn level_unit() -> UnitDefinition {
    UnitDefinition::per_sample("level", [ParamDescriptor::new("amount", 0.25)], 0, |frame| {
        frame.params[0]
    })
}

/// Pass-through unit with one input and one output.
pub fn thru_unit() -> UnitDefinition {
    UnitDefinition::per_sample("thru", [], 1, |frame| frame.inputs[0])
}

/// Module loader that counts loads before delegating to the engine.
pub struct SpyLoader {
    engine: Arc<AudioEngine>,
    pub loads: AtomicUsize,
    pub releases: AtomicUsize,
}

impl SpyLoader {
    pub fn new(engine: Arc<AudioEngine>) -> Self {
        Self {
            engine,
            loads: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for SpyLoader {
    fn load_module(&self, module: UnitModule) -> std::result::Result<ModuleHandle, EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.engine.load_module(module)
    }

    fn release_module(&self, handle: &ModuleHandle) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.engine.release_module(handle);
    }
}

/// Context whose registrations go through a [`SpyLoader`].
pub fn spied_context() -> (AudioContext, Arc<SpyLoader>, Renderer) {
    let (engine, renderer) = AudioEngine::new(test_config()).expect("Failed to create engine");
    let engine = Arc::new(engine);
    let spy = Arc::new(SpyLoader::new(Arc::clone(&engine)));
    let loader: Arc<dyn ModuleLoader> = spy.clone();
    (AudioContext::from_parts(engine, loader), spy, renderer)
}

/// Render `n` blocks, discarding the output.
pub fn render_blocks(renderer: &mut Renderer, n: usize) {
    for _ in 0..n {
        renderer.render_block();
    }
}
