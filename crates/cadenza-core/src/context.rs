//! Shared handles for one engine instance.

use crate::config::EngineConfig;
use crate::controller::ParamController;
use crate::engine::{AudioEngine, Destination, ModuleLoader};
use crate::error::RegistrationError;
use crate::id::NodeIdRegistry;
use crate::node::ProcessingNode;
use crate::registry::UnitRegistry;
use crate::render::Renderer;
use crate::unit::{UnitDefinition, UnitOptions};
use crate::Result;
use std::sync::Arc;

/// Engine, unit registry and node id registry of one audio graph.
///
/// Cheap to clone. Everything that creates nodes takes a context instead of
/// reaching for process-wide state, so independent graphs (and tests) never
/// interfere.
#[derive(Clone, Debug)]
pub struct AudioContext {
    engine: Arc<AudioEngine>,
    units: Arc<UnitRegistry>,
    ids: Arc<NodeIdRegistry>,
}

impl AudioContext {
    /// Create a context and the renderer that produces its audio.
    pub fn new(config: EngineConfig) -> Result<(Self, Renderer)> {
        let (engine, renderer) = AudioEngine::new(config)?;
        let engine = Arc::new(engine);
        let loader: Arc<dyn ModuleLoader> = engine.clone();
        Ok((Self::from_parts(engine, loader), renderer))
    }

    /// Build a context around an existing engine, registering units
    /// through `loader`.
    pub fn from_parts(engine: Arc<AudioEngine>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            engine,
            units: Arc::new(UnitRegistry::new(loader)),
            ids: Arc::new(NodeIdRegistry::new()),
        }
    }

    pub fn engine(&self) -> &Arc<AudioEngine> {
        &self.engine
    }

    pub fn units(&self) -> &Arc<UnitRegistry> {
        &self.units
    }

    pub fn ids(&self) -> &Arc<NodeIdRegistry> {
        &self.ids
    }

    pub fn sample_rate(&self) -> f64 {
        self.engine.sample_rate()
    }

    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    pub fn destination(&self) -> Destination {
        self.engine.destination()
    }

    pub fn register(&self, definition: UnitDefinition) -> core::result::Result<String, RegistrationError> {
        self.units.register(definition)
    }

    pub fn create_node(&self, unit: &str, options: &UnitOptions) -> Result<ProcessingNode> {
        ProcessingNode::new(self, unit, options)
    }

    pub fn controller(&self, initial: f32) -> Result<ParamController> {
        ParamController::new(self, initial)
    }
}
