//! # Cadenza - Audio Processing Graph Runtime
//!
//! Umbrella crate over the Cadenza subsystems.
//!
//! ## Architecture
//!
//! - **cadenza-core** - node ids, unit registration, processing nodes,
//!   sample-accurate parameter automation and the block renderer
//! - **cadenza-synth** - voice pools with round-robin and LRU allocation
//!
//! ## Quick Start
//!
//! ```ignore
//! use cadenza::prelude::*;
//!
//! let engine = Cadenza::builder().sample_rate(48000.0).build()?;
//!
//! let mut voices = engine.tone_voices(8, LeastRecentlyUsed::new())?;
//! if let Some(key) = voices.allocate_node() {
//!     voices.voice(key).unwrap().post(NodeCommand::Start)?;
//! }
//!
//! let audio = engine.render_offline(1.0)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Core graph runtime plus voice pooling
//! - `synth` - Voice pools and the tone voice
//! - `device` - Real-time output through CPAL

/// Re-export of cadenza-core for direct access
pub use cadenza_core as core;

pub use cadenza_core::{
    // Identity
    NodeId,
    NodeIdRegistry,

    // Units
    AutomationRate,
    ParamDescriptor,
    ProcessContext,
    Processor,
    UnitDefinition,
    UnitOptions,
    UnitRegistry,

    // Graph
    AudioContext,
    AudioEngine,
    Destination,
    EngineConfig,
    NodeCommand,
    NodeEvent,
    ProcessingNode,
    Renderer,

    // Automation
    AudioParam,
    AutomationTimeline,
    ParamController,
    RampMethod,
};

#[cfg(feature = "device")]
pub use cadenza_core::AudioOutput;

// Voice pooling
#[cfg(feature = "synth")]
pub use cadenza_synth as synth;

#[cfg(feature = "synth")]
pub use cadenza_synth::{
    Allocation, AllocationStrategy, LeastRecentlyUsed, RoundRobin, Voice, VoiceKey, VoicePool,
    VoiceState,
};

mod builder;
mod engine;
mod error;

pub use builder::CadenzaBuilder;
pub use engine::Cadenza;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{Cadenza, CadenzaBuilder};

    // Graph building
    pub use crate::core::{
        Destination, NodeCommand, NodeEvent, ParamDescriptor, ProcessingNode, RampMethod,
        UnitDefinition, UnitOptions,
    };

    // Voices
    #[cfg(feature = "synth")]
    pub use crate::synth::{LeastRecentlyUsed, RoundRobin, Voice, VoicePool};
}
