//! Audio processing graph runtime.
//!
//! # Primary API
//!
//! - [`AudioContext`]: engine, unit registry and node ids of one graph
//! - [`UnitDefinition`] / [`UnitRegistry`]: registrable processing units
//! - [`ProcessingNode`]: control-side handle of a unit instance
//! - [`AudioParam`] / [`ParamController`]: sample-accurate automation
//! - [`Renderer`]: render half, driven offline or by an output device
//!
//! # Feature-gated APIs
//!
//! - `"device"`: [`AudioOutput`] streams a renderer through CPAL
//!
//! # Example
//!
//! ```ignore
//! use cadenza_core::*;
//!
//! let (ctx, mut renderer) = AudioContext::new(EngineConfig::default())?;
//! ctx.register(UnitDefinition::per_sample(
//!     "level",
//!     [ParamDescriptor::new("amount", 0.0)],
//!     0,
//!     |frame| frame.params[0],
//! ))?;
//!
//! let mut node = ctx.create_node("level", &UnitOptions::new())?;
//! node.connect_to(ctx.destination())?;
//!
//! let mut ctl = ctx.controller(0.0)?;
//! ctl.add_target(&node.get_param("amount")?, 1.0);
//! ctl.ramp(0.5, 0.1, RampMethod::Linear);
//!
//! let audio = renderer.render_offline(0.2);
//! ```

pub mod error;
pub use error::{EngineError, Error, RegistrationError, Result};

mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag};

pub mod config;
pub use config::EngineConfig;

pub mod id;
pub use id::{NodeId, NodeIdRegistry};

pub mod message;
pub use message::{NodeCommand, NodeEvent};

pub mod unit;
pub use unit::{
    AutomationRate, EventPort, ParamDescriptor, ProcessContext, Processor, SampleFrame,
    UnitDefinition, UnitFactory, UnitOptions,
};

pub mod automation;
pub use automation::{
    AutomationEvent, AutomationOp, AutomationTimeline, RampMethod, MIN_EXPONENTIAL_VALUE,
};

pub mod builtin;
pub use builtin::{CONSTANT_UNIT, GAIN_UNIT};

pub mod engine;
pub use engine::{
    AudioEngine, CreatedNode, Destination, Edge, ModuleHandle, ModuleLoader, UnitModule,
};

mod render;
pub use render::Renderer;

pub mod registry;
pub use registry::UnitRegistry;

pub mod param;
pub use param::AudioParam;

pub mod node;
pub use node::ProcessingNode;

pub mod controller;
pub use controller::ParamController;

mod context;
pub use context::AudioContext;

#[cfg(feature = "device")]
mod output;
#[cfg(feature = "device")]
pub use output::AudioOutput;
