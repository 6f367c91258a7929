//! Processing unit definitions.
//!
//! A unit is a named render-side processor type: a factory producing
//! [`Processor`] instances plus the descriptors of the parameters it exposes.
//! Units are registered once and then instantiated any number of times.

use crate::id::NodeId;
use crate::message::{NodeCommand, NodeEvent};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// How often a parameter is evaluated by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutomationRate {
    /// Once per sample.
    #[default]
    Continuous,
    /// Once per block, at the block's first frame.
    Block,
}

fn default_min() -> f32 {
    f32::MIN
}

fn default_max() -> f32 {
    f32::MAX
}

/// Description of one automatable parameter of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDescriptor {
    pub name: String,
    pub default_value: f32,
    #[serde(default = "default_min")]
    pub min_value: f32,
    #[serde(default = "default_max")]
    pub max_value: f32,
    #[serde(default)]
    pub automation_rate: AutomationRate,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, default_value: f32) -> Self {
        Self {
            name: name.into(),
            default_value,
            min_value: f32::MIN,
            max_value: f32::MAX,
            automation_rate: AutomationRate::Continuous,
        }
    }

    pub fn range(mut self, min: f32, max: f32) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn block_rate(mut self) -> Self {
        self.automation_rate = AutomationRate::Block;
        self
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min_value, self.max_value)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("parameter with empty name".to_string());
        }
        if !(self.min_value <= self.max_value) {
            return Err(format!(
                "parameter '{}' has min {} above max {}",
                self.name, self.min_value, self.max_value
            ));
        }
        if !self.default_value.is_finite()
            || self.default_value < self.min_value
            || self.default_value > self.max_value
        {
            return Err(format!(
                "parameter '{}' default {} outside [{}, {}]",
                self.name, self.default_value, self.min_value, self.max_value
            ));
        }
        Ok(())
    }
}

/// Render-to-control message port of one node.
///
/// Posting never blocks: when the control side falls behind and the queue is
/// full, the event is dropped.
#[derive(Debug, Clone)]
pub struct EventPort {
    node: NodeId,
    sender: Sender<NodeEvent>,
}

impl EventPort {
    pub(crate) fn new(node: NodeId, sender: Sender<NodeEvent>) -> Self {
        Self { node, sender }
    }

    /// Post an event. Returns false if it was dropped.
    pub fn post(&self, event: NodeEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::trace!("Event queue of {} full, dropped {:?}", self.node, event);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }
}

/// Buffers and timing handed to a processor for one block.
pub struct ProcessContext<'a> {
    inputs: &'a [Vec<f32>],
    outputs: &'a mut [Vec<f32>],
    params: &'a [Vec<f32>],
    frames: usize,
    current_frame: u64,
    sample_rate: f64,
    events: &'a EventPort,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        inputs: &'a [Vec<f32>],
        outputs: &'a mut [Vec<f32>],
        params: &'a [Vec<f32>],
        frames: usize,
        current_frame: u64,
        sample_rate: f64,
        events: &'a EventPort,
    ) -> Self {
        Self {
            inputs,
            outputs,
            params,
            frames,
            current_frame,
            sample_rate,
            events,
        }
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Absolute frame index of the first frame in this block.
    #[inline]
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// Engine time of the first frame in this block, in seconds.
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.current_frame as f64 / self.sample_rate
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Mixed signal at input `index`, or an empty slice for unknown inputs.
    #[inline]
    pub fn input(&self, index: usize) -> &[f32] {
        self.inputs
            .get(index)
            .map(|buf| &buf[..self.frames])
            .unwrap_or(&[])
    }

    #[inline]
    pub fn output(&mut self, index: usize) -> &mut [f32] {
        let frames = self.frames;
        &mut self.outputs[index][..frames]
    }

    /// Per-frame values of parameter `index`, already clamped and modulated.
    #[inline]
    pub fn param(&self, index: usize) -> &[f32] {
        &self.params[index][..self.frames]
    }

    /// Post an event to the control side.
    pub fn emit(&self, event: NodeEvent) -> bool {
        self.events.post(event)
    }

    pub fn events(&self) -> &EventPort {
        self.events
    }
}

/// Render-side instance of a unit.
///
/// Runs on the render thread: implementations must not block or allocate in
/// `process`.
pub trait Processor: Send {
    /// Render one block. Returning false stops the node; it outputs silence
    /// until it receives `start` or `reset`.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> bool;

    /// Handle a control message. Unrecognized messages must be ignored.
    fn on_command(&mut self, command: &NodeCommand, events: &EventPort) {
        let _ = events;
        if let NodeCommand::Reset = command {
            self.reset();
        }
    }

    fn reset(&mut self) {}
}

/// Construction options for a node instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnitOptions {
    /// Initial intrinsic values, keyed by parameter name.
    pub parameter_data: HashMap<String, f32>,
    /// Free-form options passed to the processor factory.
    pub processor_options: Value,
}

impl UnitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: f32) -> Self {
        self.parameter_data.insert(name.into(), value);
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.processor_options = options;
        self
    }

    /// Initial value of a parameter, clamped to its range.
    pub fn initial_value(&self, descriptor: &ParamDescriptor) -> f32 {
        descriptor.clamp(
            self.parameter_data
                .get(&descriptor.name)
                .copied()
                .unwrap_or(descriptor.default_value),
        )
    }
}

/// Function that constructs a processor instance.
pub type UnitFactory = Arc<dyn Fn(&UnitOptions) -> Box<dyn Processor> + Send + Sync>;

/// A named, registrable processing unit type.
#[derive(Clone)]
pub struct UnitDefinition {
    name: String,
    factory: UnitFactory,
    descriptors: Vec<ParamDescriptor>,
    inputs: usize,
    outputs: usize,
    supports_release: bool,
}

impl UnitDefinition {
    /// New unit with one input and one output.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&UnitOptions) -> Box<dyn Processor> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            descriptors: Vec::new(),
            inputs: 1,
            outputs: 1,
            supports_release: false,
        }
    }

    pub fn with_params(mut self, descriptors: impl IntoIterator<Item = ParamDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    pub fn with_param(mut self, descriptor: ParamDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn with_io(mut self, inputs: usize, outputs: usize) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    /// Mark the unit as fading out on `stop` and reporting `ended` when done.
    pub fn with_release(mut self, supports_release: bool) -> Self {
        self.supports_release = supports_release;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptors(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == name)
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn supports_release(&self) -> bool {
        self.supports_release
    }

    pub fn instantiate(&self, options: &UnitOptions) -> Box<dyn Processor> {
        (self.factory)(options)
    }

    /// Check the definition for problems the engine would reject.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("unit name is empty".to_string());
        }
        if self.name.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(format!("unit name '{}' contains '/' or whitespace", self.name));
        }
        if self.outputs == 0 && self.inputs == 0 {
            return Err("unit has neither inputs nor outputs".to_string());
        }
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            descriptor.validate()?;
            if self.descriptors[..i].iter().any(|d| d.name == descriptor.name) {
                return Err(format!("duplicate parameter '{}'", descriptor.name));
            }
        }
        Ok(())
    }

    /// Build a single-output unit from a per-sample transform.
    ///
    /// The closure sees the current input samples and parameter values of
    /// each frame and returns the output sample. A `setActive` message with
    /// `active: false` silences the unit.
    pub fn per_sample<F>(
        name: impl Into<String>,
        descriptors: impl IntoIterator<Item = ParamDescriptor>,
        inputs: usize,
        transform: F,
    ) -> Self
    where
        F: Fn(&SampleFrame<'_>) -> f32 + Send + Sync + 'static,
    {
        let transform: Arc<dyn Fn(&SampleFrame<'_>) -> f32 + Send + Sync> = Arc::new(transform);
        let descriptors: Vec<ParamDescriptor> = descriptors.into_iter().collect();
        let num_params = descriptors.len();

        Self::new(name, move |_options| {
            Box::new(PerSampleProcessor {
                transform: Arc::clone(&transform),
                inputs: vec![0.0; inputs],
                params: vec![0.0; num_params],
                active: true,
            })
        })
        .with_params(descriptors)
        .with_io(inputs, 1)
    }
}

impl fmt::Debug for UnitDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDefinition")
            .field("name", &self.name)
            .field("descriptors", &self.descriptors)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("supports_release", &self.supports_release)
            .finish_non_exhaustive()
    }
}

/// One frame of a per-sample unit.
#[derive(Debug, Clone, Copy)]
pub struct SampleFrame<'a> {
    pub inputs: &'a [f32],
    pub params: &'a [f32],
    /// Engine time of this frame in seconds.
    pub time: f64,
    pub sample_rate: f64,
}

struct PerSampleProcessor {
    transform: Arc<dyn Fn(&SampleFrame<'_>) -> f32 + Send + Sync>,
    inputs: Vec<f32>,
    params: Vec<f32>,
    active: bool,
}

impl Processor for PerSampleProcessor {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> bool {
        if !self.active {
            ctx.output(0).fill(0.0);
            return true;
        }

        let start = ctx.current_time();
        let sample_rate = ctx.sample_rate();
        for frame in 0..ctx.frames() {
            for (k, slot) in self.inputs.iter_mut().enumerate() {
                *slot = ctx.input(k).get(frame).copied().unwrap_or(0.0);
            }
            for (p, slot) in self.params.iter_mut().enumerate() {
                *slot = ctx.param(p)[frame];
            }
            let value = (self.transform)(&SampleFrame {
                inputs: &self.inputs,
                params: &self.params,
                time: start + frame as f64 / sample_rate,
                sample_rate,
            });
            ctx.output(0)[frame] = value;
        }
        true
    }

    fn on_command(&mut self, command: &NodeCommand, _events: &EventPort) {
        match command {
            NodeCommand::SetActive { active } => self.active = *active,
            NodeCommand::Reset => self.active = true,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn noise() -> UnitDefinition {
        UnitDefinition::per_sample(
            "noise",
            [ParamDescriptor::new("amplitude", 0.5).range(0.0, 1.0)],
            0,
            |frame| frame.params[0],
        )
    }

    #[test]
    fn test_descriptor_serde_defaults() {
        let d: ParamDescriptor =
            serde_json::from_str(r#"{ "name": "cutoff", "defaultValue": 1000 }"#).unwrap();
        assert_eq!(d.min_value, f32::MIN);
        assert_eq!(d.max_value, f32::MAX);
        assert_eq!(d.automation_rate, AutomationRate::Continuous);

        let d: ParamDescriptor = serde_json::from_str(
            r#"{ "name": "q", "defaultValue": 1, "minValue": 0.1, "maxValue": 20, "automationRate": "block" }"#,
        )
        .unwrap();
        assert_eq!(d.automation_rate, AutomationRate::Block);
        assert_eq!(d.clamp(50.0), 20.0);
    }

    #[test]
    fn test_validate_rejects_bad_descriptors() {
        assert!(noise().validate().is_ok());

        let dup = noise().with_param(ParamDescriptor::new("amplitude", 0.1));
        assert!(dup.validate().unwrap_err().contains("duplicate"));

        let out_of_range = UnitDefinition::per_sample(
            "bad",
            [ParamDescriptor::new("x", 5.0).range(0.0, 1.0)],
            0,
            |_| 0.0,
        );
        assert!(out_of_range.validate().is_err());

        let unnamed = UnitDefinition::per_sample("", [], 0, |_| 0.0);
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_initial_values() {
        let def = noise();
        let options = UnitOptions::new().param("amplitude", 3.0);
        assert_eq!(options.initial_value(&def.descriptors()[0]), 1.0);
        assert_eq!(UnitOptions::new().initial_value(&def.descriptors()[0]), 0.5);
    }

    #[test]
    fn test_per_sample_processor() {
        let def = UnitDefinition::per_sample(
            "double",
            [ParamDescriptor::new("gain", 2.0)],
            1,
            |frame| frame.inputs[0] * frame.params[0],
        );
        let mut processor = def.instantiate(&UnitOptions::new());

        let (tx, _rx) = bounded(4);
        let port = EventPort::new(NodeId::destination(), tx);
        let inputs = vec![vec![0.25; 4]];
        let mut outputs = vec![vec![0.0; 4]];
        let params = vec![vec![2.0; 4]];

        let mut ctx = ProcessContext::new(&inputs, &mut outputs, &params, 4, 0, 44100.0, &port);
        assert!(processor.process(&mut ctx));
        assert_eq!(outputs[0], vec![0.5; 4]);

        processor.on_command(&NodeCommand::SetActive { active: false }, &port);
        let mut ctx = ProcessContext::new(&inputs, &mut outputs, &params, 4, 4, 44100.0, &port);
        processor.process(&mut ctx);
        assert_eq!(outputs[0], vec![0.0; 4]);
    }

    #[test]
    fn test_event_port_drops_when_full() {
        let (tx, rx) = bounded(1);
        let port = EventPort::new(NodeId::destination(), tx);
        assert!(port.post(NodeEvent::Started));
        assert!(!port.post(NodeEvent::Ended));
        assert_eq!(rx.try_recv().unwrap(), NodeEvent::Started);
    }
}
