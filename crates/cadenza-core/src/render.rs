//! Render half of the rendering engine.
//!
//! The [`Renderer`] owns every processor and runs them in topological order,
//! one block at a time. Graph edits arrive through the engine's command queue
//! and apply at block boundaries; automation is evaluated per sample.

use crate::automation::AutomationTimeline;
use crate::config::EngineConfig;
use crate::engine::{Destination, Edge, EngineCommand};
use crate::id::NodeId;
use crate::lockfree::AtomicDouble;
use crate::message::NodeCommand;
use crate::unit::{
    AutomationRate, EventPort, ParamDescriptor, ProcessContext, Processor, UnitDefinition,
    UnitOptions,
};
use crossbeam_channel::{Receiver, Sender};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

struct RenderParam {
    descriptor: ParamDescriptor,
    timeline: AutomationTimeline,
}

/// A node as owned by the renderer.
pub(crate) struct RenderNode {
    id: NodeId,
    processor: Box<dyn Processor>,
    params: Vec<RenderParam>,
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
    param_values: Vec<Vec<f32>>,
    events: EventPort,
    stopped: bool,
}

impl RenderNode {
    pub(crate) fn new(
        id: NodeId,
        definition: &UnitDefinition,
        options: &UnitOptions,
        block_size: usize,
        events: EventPort,
    ) -> Self {
        let params: Vec<RenderParam> = definition
            .descriptors()
            .iter()
            .map(|d| RenderParam {
                descriptor: d.clone(),
                timeline: AutomationTimeline::new(options.initial_value(d)),
            })
            .collect();
        let param_values = params
            .iter()
            .map(|p| vec![p.timeline.value_at(0.0); block_size])
            .collect();

        Self {
            id,
            processor: definition.instantiate(options),
            params,
            inputs: vec![vec![0.0; block_size]; definition.inputs()],
            outputs: vec![vec![0.0; block_size]; definition.outputs()],
            param_values,
            events,
            stopped: false,
        }
    }

    fn silence(&mut self) {
        for buf in &mut self.outputs {
            buf.fill(0.0);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Input { slot: usize, input: usize },
    Param { slot: usize, param: usize },
    Output { channel: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RenderEdge {
    from: usize,
    output: usize,
    to: Target,
}

/// Renders the graph built through the paired
/// [`AudioEngine`](crate::engine::AudioEngine).
///
/// Move it to the audio thread (or drive it directly for offline rendering).
pub struct Renderer {
    config: EngineConfig,
    commands: Receiver<EngineCommand>,
    garbage: Sender<RenderNode>,
    clock: Arc<AtomicDouble>,

    slots: Vec<Option<RenderNode>>,
    index: HashMap<NodeId, usize>,
    free: Vec<usize>,
    edges: Vec<RenderEdge>,
    order: Vec<usize>,
    dirty: bool,

    frame: u64,
    mix: Vec<Vec<f32>>,
    cursor: usize,
}

impl Renderer {
    pub(crate) fn new(
        config: EngineConfig,
        commands: Receiver<EngineCommand>,
        garbage: Sender<RenderNode>,
        clock: Arc<AtomicDouble>,
    ) -> Self {
        let mix = vec![vec![0.0; config.block_size]; config.channels];
        let cursor = config.block_size;
        Self {
            config,
            commands,
            garbage,
            clock,
            slots: Vec::with_capacity(64),
            index: HashMap::with_capacity(64),
            free: Vec::new(),
            edges: Vec::with_capacity(128),
            order: Vec::with_capacity(64),
            dirty: false,
            frame: 0,
            mix,
            cursor,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.config.channels
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Time of the next frame to be rendered, in seconds.
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.config.sample_rate
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    /// Render one block and return it, one buffer per output channel.
    pub fn render_block(&mut self) -> &[Vec<f32>] {
        self.process_block();
        self.cursor = self.config.block_size;
        &self.mix
    }

    /// Fill an interleaved buffer, rendering as many blocks as needed.
    ///
    /// Frames left over from a partially consumed block are used first, so
    /// callers may pass buffers of any length.
    pub fn render(&mut self, output: &mut [f32]) {
        let channels = self.config.channels;
        let block = self.config.block_size;
        let frames = output.len() / channels;

        let mut written = 0;
        while written < frames {
            if self.cursor >= block {
                self.process_block();
                self.cursor = 0;
            }
            let n = (block - self.cursor).min(frames - written);
            for f in 0..n {
                let out = &mut output[(written + f) * channels..(written + f + 1) * channels];
                for (c, sample) in out.iter_mut().enumerate() {
                    *sample = self.mix[c][self.cursor + f];
                }
            }
            self.cursor += n;
            written += n;
        }
    }

    /// Render `seconds` of audio into a new interleaved buffer.
    pub fn render_offline(&mut self, seconds: f64) -> Vec<f32> {
        let frames = (seconds * self.config.sample_rate).round().max(0.0) as usize;
        let mut output = vec![0.0; frames * self.config.channels];
        self.render(&mut output);
        output
    }

    /// Effective value of a parameter at the last rendered frame.
    pub fn param_value(&self, node: &NodeId, name: &str) -> Option<f32> {
        let node = self.node(node)?;
        let index = node.params.iter().position(|p| p.descriptor.name == name)?;
        node.param_values[index].last().copied()
    }

    /// Last rendered block of a node output.
    pub fn node_output(&self, node: &NodeId, output: usize) -> Option<&[f32]> {
        self.node(node)?.outputs.get(output).map(Vec::as_slice)
    }

    fn node(&self, id: &NodeId) -> Option<&RenderNode> {
        self.index
            .get(id)
            .and_then(|&slot| self.slots[slot].as_ref())
    }

    fn process_block(&mut self) {
        self.apply_commands();
        if self.dirty {
            self.rebuild_order();
        }

        let frames = self.config.block_size;
        let sample_rate = self.config.sample_rate;
        let start_time = self.current_time();

        for i in 0..self.order.len() {
            let slot = self.order[i];
            let Some(mut node) = self.slots[slot].take() else {
                continue;
            };

            self.gather(slot, &mut node, start_time);
            if node.stopped {
                node.silence();
            } else {
                let mut ctx = ProcessContext::new(
                    &node.inputs,
                    &mut node.outputs,
                    &node.param_values,
                    frames,
                    self.frame,
                    sample_rate,
                    &node.events,
                );
                if !node.processor.process(&mut ctx) {
                    node.stopped = true;
                    node.silence();
                }
            }

            self.slots[slot] = Some(node);
        }

        self.mix_output();

        for node in self.slots.iter_mut().flatten() {
            for param in &mut node.params {
                param.timeline.prune_before(start_time);
            }
        }

        self.frame += frames as u64;
        self.clock.set(self.current_time());
    }

    /// Fill a node's input buffers and compute its parameter values.
    fn gather(&self, slot: usize, node: &mut RenderNode, start_time: f64) {
        let frames = self.config.block_size;
        let sample_rate = self.config.sample_rate;

        for buf in &mut node.inputs {
            buf.fill(0.0);
        }

        for (p, param) in node.params.iter().enumerate() {
            let values = &mut node.param_values[p];
            match param.descriptor.automation_rate {
                AutomationRate::Block => values.fill(param.timeline.value_at(start_time)),
                AutomationRate::Continuous => {
                    for (f, v) in values.iter_mut().enumerate() {
                        *v = param.timeline.value_at(start_time + f as f64 / sample_rate);
                    }
                }
            }
        }

        for edge in &self.edges {
            let Some(source) = self.slots[edge.from].as_ref() else {
                continue;
            };
            let signal = &source.outputs[edge.output][..frames];
            match edge.to {
                Target::Input { slot: s, input } if s == slot => {
                    for (dst, src) in node.inputs[input].iter_mut().zip(signal) {
                        *dst += src;
                    }
                }
                Target::Param { slot: s, param } if s == slot => {
                    let values = &mut node.param_values[param];
                    match node.params[param].descriptor.automation_rate {
                        AutomationRate::Block => {
                            let first = signal[0];
                            values.iter_mut().for_each(|v| *v += first);
                        }
                        AutomationRate::Continuous => {
                            for (dst, src) in values.iter_mut().zip(signal) {
                                *dst += src;
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        for (param, values) in node.params.iter().zip(&mut node.param_values) {
            for v in values.iter_mut() {
                *v = param.descriptor.clamp(*v);
            }
        }
    }

    fn mix_output(&mut self) {
        let frames = self.config.block_size;
        for buf in &mut self.mix {
            buf.fill(0.0);
        }
        for edge in &self.edges {
            let Target::Output { channel } = edge.to else {
                continue;
            };
            let Some(source) = self.slots[edge.from].as_ref() else {
                continue;
            };
            for (dst, src) in self.mix[channel]
                .iter_mut()
                .zip(&source.outputs[edge.output][..frames])
            {
                *dst += src;
            }
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::AddNode(node) => self.add_node(*node),
                EngineCommand::RemoveNode(id) => self.remove_node(&id),
                EngineCommand::Connect(edge) => {
                    if let Some(edge) = self.resolve(&edge) {
                        if !self.edges.contains(&edge) {
                            self.edges.push(edge);
                            self.dirty = true;
                        }
                    }
                }
                EngineCommand::Disconnect(edge) => {
                    if let Some(edge) = self.resolve(&edge) {
                        self.edges.retain(|e| *e != edge);
                        self.dirty = true;
                    }
                }
                EngineCommand::Automate { node, param, op } => {
                    if let Some(node) = self.node_mut(&node) {
                        if let Some(param) = node.params.get_mut(param) {
                            param.timeline.apply(op);
                        }
                    }
                }
                EngineCommand::Post { node, command } => {
                    if let Some(node) = self.node_mut(&node) {
                        if matches!(command, NodeCommand::Start | NodeCommand::Reset) {
                            node.stopped = false;
                        }
                        node.processor.on_command(&command, &node.events);
                    }
                }
            }
        }
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut RenderNode> {
        let slot = *self.index.get(id)?;
        self.slots[slot].as_mut()
    }

    fn add_node(&mut self, mut node: RenderNode) {
        node.silence();
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.index.insert(node.id.clone(), slot);
        self.slots[slot] = Some(node);
        self.dirty = true;
    }

    fn remove_node(&mut self, id: &NodeId) {
        let Some(slot) = self.index.remove(id) else {
            return;
        };
        self.edges.retain(|e| {
            e.from != slot
                && !matches!(e.to, Target::Input { slot: s, .. } | Target::Param { slot: s, .. } if s == slot)
        });
        if let Some(node) = self.slots[slot].take() {
            // Deallocate on the control side. If its queue is full the node
            // is dropped here instead.
            let _ = self.garbage.try_send(node);
        }
        self.free.push(slot);
        self.dirty = true;
    }

    fn resolve(&self, edge: &Edge) -> Option<RenderEdge> {
        let from = *self.index.get(&edge.from)?;
        let to = match &edge.to {
            Destination::Node(node) if *node == NodeId::destination() => Target::Output {
                channel: edge.input,
            },
            Destination::Node(node) => Target::Input {
                slot: *self.index.get(node)?,
                input: edge.input,
            },
            Destination::Param { node, index } => Target::Param {
                slot: *self.index.get(node)?,
                param: *index,
            },
        };
        Some(RenderEdge {
            from,
            output: edge.output,
            to,
        })
    }

    /// Kahn's algorithm over node-to-node edges.
    fn rebuild_order(&mut self) {
        let mut in_degree = vec![0usize; self.slots.len()];
        for edge in &self.edges {
            match edge.to {
                Target::Input { slot, .. } | Target::Param { slot, .. } => in_degree[slot] += 1,
                Target::Output { .. } => {}
            }
        }

        let mut queue: VecDeque<usize> = (0..self.slots.len())
            .filter(|&s| self.slots[s].is_some() && in_degree[s] == 0)
            .collect();

        self.order.clear();
        while let Some(slot) = queue.pop_front() {
            self.order.push(slot);
            for edge in self.edges.iter().filter(|e| e.from == slot) {
                if let Target::Input { slot: to, .. } | Target::Param { slot: to, .. } = edge.to {
                    in_degree[to] -= 1;
                    if in_degree[to] == 0 {
                        queue.push_back(to);
                    }
                }
            }
        }
        self.dirty = false;
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.config)
            .field("frame", &self.frame)
            .field("nodes", &self.index.len())
            .field("edges", &self.edges.len())
            .finish_non_exhaustive()
    }
}
