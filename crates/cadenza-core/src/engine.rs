//! Control half of the rendering engine.
//!
//! [`AudioEngine`] validates graph edits against a control-side copy of the
//! topology and forwards them to the [`Renderer`] through a single ordered
//! command queue. It never touches render state directly.

use crate::automation::AutomationOp;
use crate::builtin;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::id::NodeId;
use crate::lockfree::{AtomicDouble, AtomicFlag};
use crate::message::{NodeCommand, NodeEvent};
use crate::render::{RenderNode, Renderer};
use crate::unit::{EventPort, UnitDefinition, UnitOptions};
use crate::Result;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const MODULE_SCHEME: &str = "cadenza-module";

/// Removed render nodes waiting for the control side to drop them.
pub(crate) const GARBAGE_CAPACITY: usize = 256;

/// A unit definition packaged for loading into an engine.
#[derive(Debug, Clone)]
pub struct UnitModule {
    url: String,
    definition: Arc<UnitDefinition>,
}

impl UnitModule {
    /// Package a definition under `cadenza-module://<name>/<serial>`.
    pub fn new(definition: Arc<UnitDefinition>, serial: u64) -> Self {
        Self {
            url: format!("{MODULE_SCHEME}://{}/{serial}", definition.name()),
            definition,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &Arc<UnitDefinition> {
        &self.definition
    }
}

/// Receipt for a loaded module, used to release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHandle {
    name: String,
    url: String,
}

impl ModuleHandle {
    /// Handle identifying a loaded module.
    pub fn new(module: &UnitModule) -> Self {
        Self {
            name: module.name().to_string(),
            url: module.url().to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Loads unit modules into a rendering engine.
pub trait ModuleLoader: Send + Sync {
    fn load_module(&self, module: UnitModule) -> core::result::Result<ModuleHandle, EngineError>;

    /// Unload a module. Existing nodes of the unit keep running.
    fn release_module(&self, handle: &ModuleHandle);
}

/// Where a connection lands: a node input or one of a node's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Node(NodeId),
    Param { node: NodeId, index: usize },
}

impl Destination {
    /// The engine's output. Input `c` feeds output channel `c`.
    pub fn output() -> Self {
        Self::Node(NodeId::destination())
    }

    pub fn node(&self) -> &NodeId {
        match self {
            Self::Node(node) | Self::Param { node, .. } => node,
        }
    }
}

/// A directed connection from a node output to a destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: NodeId,
    pub output: usize,
    pub to: Destination,
    /// Input index on the target node; always 0 for parameter targets.
    pub input: usize,
}

impl Edge {
    pub fn new(from: NodeId, output: usize, to: Destination, input: usize) -> Self {
        let input = match to {
            Destination::Node(_) => input,
            Destination::Param { .. } => 0,
        };
        Self {
            from,
            output,
            to,
            input,
        }
    }
}

/// Control -> render graph command.
pub(crate) enum EngineCommand {
    AddNode(Box<RenderNode>),
    RemoveNode(NodeId),
    Connect(Edge),
    Disconnect(Edge),
    Automate {
        node: NodeId,
        param: usize,
        op: AutomationOp,
    },
    Post {
        node: NodeId,
        command: NodeCommand,
    },
}

/// Channels handed back for a newly created node.
#[derive(Debug)]
pub struct CreatedNode {
    pub definition: Arc<UnitDefinition>,
    pub events: Receiver<NodeEvent>,
}

#[derive(Debug, Clone, Copy)]
struct NodeShape {
    inputs: usize,
    outputs: usize,
    params: usize,
}

#[derive(Debug, Default)]
struct Topology {
    nodes: HashMap<NodeId, NodeShape>,
    edges: HashSet<Edge>,
}

impl Topology {
    /// True if `target` is reachable from `start` along existing edges.
    fn reaches(&self, start: &NodeId, target: &NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(
                self.edges
                    .iter()
                    .filter(|e| &e.from == current)
                    .map(|e| e.to.node()),
            );
        }
        false
    }

    fn validate(&self, edge: &Edge) -> core::result::Result<(), EngineError> {
        let source = self
            .nodes
            .get(&edge.from)
            .ok_or_else(|| EngineError::UnknownNode(edge.from.clone()))?;
        if edge.output >= source.outputs {
            return Err(EngineError::InvalidOutput {
                node: edge.from.clone(),
                output: edge.output,
            });
        }

        let target_id = edge.to.node();
        let target = self
            .nodes
            .get(target_id)
            .ok_or_else(|| EngineError::UnknownNode(target_id.clone()))?;
        match edge.to {
            Destination::Node(_) if edge.input >= target.inputs => {
                return Err(EngineError::InvalidInput {
                    node: target_id.clone(),
                    input: edge.input,
                });
            }
            Destination::Param { index, .. } if index >= target.params => {
                return Err(EngineError::InvalidParam {
                    node: target_id.clone(),
                    param: index,
                });
            }
            _ => {}
        }

        if &edge.from == target_id || self.reaches(target_id, &edge.from) {
            return Err(EngineError::CycleDetected {
                from: edge.from.clone(),
                to: target_id.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct LoadedModule {
    url: String,
    definition: Arc<UnitDefinition>,
}

/// Control-side handle of the rendering engine.
///
/// Shared via `Arc`; all methods take `&self`.
pub struct AudioEngine {
    config: EngineConfig,
    commands: Sender<EngineCommand>,
    garbage: Receiver<RenderNode>,
    clock: Arc<AtomicDouble>,
    closed: AtomicFlag,
    modules: DashMap<String, LoadedModule>,
    topology: Mutex<Topology>,
}

impl AudioEngine {
    /// Create an engine and the renderer it drives.
    pub fn new(config: EngineConfig) -> Result<(Self, Renderer)> {
        config.validate()?;

        let (command_tx, command_rx) = unbounded();
        let (garbage_tx, garbage_rx) = bounded(GARBAGE_CAPACITY);
        let clock = Arc::new(AtomicDouble::new(0.0));

        let mut topology = Topology::default();
        topology.nodes.insert(
            NodeId::destination(),
            NodeShape {
                inputs: config.channels,
                outputs: 0,
                params: 0,
            },
        );

        let modules = DashMap::new();
        for definition in builtin::natives() {
            let name = definition.name().to_string();
            modules.insert(
                name.clone(),
                LoadedModule {
                    url: format!("{MODULE_SCHEME}://native/{name}"),
                    definition: Arc::new(definition),
                },
            );
        }

        let renderer = Renderer::new(config.clone(), command_rx, garbage_tx, Arc::clone(&clock));
        tracing::debug!(
            "Audio engine created: {} Hz, {} frames/block, {} channels",
            config.sample_rate,
            config.block_size,
            config.channels
        );

        let engine = Self {
            config,
            commands: command_tx,
            garbage: garbage_rx,
            clock,
            closed: AtomicFlag::new(false),
            modules,
            topology: Mutex::new(topology),
        };
        Ok((engine, renderer))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Engine time in seconds: the start of the next block to be rendered.
    pub fn current_time(&self) -> f64 {
        self.clock.get()
    }

    pub fn destination(&self) -> Destination {
        Destination::output()
    }

    /// Stop accepting edits. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true) {
            tracing::debug!("Audio engine closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Definition of a loaded module.
    pub fn module(&self, name: &str) -> Option<Arc<UnitDefinition>> {
        self.modules.get(name).map(|m| Arc::clone(&m.definition))
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Number of live nodes, excluding the destination.
    pub fn node_count(&self) -> usize {
        self.topology.lock().nodes.len() - 1
    }

    pub fn edge_count(&self) -> usize {
        self.topology.lock().edges.len()
    }

    pub fn is_connected(&self, edge: &Edge) -> bool {
        self.topology.lock().edges.contains(edge)
    }

    /// Instantiate a loaded unit as a new node.
    ///
    /// The processor is built here, on the control side; the renderer only
    /// receives the finished node.
    pub fn create_node(
        &self,
        id: NodeId,
        unit: &str,
        options: &UnitOptions,
    ) -> core::result::Result<CreatedNode, EngineError> {
        self.ensure_open()?;
        self.collect_garbage();

        let definition = self
            .module(unit)
            .ok_or_else(|| EngineError::UnknownModule(unit.to_string()))?;

        let mut topology = self.topology.lock();
        if topology.nodes.contains_key(&id) {
            return Err(EngineError::DuplicateNode(id));
        }

        let (event_tx, event_rx) = bounded(self.config.event_capacity);
        let node = RenderNode::new(
            id.clone(),
            &definition,
            options,
            self.config.block_size,
            EventPort::new(id.clone(), event_tx),
        );
        self.send(EngineCommand::AddNode(Box::new(node)))?;

        topology.nodes.insert(
            id.clone(),
            NodeShape {
                inputs: definition.inputs(),
                outputs: definition.outputs(),
                params: definition.descriptors().len(),
            },
        );
        tracing::debug!("Created node {} ({})", id, unit);

        Ok(CreatedNode {
            definition,
            events: event_rx,
        })
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&self, id: &NodeId) -> core::result::Result<(), EngineError> {
        self.ensure_open()?;
        if *id == NodeId::destination() {
            return Err(EngineError::UnknownNode(id.clone()));
        }

        let mut topology = self.topology.lock();
        if !topology.nodes.contains_key(id) {
            return Err(EngineError::UnknownNode(id.clone()));
        }
        self.send(EngineCommand::RemoveNode(id.clone()))?;
        topology.nodes.remove(id);
        topology
            .edges
            .retain(|e| &e.from != id && e.to.node() != id);
        drop(topology);

        tracing::debug!("Removed node {}", id);
        self.collect_garbage();
        Ok(())
    }

    /// Add an edge. Connecting an existing edge again is a no-op.
    pub fn connect(&self, edge: Edge) -> core::result::Result<(), EngineError> {
        self.ensure_open()?;
        let mut topology = self.topology.lock();
        topology.validate(&edge)?;
        if topology.edges.contains(&edge) {
            return Ok(());
        }

        self.send(EngineCommand::Connect(edge.clone()))?;
        tracing::debug!(
            "Connected {}:{} -> {:?}:{}",
            edge.from,
            edge.output,
            edge.to,
            edge.input
        );
        topology.edges.insert(edge);
        Ok(())
    }

    pub fn disconnect(&self, edge: &Edge) -> core::result::Result<(), EngineError> {
        self.ensure_open()?;
        let mut topology = self.topology.lock();
        if !topology.edges.contains(edge) {
            return Err(EngineError::NotConnected {
                from: edge.from.clone(),
                to: edge.to.node().clone(),
            });
        }

        self.send(EngineCommand::Disconnect(edge.clone()))?;
        topology.edges.remove(edge);
        tracing::debug!("Disconnected {} -> {:?}", edge.from, edge.to);
        Ok(())
    }

    /// Forward an automation op to the render copy of a parameter timeline.
    pub fn automate(
        &self,
        node: &NodeId,
        param: usize,
        op: AutomationOp,
    ) -> core::result::Result<(), EngineError> {
        self.ensure_open()?;
        let topology = self.topology.lock();
        let shape = topology
            .nodes
            .get(node)
            .ok_or_else(|| EngineError::UnknownNode(node.clone()))?;
        if param >= shape.params {
            return Err(EngineError::InvalidParam {
                node: node.clone(),
                param,
            });
        }
        self.send(EngineCommand::Automate {
            node: node.clone(),
            param,
            op,
        })
    }

    /// Post a message to a node's processor.
    pub fn post(&self, node: &NodeId, command: NodeCommand) -> core::result::Result<(), EngineError> {
        self.ensure_open()?;
        let topology = self.topology.lock();
        if !topology.nodes.contains_key(node) || *node == NodeId::destination() {
            return Err(EngineError::UnknownNode(node.clone()));
        }
        tracing::trace!("Posting {:?} to {}", command, node);
        self.send(EngineCommand::Post {
            node: node.clone(),
            command,
        })
    }

    fn ensure_open(&self) -> core::result::Result<(), EngineError> {
        if self.closed.get() {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn send(&self, command: EngineCommand) -> core::result::Result<(), EngineError> {
        self.commands.send(command).map_err(|_| {
            // Renderer dropped: nothing can be rendered any more.
            self.closed.set(true);
            EngineError::Closed
        })
    }

    /// Drop render nodes the renderer handed back.
    fn collect_garbage(&self) {
        let released = self.garbage.try_iter().count();
        if released > 0 {
            tracing::trace!("Released {} render nodes", released);
        }
    }
}

impl ModuleLoader for AudioEngine {
    fn load_module(&self, module: UnitModule) -> core::result::Result<ModuleHandle, EngineError> {
        self.ensure_open()?;
        let name = module.name().to_string();
        module
            .definition()
            .validate()
            .map_err(|reason| EngineError::MalformedModule {
                name: name.clone(),
                reason,
            })?;

        match self.modules.entry(name.clone()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateModule(name)),
            Entry::Vacant(slot) => {
                tracing::debug!("Loaded module {}", module.url());
                let handle = ModuleHandle::new(&module);
                slot.insert(LoadedModule {
                    url: module.url,
                    definition: module.definition,
                });
                Ok(handle)
            }
        }
    }

    fn release_module(&self, handle: &ModuleHandle) {
        if self
            .modules
            .remove_if(&handle.name, |_, m| m.url == handle.url)
            .is_some()
        {
            tracing::debug!("Released module {}", handle.url);
        }
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("config", &self.config)
            .field("current_time", &self.current_time())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{CONSTANT_UNIT, GAIN_UNIT};
    use crate::unit::ParamDescriptor;

    fn engine() -> (AudioEngine, Renderer) {
        AudioEngine::new(EngineConfig::default()).unwrap()
    }

    fn node(engine: &AudioEngine, seq: &str, unit: &str) -> NodeId {
        let id: NodeId = serde_json::from_str(&format!("\"{seq}-{unit}\"")).unwrap();
        engine.create_node(id.clone(), unit, &UnitOptions::new()).unwrap();
        id
    }

    #[test]
    fn test_natives_preloaded() {
        let (engine, _renderer) = engine();
        assert!(engine.has_module(CONSTANT_UNIT));
        assert!(engine.has_module(GAIN_UNIT));
        assert_eq!(engine.node_count(), 0);
    }

    #[test]
    fn test_load_module_rejects_duplicates_and_malformed() {
        let (engine, _renderer) = engine();
        let def = Arc::new(UnitDefinition::per_sample("noise", [], 0, |_| 0.0));

        let handle = engine.load_module(UnitModule::new(Arc::clone(&def), 1)).unwrap();
        assert_eq!(handle.url(), "cadenza-module://noise/1");
        assert_eq!(
            engine.load_module(UnitModule::new(def, 2)),
            Err(EngineError::DuplicateModule("noise".to_string()))
        );

        let bad = UnitDefinition::per_sample(
            "bad",
            [ParamDescriptor::new("x", 2.0).range(0.0, 1.0)],
            0,
            |_| 0.0,
        );
        assert!(matches!(
            engine.load_module(UnitModule::new(Arc::new(bad), 3)),
            Err(EngineError::MalformedModule { .. })
        ));

        engine.release_module(&handle);
        assert!(!engine.has_module("noise"));
    }

    #[test]
    fn test_connect_validates_ports() {
        let (engine, _renderer) = engine();
        let src = node(&engine, "1", CONSTANT_UNIT);
        let gain = node(&engine, "2", GAIN_UNIT);

        assert!(matches!(
            engine.connect(Edge::new(src.clone(), 1, Destination::Node(gain.clone()), 0)),
            Err(EngineError::InvalidOutput { .. })
        ));
        assert!(matches!(
            engine.connect(Edge::new(src.clone(), 0, Destination::Node(gain.clone()), 3)),
            Err(EngineError::InvalidInput { .. })
        ));
        assert!(matches!(
            engine.connect(Edge::new(
                src.clone(),
                0,
                Destination::Param {
                    node: gain.clone(),
                    index: 5
                },
                0
            )),
            Err(EngineError::InvalidParam { .. })
        ));

        let edge = Edge::new(src, 0, Destination::Node(gain), 0);
        engine.connect(edge.clone()).unwrap();
        engine.connect(edge.clone()).unwrap();
        assert_eq!(engine.edge_count(), 1);
        assert!(engine.is_connected(&edge));
    }

    #[test]
    fn test_cycles_rejected() {
        let (engine, _renderer) = engine();
        let a = node(&engine, "1", GAIN_UNIT);
        let b = node(&engine, "2", GAIN_UNIT);

        engine
            .connect(Edge::new(a.clone(), 0, Destination::Node(b.clone()), 0))
            .unwrap();
        assert!(matches!(
            engine.connect(Edge::new(
                b.clone(),
                0,
                Destination::Param {
                    node: a.clone(),
                    index: 0
                },
                0
            )),
            Err(EngineError::CycleDetected { .. })
        ));
        assert!(matches!(
            engine.connect(Edge::new(a.clone(), 0, Destination::Node(a), 0)),
            Err(EngineError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_remove_node_drops_edges() {
        let (engine, _renderer) = engine();
        let src = node(&engine, "1", CONSTANT_UNIT);
        engine
            .connect(Edge::new(src.clone(), 0, Destination::output(), 1))
            .unwrap();
        engine.remove_node(&src).unwrap();
        assert_eq!(engine.edge_count(), 0);
        assert_eq!(
            engine.remove_node(&src),
            Err(EngineError::UnknownNode(src))
        );
    }

    #[test]
    fn test_disconnect_unknown_edge() {
        let (engine, _renderer) = engine();
        let src = node(&engine, "1", CONSTANT_UNIT);
        let edge = Edge::new(src, 0, Destination::output(), 0);
        assert!(matches!(
            engine.disconnect(&edge),
            Err(EngineError::NotConnected { .. })
        ));
    }

    #[test]
    fn test_closed_engine_rejects_edits() {
        let (engine, renderer) = engine();
        engine.close();
        assert_eq!(
            engine.post(&NodeId::destination(), NodeCommand::Start),
            Err(EngineError::Closed)
        );
        drop(renderer);
    }

    #[test]
    fn test_dropped_renderer_closes_engine() {
        let (engine, renderer) = engine();
        drop(renderer);
        let id: NodeId = serde_json::from_str("\"1-gain\"").unwrap();
        assert_eq!(
            engine.create_node(id, GAIN_UNIT, &UnitOptions::new()).err(),
            Some(EngineError::Closed)
        );
        assert!(engine.is_closed());
    }
}
