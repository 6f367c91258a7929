//! Processing node wrapper.
//!
//! A [`ProcessingNode`] is the control-side handle of one unit instance. The
//! engine graph does not report a node's outgoing connections, so the wrapper
//! records them itself and keeps the record in step with every connect and
//! disconnect. Edges the engine dropped on its own (the target was removed)
//! are never reported and are pruned on the next edit.

use crate::context::AudioContext;
use crate::engine::{AudioEngine, Destination, Edge};
use crate::error::{EngineError, Error};
use crate::id::{NodeId, NodeIdRegistry};
use crate::message::{NodeCommand, NodeEvent};
use crate::param::AudioParam;
use crate::unit::{UnitDefinition, UnitOptions};
use crate::Result;
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::sync::Arc;

/// Control-side handle of a unit instance in the graph.
pub struct ProcessingNode {
    id: NodeId,
    definition: Arc<UnitDefinition>,
    engine: Arc<AudioEngine>,
    ids: Arc<NodeIdRegistry>,
    params: Vec<AudioParam>,
    connections: HashMap<Destination, (usize, usize)>,
    events: Receiver<NodeEvent>,
    disposed: bool,
}

impl ProcessingNode {
    /// Create a node of a registered unit.
    ///
    /// Fails with [`Error::UnregisteredUnit`] if `unit` has not been
    /// registered with the context's unit registry.
    pub fn new(context: &AudioContext, unit: &str, options: &UnitOptions) -> Result<Self> {
        if !context.units().has_registered(unit) {
            return Err(Error::UnregisteredUnit(unit.to_string()));
        }
        Self::create(context, unit, options)
    }

    /// Create a node of a unit preloaded into the engine.
    pub(crate) fn native(context: &AudioContext, unit: &str, options: &UnitOptions) -> Result<Self> {
        Self::create(context, unit, options)
    }

    fn create(context: &AudioContext, unit: &str, options: &UnitOptions) -> Result<Self> {
        let engine = Arc::clone(context.engine());
        let ids = Arc::clone(context.ids());

        let id = ids.issue(unit);
        let created = match engine.create_node(id.clone(), unit, options) {
            Ok(created) => created,
            Err(e) => {
                ids.release(&id);
                return Err(e.into());
            }
        };

        let params = created
            .definition
            .descriptors()
            .iter()
            .enumerate()
            .map(|(index, d)| {
                AudioParam::new(
                    id.clone(),
                    index,
                    d.clone(),
                    options.initial_value(d),
                    Arc::clone(&engine),
                )
            })
            .collect();

        Ok(Self {
            id,
            definition: created.definition,
            engine,
            ids,
            params,
            connections: HashMap::new(),
            events: created.events,
            disposed: false,
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Name of the unit this node instantiates.
    pub fn unit(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &Arc<UnitDefinition> {
        &self.definition
    }

    pub fn num_inputs(&self) -> usize {
        self.definition.inputs()
    }

    pub fn num_outputs(&self) -> usize {
        self.definition.outputs()
    }

    pub fn params(&self) -> &[AudioParam] {
        &self.params
    }

    /// Look up a parameter by name.
    pub fn get_param(&self, name: &str) -> Result<AudioParam> {
        self.params
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| Error::ParameterNotFound {
                unit: self.unit().to_string(),
                name: name.to_string(),
            })
    }

    /// Connect `output` of this node to `destination`.
    ///
    /// Connecting an already connected destination again replaces the
    /// recorded indices and the engine edge instead of adding a second one.
    pub fn connect(
        &mut self,
        destination: impl Into<Destination>,
        output: usize,
        input: usize,
    ) -> Result<&mut Self> {
        self.ensure_live()?;
        self.prune_stale();
        let destination = destination.into();
        let edge = Edge::new(self.id.clone(), output, destination.clone(), input);

        if let Some(&(old_output, old_input)) = self.connections.get(&destination) {
            if (old_output, old_input) == (edge.output, edge.input) {
                return Ok(self);
            }
            let old = Edge::new(self.id.clone(), old_output, destination.clone(), old_input);
            self.disconnect_edge(&old)?;
            self.connections.remove(&destination);
        }

        self.engine.connect(edge.clone())?;
        self.connections
            .insert(destination, (edge.output, edge.input));
        Ok(self)
    }

    /// Connect output 0 to input 0 of `destination`.
    pub fn connect_to(&mut self, destination: impl Into<Destination>) -> Result<&mut Self> {
        self.connect(destination, 0, 0)
    }

    /// Remove the recorded connection to `destination`.
    ///
    /// Returns false if no connection to it was recorded.
    pub fn disconnect(&mut self, destination: impl Into<Destination>) -> Result<bool> {
        self.ensure_live()?;
        self.prune_stale();
        let destination = destination.into();
        let Some(&(output, input)) = self.connections.get(&destination) else {
            return Ok(false);
        };

        let edge = Edge::new(self.id.clone(), output, destination.clone(), input);
        self.disconnect_edge(&edge)?;
        self.connections.remove(&destination);
        Ok(true)
    }

    /// Remove every recorded connection.
    ///
    /// Stops at the first engine failure; connections not yet removed stay
    /// recorded.
    pub fn disconnect_all(&mut self) -> Result<()> {
        self.ensure_live()?;
        let destinations: Vec<Destination> = self.connections.keys().cloned().collect();
        for destination in destinations {
            self.disconnect(destination)?;
        }
        Ok(())
    }

    pub fn is_connected(&self, destination: &Destination) -> bool {
        self.connection(destination).is_some()
    }

    /// Recorded `(output, input)` indices for a destination.
    pub fn connection(&self, destination: &Destination) -> Option<(usize, usize)> {
        self.connections
            .get(destination)
            .copied()
            .filter(|&indices| self.has_edge(destination, indices))
    }

    pub fn connections(&self) -> impl Iterator<Item = (&Destination, &(usize, usize))> {
        self.connections
            .iter()
            .filter(move |&(destination, indices)| self.has_edge(destination, *indices))
    }

    pub fn connection_count(&self) -> usize {
        self.connections().count()
    }

    /// Ask the render-side instance to become active or inactive.
    pub fn set_active(&self, active: bool) -> Result<()> {
        self.post(NodeCommand::SetActive { active })
    }

    /// Post a message to the render-side instance.
    pub fn post(&self, command: NodeCommand) -> Result<()> {
        self.ensure_live()?;
        self.engine.post(&self.id, command)?;
        Ok(())
    }

    /// Next message from the render-side instance, if any.
    pub fn try_recv_event(&self) -> Option<NodeEvent> {
        self.events.try_recv().ok()
    }

    /// Drain pending messages from the render-side instance, in order.
    pub fn events(&self) -> impl Iterator<Item = NodeEvent> + '_ {
        self.events.try_iter()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Disconnect, remove the node from the engine and release its id.
    ///
    /// Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Err(e) = self.disconnect_all() {
            tracing::warn!("Disposing {}: {}", self.id, e);
        }
        self.connections.clear();
        match self.engine.remove_node(&self.id) {
            Ok(()) | Err(EngineError::Closed) => {}
            Err(e) => tracing::warn!("Disposing {}: {}", self.id, e),
        }
        self.ids.release(&self.id);
        self.disposed = true;
        tracing::debug!("Disposed node {}", self.id);
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            Err(Error::Disposed(self.id.clone()))
        } else {
            Ok(())
        }
    }

    fn has_edge(&self, destination: &Destination, (output, input): (usize, usize)) -> bool {
        self.engine
            .is_connected(&Edge::new(self.id.clone(), output, destination.clone(), input))
    }

    /// Forget recorded connections whose engine edge is gone.
    fn prune_stale(&mut self) {
        let stale: Vec<Destination> = self
            .connections
            .iter()
            .filter(|&(destination, indices)| !self.has_edge(destination, *indices))
            .map(|(destination, _)| destination.clone())
            .collect();
        for destination in stale {
            tracing::debug!("{}: dropping stale connection to {:?}", self.id, destination);
            self.connections.remove(&destination);
        }
    }

    /// Remove an edge, treating one the engine no longer has as removed.
    fn disconnect_edge(&self, edge: &Edge) -> Result<()> {
        match self.engine.disconnect(edge) {
            Ok(()) | Err(EngineError::NotConnected { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ProcessingNode {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl From<&ProcessingNode> for Destination {
    fn from(node: &ProcessingNode) -> Self {
        Destination::Node(node.id.clone())
    }
}

impl std::fmt::Debug for ProcessingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingNode")
            .field("id", &self.id)
            .field("connections", &self.connections)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}
