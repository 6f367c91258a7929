//! The voice capability consumed by [`VoicePool`](crate::VoicePool).

use cadenza_core::{Destination, NodeCommand, NodeEvent, NodeId, ProcessingNode, Result};

/// A sound-producing node a pool can hand out.
///
/// Voices report their own lifecycle through [`poll_event`](Voice::poll_event);
/// the pool never inspects render-side state.
pub trait Voice {
    fn id(&self) -> &NodeId;

    /// Connect output 0 to `destination`.
    fn connect(&mut self, destination: Destination) -> Result<()>;

    fn disconnect_all(&mut self) -> Result<()>;

    /// Next pending message from the render side, oldest first.
    fn poll_event(&mut self) -> Option<NodeEvent>;

    /// True if the voice fades out on [`release`](Voice::release) and
    /// reports `ended` when done.
    fn supports_release(&self) -> bool {
        false
    }

    /// Begin a graceful stop.
    fn release(&mut self) -> Result<()>;

    /// Silence immediately. No `ended` is reported.
    fn stop(&mut self) -> Result<()>;

    /// Tear down the voice and release its id. Idempotent.
    fn dispose(&mut self);
}

impl Voice for ProcessingNode {
    fn id(&self) -> &NodeId {
        ProcessingNode::id(self)
    }

    fn connect(&mut self, destination: Destination) -> Result<()> {
        ProcessingNode::connect(self, destination, 0, 0)?;
        Ok(())
    }

    fn disconnect_all(&mut self) -> Result<()> {
        ProcessingNode::disconnect_all(self)
    }

    fn poll_event(&mut self) -> Option<NodeEvent> {
        self.try_recv_event()
    }

    fn supports_release(&self) -> bool {
        self.definition().supports_release()
    }

    fn release(&mut self) -> Result<()> {
        self.post(NodeCommand::Stop)
    }

    fn stop(&mut self) -> Result<()> {
        self.post(NodeCommand::Reset)
    }

    fn dispose(&mut self) {
        ProcessingNode::dispose(self);
    }
}
