//! Control-side parameter handles.

use crate::automation::{AutomationEvent, AutomationOp, AutomationTimeline, RampMethod};
use crate::engine::{AudioEngine, Destination};
use crate::id::NodeId;
use crate::unit::ParamDescriptor;
use crate::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct ParamShared {
    node: NodeId,
    index: usize,
    descriptor: ParamDescriptor,
    engine: Arc<AudioEngine>,
    timeline: Mutex<AutomationTimeline>,
}

/// Automatable parameter of a node.
///
/// Cheap to clone; clones refer to the same parameter. Every schedule call
/// is mirrored locally and forwarded to the renderer, so [`value_at`] reports
/// what the renderer will produce (before modulation inputs are added).
///
/// [`value_at`]: AudioParam::value_at
#[derive(Clone)]
pub struct AudioParam {
    inner: Arc<ParamShared>,
}

impl AudioParam {
    pub(crate) fn new(
        node: NodeId,
        index: usize,
        descriptor: ParamDescriptor,
        initial: f32,
        engine: Arc<AudioEngine>,
    ) -> Self {
        Self {
            inner: Arc::new(ParamShared {
                node,
                index,
                descriptor,
                engine,
                timeline: Mutex::new(AutomationTimeline::new(initial)),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    pub fn node(&self) -> &NodeId {
        &self.inner.node
    }

    pub fn index(&self) -> usize {
        self.inner.index
    }

    pub fn descriptor(&self) -> &ParamDescriptor {
        &self.inner.descriptor
    }

    pub fn default_value(&self) -> f32 {
        self.inner.descriptor.default_value
    }

    pub fn min_value(&self) -> f32 {
        self.inner.descriptor.min_value
    }

    pub fn max_value(&self) -> f32 {
        self.inner.descriptor.max_value
    }

    /// Connection target for modulating this parameter.
    pub fn destination(&self) -> Destination {
        Destination::Param {
            node: self.inner.node.clone(),
            index: self.inner.index,
        }
    }

    /// Current engine time.
    pub fn now(&self) -> f64 {
        self.inner.engine.current_time()
    }

    /// Intrinsic value at the current engine time.
    pub fn value(&self) -> f32 {
        self.value_at(self.now())
    }

    /// Intrinsic value at `time`.
    ///
    /// Unclamped: the renderer clamps the sum of this value and any
    /// connected modulation, so a zeroed controller target reads 0 here even
    /// when its range starts above 0.
    pub fn value_at(&self, time: f64) -> f32 {
        self.inner.timeline.lock().value_at(time)
    }

    /// Jump to `value` now.
    pub fn set_value(&self, value: f32) -> Result<&Self> {
        self.set_value_at_time(value, self.now())
    }

    pub fn set_value_at_time(&self, value: f32, time: f64) -> Result<&Self> {
        self.schedule(AutomationEvent::SetValue { value, time })
    }

    pub fn linear_ramp_to_value_at_time(&self, value: f32, end_time: f64) -> Result<&Self> {
        self.schedule(AutomationEvent::Ramp {
            value,
            end_time,
            method: RampMethod::Linear,
        })
    }

    /// Exponential ramp. Ramps toward or across zero hold their start value.
    pub fn exponential_ramp_to_value_at_time(&self, value: f32, end_time: f64) -> Result<&Self> {
        self.schedule(AutomationEvent::Ramp {
            value,
            end_time,
            method: RampMethod::Exponential,
        })
    }

    pub fn cancel_scheduled_values(&self, time: f64) -> Result<&Self> {
        self.apply(AutomationOp::CancelScheduled { time })
    }

    pub fn cancel_and_hold_at_time(&self, time: f64) -> Result<&Self> {
        self.apply(AutomationOp::CancelAndHold { time })
    }

    /// Snapshot of the scheduled events.
    pub fn events(&self) -> Vec<AutomationEvent> {
        self.inner.timeline.lock().events().to_vec()
    }

    /// True if both handles refer to the same parameter of the same node.
    pub fn same_as(&self, other: &AudioParam) -> bool {
        self.inner.node == other.inner.node && self.inner.index == other.inner.index
    }

    fn schedule(&self, event: AutomationEvent) -> Result<&Self> {
        self.apply(AutomationOp::Schedule { event })
    }

    fn apply(&self, op: AutomationOp) -> Result<&Self> {
        let mut timeline = self.inner.timeline.lock();
        self.inner
            .engine
            .automate(&self.inner.node, self.inner.index, op)?;
        timeline.apply(op);
        timeline.prune_before(self.inner.engine.current_time());
        Ok(self)
    }
}

impl PartialEq for AudioParam {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl From<&AudioParam> for Destination {
    fn from(param: &AudioParam) -> Self {
        param.destination()
    }
}

impl fmt::Debug for AudioParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioParam")
            .field("node", &self.inner.node)
            .field("name", &self.inner.descriptor.name)
            .field("index", &self.inner.index)
            .finish()
    }
}
