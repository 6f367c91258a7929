//! Parameter controller.
//!
//! Drives any number of target parameters from one automated value. A
//! constant source carries the value; each target is fed directly or, when
//! its scale factor is not 1, through its own gain stage. All targets follow
//! the same schedule in lockstep.

use crate::automation::{exponential_floor, RampMethod, MIN_EXPONENTIAL_VALUE};
use crate::builtin::{CONSTANT_UNIT, GAIN_UNIT};
use crate::context::AudioContext;
use crate::node::ProcessingNode;
use crate::param::AudioParam;
use crate::unit::UnitOptions;
use crate::Result;

struct ControlTarget {
    param: AudioParam,
    scale: f32,
    stage: Option<ProcessingNode>,
}

/// One logical control value fanned out to several parameters.
///
/// Operations never fail: engine errors are logged and the call does
/// nothing. After [`dispose`](Self::dispose) every operation is a no-op.
pub struct ParamController {
    context: AudioContext,
    source: Option<ProcessingNode>,
    targets: Vec<ControlTarget>,
    held: f32,
}

impl ParamController {
    pub fn new(context: &AudioContext, initial: f32) -> Result<Self> {
        let source = ProcessingNode::native(
            context,
            CONSTANT_UNIT,
            &UnitOptions::new().param("offset", initial),
        )?;
        Ok(Self {
            context: context.clone(),
            source: Some(source),
            targets: Vec::new(),
            held: initial,
        })
    }

    fn offset(&self) -> Option<AudioParam> {
        self.source.as_ref().and_then(|s| s.params().first().cloned())
    }

    /// Drive `param` from this controller, multiplied by `scale`.
    ///
    /// The target's own intrinsic value is zeroed so it follows the
    /// controller exactly. Automation already scheduled on the controller is
    /// untouched.
    pub fn add_target(&mut self, param: &AudioParam, scale: f32) -> &mut Self {
        if self.source.is_none() {
            return self;
        }
        self.remove_target(param);

        let now = self.context.current_time();
        if let Err(e) = param
            .cancel_scheduled_values(now)
            .and_then(|p| p.set_value_at_time(0.0, now))
        {
            tracing::warn!("Controller target {:?}: {}", param, e);
            return self;
        }

        match self.wire(param, scale) {
            Ok(stage) => self.targets.push(ControlTarget {
                param: param.clone(),
                scale,
                stage,
            }),
            Err(e) => tracing::warn!("Controller target {:?}: {}", param, e),
        }
        self
    }

    fn wire(&mut self, param: &AudioParam, scale: f32) -> Result<Option<ProcessingNode>> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        if scale == 1.0 {
            source.connect_to(param)?;
            return Ok(None);
        }

        let mut stage = ProcessingNode::native(
            &self.context,
            GAIN_UNIT,
            &UnitOptions::new().param("gain", scale),
        )?;
        stage.connect_to(param)?;
        source.connect_to(&stage)?;
        Ok(Some(stage))
    }

    /// Stop driving `param`. Returns false if it was not a target.
    pub fn remove_target(&mut self, param: &AudioParam) -> bool {
        let Some(pos) = self.targets.iter().position(|t| t.param.same_as(param)) else {
            return false;
        };
        let target = self.targets.remove(pos);
        if let Some(source) = self.source.as_mut() {
            let result = match &target.stage {
                Some(stage) => source.disconnect(stage),
                None => source.disconnect(&target.param),
            };
            if let Err(e) = result {
                tracing::warn!("Removing controller target {:?}: {}", target.param, e);
            }
        }
        // Dropping the stage disposes it.
        true
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Scale factors of the current targets, in insertion order.
    pub fn scales(&self) -> Vec<f32> {
        self.targets.iter().map(|t| t.scale).collect()
    }

    /// Jump to `value` now, cancelling scheduled automation.
    pub fn set_value(&mut self, value: f32) -> &mut Self {
        self.set_value_with(value, true)
    }

    /// Jump to `value` now. With `cancel_scheduled` false, automation
    /// scheduled after now is kept.
    pub fn set_value_with(&mut self, value: f32, cancel_scheduled: bool) -> &mut Self {
        let Some(offset) = self.offset() else {
            return self;
        };
        let now = self.context.current_time();
        let result = if cancel_scheduled {
            offset
                .cancel_and_hold_at_time(now)
                .and_then(|p| p.set_value_at_time(value, now))
        } else {
            offset.set_value_at_time(value, now)
        };
        if let Err(e) = result {
            tracing::warn!("Controller set_value({}) dropped: {}", value, e);
        }
        self
    }

    /// Ramp to `target` over `duration` seconds, cancelling scheduled
    /// automation.
    pub fn ramp(&mut self, target: f32, duration: f64, method: RampMethod) -> &mut Self {
        self.ramp_with(target, duration, method, true)
    }

    /// Ramp to `target` over `duration` seconds.
    ///
    /// When cancelling, the current value is held and re-anchored at now, so
    /// the ramp starts from where the controller actually is. Without
    /// cancelling, the ramp is appended to the existing schedule and starts
    /// from its last event. Exponential ramps never reach zero: targets and
    /// anchors below 1e-6 are lifted to 1e-6.
    pub fn ramp_with(
        &mut self,
        target: f32,
        duration: f64,
        method: RampMethod,
        cancel_scheduled: bool,
    ) -> &mut Self {
        let Some(offset) = self.offset() else {
            return self;
        };
        let now = self.context.current_time();
        let end = now + duration.max(0.0);
        let target = match method {
            RampMethod::Linear => target,
            RampMethod::Exponential => exponential_floor(target),
        };

        let result = schedule_ramp(&offset, now, target, end, method, cancel_scheduled);
        if let Err(e) = result {
            tracing::warn!("Controller ramp to {} dropped: {}", target, e);
        }
        self
    }

    /// Scheduled value at the current engine time.
    pub fn value(&self) -> f32 {
        self.value_at(self.context.current_time())
    }

    /// Scheduled value at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        match self.offset() {
            Some(offset) => offset.value_at(time),
            None => self.held,
        }
    }

    /// The parameter carrying the controller value, until disposed.
    pub fn param(&self) -> Option<AudioParam> {
        self.offset()
    }

    pub fn is_disposed(&self) -> bool {
        self.source.is_none()
    }

    /// Tear down the source and scaling stages. Idempotent.
    pub fn dispose(&mut self) {
        let Some(mut source) = self.source.take() else {
            return;
        };
        self.held = source
            .params()
            .first()
            .map(|p| p.value())
            .unwrap_or(self.held);
        for mut target in self.targets.drain(..) {
            if let Some(stage) = target.stage.as_mut() {
                stage.dispose();
            }
        }
        source.dispose();
        tracing::debug!("Parameter controller disposed");
    }
}

fn schedule_ramp(
    offset: &AudioParam,
    now: f64,
    target: f32,
    end: f64,
    method: RampMethod,
    cancel_scheduled: bool,
) -> Result<()> {
    if cancel_scheduled {
        let current = offset.value_at(now);
        let anchor = match method {
            RampMethod::Exponential if current < MIN_EXPONENTIAL_VALUE => MIN_EXPONENTIAL_VALUE,
            _ => current,
        };
        offset
            .cancel_and_hold_at_time(now)?
            .set_value_at_time(anchor, now)?;
    }
    match method {
        RampMethod::Linear => offset.linear_ramp_to_value_at_time(target, end)?,
        RampMethod::Exponential => offset.exponential_ramp_to_value_at_time(target, end)?,
    };
    Ok(())
}

impl Drop for ParamController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ParamController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamController")
            .field("source", &self.source.as_ref().map(|s| s.id().clone()))
            .field("targets", &self.targets.len())
            .finish_non_exhaustive()
    }
}
