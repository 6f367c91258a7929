//! Sample-accurate automation timelines.
//!
//! An [`AutomationTimeline`] is a sorted list of scheduled events evaluated at
//! arbitrary times. The control side and the renderer each own a copy of a
//! parameter's timeline and apply the same [`AutomationOp`] stream to it, so
//! both agree on the value at any instant without sharing memory.

use serde::{Deserialize, Serialize};

/// Smallest magnitude an exponential ramp may target.
pub const MIN_EXPONENTIAL_VALUE: f32 = 1e-6;

/// Interpolation used by a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RampMethod {
    #[default]
    Linear,
    Exponential,
}

/// A scheduled change on a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AutomationEvent {
    /// Jump to `value` at `time`.
    SetValue { value: f32, time: f64 },
    /// Ramp from the previous event to `value`, arriving at `end_time`.
    Ramp {
        value: f32,
        end_time: f64,
        method: RampMethod,
    },
}

impl AutomationEvent {
    /// Time at which the event's value is reached.
    #[inline]
    pub fn time(&self) -> f64 {
        match *self {
            Self::SetValue { time, .. } => time,
            Self::Ramp { end_time, .. } => end_time,
        }
    }

    #[inline]
    pub fn value(&self) -> f32 {
        match *self {
            Self::SetValue { value, .. } | Self::Ramp { value, .. } => value,
        }
    }
}

/// Operation applied identically to the control and render copies of a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum AutomationOp {
    Schedule { event: AutomationEvent },
    /// Remove every event at or after `time`.
    CancelScheduled { time: f64 },
    /// Freeze the trajectory at `time` and drop everything scheduled after it.
    CancelAndHold { time: f64 },
}

/// Sorted list of automation events with a fallback default value.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationTimeline {
    default: f32,
    events: Vec<AutomationEvent>,
}

impl AutomationTimeline {
    pub fn new(default: f32) -> Self {
        Self {
            default,
            events: Vec::with_capacity(16),
        }
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn apply(&mut self, op: AutomationOp) {
        match op {
            AutomationOp::Schedule { event } => self.schedule(event),
            AutomationOp::CancelScheduled { time } => self.cancel_scheduled(time),
            AutomationOp::CancelAndHold { time } => self.cancel_and_hold(time),
        }
    }

    /// Insert an event, keeping events ordered by time. Events sharing a time
    /// keep their scheduling order.
    pub fn schedule(&mut self, event: AutomationEvent) {
        let time = event.time();
        let index = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(index, event);
    }

    pub fn cancel_scheduled(&mut self, time: f64) {
        let index = self.events.partition_point(|e| e.time() < time);
        self.events.truncate(index);
    }

    /// Hold the value the timeline has at `time`.
    ///
    /// A ramp in progress at `time` is truncated to end there with the same
    /// curve, so the trajectory before `time` is unchanged.
    pub fn cancel_and_hold(&mut self, time: f64) {
        let held = self.value_at(time);
        let index = self.events.partition_point(|e| e.time() < time);

        let in_progress = match self.events.get(index) {
            Some(&AutomationEvent::Ramp { method, end_time, .. }) if end_time > time => {
                Some(method)
            }
            _ => None,
        };

        self.events.truncate(index);
        let anchor = match in_progress {
            Some(method) => AutomationEvent::Ramp {
                value: held,
                end_time: time,
                method,
            },
            None => AutomationEvent::SetValue { value: held, time },
        };
        self.events.push(anchor);
    }

    /// Drop events that can no longer influence values at or after `time`,
    /// keeping the last completed event as the anchor.
    pub fn prune_before(&mut self, time: f64) {
        let completed = self.events.partition_point(|e| e.time() <= time);
        if completed > 1 {
            let anchor = AutomationEvent::SetValue {
                value: self.events[completed - 1].value(),
                time: self.events[completed - 1].time(),
            };
            self.events.drain(..completed - 1);
            self.events[0] = anchor;
        }
    }

    /// Value of the timeline at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let mut value = self.default;
        let mut start = f64::NEG_INFINITY;

        for event in &self.events {
            match *event {
                AutomationEvent::SetValue { value: v, time: t } => {
                    if t > time {
                        break;
                    }
                    value = v;
                    start = t;
                }
                AutomationEvent::Ramp {
                    value: target,
                    end_time,
                    method,
                } => {
                    if end_time <= time {
                        value = target;
                        start = end_time;
                        continue;
                    }
                    if !start.is_finite() || end_time <= start {
                        // No anchor before the ramp: hold until it ends.
                        return value;
                    }
                    let progress = ((time - start) / (end_time - start)).clamp(0.0, 1.0) as f32;
                    return interpolate(value, target, progress, method);
                }
            }
        }

        value
    }
}

impl Default for AutomationTimeline {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[inline]
fn interpolate(from: f32, to: f32, progress: f32, method: RampMethod) -> f32 {
    match method {
        RampMethod::Linear => from + (to - from) * progress,
        RampMethod::Exponential => {
            // Undefined across or at zero: hold the start value.
            if from == 0.0 || to == 0.0 || (from < 0.0) != (to < 0.0) {
                from
            } else {
                from * (to / from).powf(progress)
            }
        }
    }
}

/// Clamp an exponential ramp endpoint to the smallest positive magnitude.
#[inline]
pub fn exponential_floor(value: f32) -> f32 {
    if value.is_nan() || value < MIN_EXPONENTIAL_VALUE {
        MIN_EXPONENTIAL_VALUE
    } else {
        value
    }
}
