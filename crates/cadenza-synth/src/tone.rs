//! Sine tone voice with a linear release tail.
//!
//! Reports `started` when started and `ended` once a graceful stop has faded
//! out, which is all a [`VoicePool`](crate::VoicePool) needs to recycle it.

use crate::pool::VoicePool;
use crate::strategy::AllocationStrategy;
use cadenza_core::{
    AudioContext, EventPort, NodeCommand, NodeEvent, ParamDescriptor, ProcessContext, Processor,
    ProcessingNode, UnitDefinition, UnitOptions,
};
use std::f64::consts::TAU;

/// Registered name of the tone voice unit.
pub const TONE_VOICE: &str = "tone-voice";

const FREQUENCY: usize = 0;
const GAIN: usize = 1;
const RELEASE: usize = 2;

/// Unit definition of the tone voice.
///
/// Parameters: `frequency` (Hz), `gain`, `release` (seconds, block rate).
pub fn tone_voice() -> UnitDefinition {
    UnitDefinition::new(TONE_VOICE, |_| Box::new(ToneVoice::default()))
        .with_params([
            ParamDescriptor::new("frequency", 440.0).range(20.0, 20_000.0),
            ParamDescriptor::new("gain", 0.2).range(0.0, 1.0),
            ParamDescriptor::new("release", 0.05)
                .range(0.0, 10.0)
                .block_rate(),
        ])
        .with_io(0, 1)
        .with_release(true)
}

/// Register the tone voice and build a pool of `count` instances.
///
/// Voices are left unconnected.
pub fn tone_pool(
    context: &AudioContext,
    count: usize,
    strategy: impl AllocationStrategy + 'static,
) -> crate::Result<VoicePool<ProcessingNode>> {
    context.register(tone_voice())?;
    VoicePool::from_unit(context, TONE_VOICE, &UnitOptions::new(), count, strategy)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    Playing,
    Releasing,
}

#[derive(Default)]
struct ToneVoice {
    phase: Phase,
    /// Oscillator phase in cycles, 0..1.
    cycle: f64,
    /// Release envelope, 1 while playing.
    level: f32,
}

impl ToneVoice {
    fn finish(&mut self, events: &EventPort) {
        self.phase = Phase::Idle;
        self.level = 0.0;
        events.post(NodeEvent::Ended);
    }
}

impl Processor for ToneVoice {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> bool {
        if self.phase == Phase::Idle {
            ctx.output(0).fill(0.0);
            return true;
        }

        let sample_rate = ctx.sample_rate();
        let release = ctx.param(RELEASE)[0] as f64;
        let step = if release > 0.0 {
            (1.0 / (release * sample_rate)) as f32
        } else {
            1.0
        };

        for frame in 0..ctx.frames() {
            if self.phase == Phase::Releasing {
                self.level = (self.level - step).max(0.0);
            }
            let sample = (self.cycle * TAU).sin() as f32 * ctx.param(GAIN)[frame] * self.level;
            ctx.output(0)[frame] = sample;

            self.cycle = (self.cycle + ctx.param(FREQUENCY)[frame] as f64 / sample_rate).fract();
            if self.phase == Phase::Releasing && self.level == 0.0 {
                ctx.output(0)[frame + 1..].fill(0.0);
                self.finish(ctx.events());
                break;
            }
        }
        true
    }

    fn on_command(&mut self, command: &NodeCommand, events: &EventPort) {
        match command {
            NodeCommand::Start => {
                self.phase = Phase::Playing;
                self.level = 1.0;
                self.cycle = 0.0;
                events.post(NodeEvent::Started);
            }
            NodeCommand::Stop => match self.phase {
                Phase::Playing => self.phase = Phase::Releasing,
                Phase::Releasing => {}
                // Nothing to fade; report at once so the voice is recycled.
                Phase::Idle => {
                    events.post(NodeEvent::Ended);
                }
            },
            NodeCommand::Reset => self.reset(),
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.level = 0.0;
        self.cycle = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_is_valid() {
        let def = tone_voice();
        assert!(def.validate().is_ok());
        assert!(def.supports_release());
        assert_eq!(def.param_index("release"), Some(RELEASE));
        assert_eq!((def.inputs(), def.outputs()), (0, 1));
    }
}
