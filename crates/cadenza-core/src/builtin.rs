//! Native units preloaded into every engine.

use crate::unit::{ParamDescriptor, ProcessContext, Processor, UnitDefinition};

/// Constant source: outputs its `offset` parameter.
pub const CONSTANT_UNIT: &str = "constant";

/// Gain stage: multiplies its input by its `gain` parameter.
pub const GAIN_UNIT: &str = "gain";

pub(crate) fn constant_source() -> UnitDefinition {
    UnitDefinition::new(CONSTANT_UNIT, |_| Box::new(ConstantSource))
        .with_param(ParamDescriptor::new("offset", 1.0))
        .with_io(0, 1)
}

pub(crate) fn gain() -> UnitDefinition {
    UnitDefinition::new(GAIN_UNIT, |_| Box::new(Gain))
        .with_param(ParamDescriptor::new("gain", 1.0))
        .with_io(1, 1)
}

/// Units every engine starts with.
pub(crate) fn natives() -> [UnitDefinition; 2] {
    [constant_source(), gain()]
}

struct ConstantSource;

impl Processor for ConstantSource {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> bool {
        for frame in 0..ctx.frames() {
            let offset = ctx.param(0)[frame];
            ctx.output(0)[frame] = offset;
        }
        true
    }
}

struct Gain;

impl Processor for Gain {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> bool {
        for frame in 0..ctx.frames() {
            let sample = ctx.input(0)[frame] * ctx.param(0)[frame];
            ctx.output(0)[frame] = sample;
        }
        true
    }
}
