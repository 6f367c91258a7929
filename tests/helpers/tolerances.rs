//! Tolerance constants for audio testing.

/// Floating point rounding errors (constant sources, exact gain).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Per-sample ramp interpolation, accumulated in f64 and rounded to f32.
pub const RAMP_EPSILON: f32 = 1e-5;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;
