//! Test helpers and fixtures for Cadenza integration tests
//!
//! Engines render offline; no output device is opened.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (constants, unity gain)
//! - `RAMP_EPSILON` (1e-5): Interpolated automation
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use cadenza::prelude::*;

pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Small blocks so automation lands within a few of them.
pub const TEST_BLOCK_SIZE: usize = 64;

/// Create a stereo test engine.
pub fn test_engine() -> Cadenza {
    Cadenza::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(TEST_BLOCK_SIZE)
        .build()
        .expect("Failed to create test engine")
}

/// Create a mono test engine, so interleaved output equals channel 0.
pub fn mono_engine() -> Cadenza {
    Cadenza::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(TEST_BLOCK_SIZE)
        .channels(1)
        .build()
        .expect("Failed to create test engine")
}

/// Source unit that outputs its `amount` parameter.
pub fn level_unit() -> UnitDefinition {
    UnitDefinition::per_sample("level", [ParamDescriptor::new("amount", 0.5)], 0, |frame| {
        frame.params[0]
    })
}

/// Seconds covered by `n` blocks.
pub fn blocks(n: usize) -> f64 {
    (n * TEST_BLOCK_SIZE) as f64 / TEST_SAMPLE_RATE
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Assert that a signal has content (not silent).
pub fn assert_has_audio(samples: &[f32], min_rms: f32) {
    let r = rms(samples);
    assert!(
        r >= min_rms,
        "Expected audio content with RMS >= {}, but RMS was {}",
        min_rms,
        r
    );
}
