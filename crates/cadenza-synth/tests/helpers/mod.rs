//! Shared fixtures for cadenza-synth integration tests.

#![allow(dead_code)]

use cadenza_core::*;

pub const TEST_BLOCK_SIZE: usize = 64;

/// Values below this are considered silent (~-80dB).
pub const SILENCE_THRESHOLD: f32 = 0.0001;

pub fn test_context() -> (AudioContext, Renderer) {
    AudioContext::new(EngineConfig {
        block_size: TEST_BLOCK_SIZE,
        ..Default::default()
    })
    .expect("Failed to create test context")
}

pub fn render_blocks(renderer: &mut Renderer, n: usize) {
    for _ in 0..n {
        renderer.render_block();
    }
}

/// Peak absolute value of a node's last rendered block.
pub fn peak(renderer: &Renderer, node: &NodeId) -> f32 {
    renderer
        .node_output(node, 0)
        .map(|block| block.iter().fold(0.0f32, |acc, s| acc.max(s.abs())))
        .unwrap_or(0.0)
}
