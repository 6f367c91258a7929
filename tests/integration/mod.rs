//! Integration test modules for Cadenza

pub mod engine;
pub mod graph;
#[cfg(feature = "synth")]
pub mod voices;
