//! Engine lifecycle integration tests
//!
//! Builder validation, renderer ownership and error mapping.

use crate::helpers::*;
use cadenza::prelude::*;
use cadenza::{EngineConfig, Error};

#[test]
fn test_builder_defaults() {
    let engine = Cadenza::builder().build().unwrap();

    assert_eq!(engine.sample_rate(), 44100.0);
    assert_eq!(engine.channels(), 2);
    assert_eq!(engine.current_time(), 0.0);
    assert_eq!(engine.engine().config().block_size, 128);
}

#[test]
fn test_builder_applies_settings() {
    let engine = test_engine();

    assert_eq!(engine.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(engine.engine().config().block_size, TEST_BLOCK_SIZE);

    let config = EngineConfig {
        channels: 4,
        ..Default::default()
    };
    let engine = Cadenza::builder().config(config).build().unwrap();
    assert_eq!(engine.channels(), 4);
}

#[test]
fn test_builder_rejects_invalid_config() {
    let cases = [
        Cadenza::builder().sample_rate(100.0).build(),
        Cadenza::builder().block_size(0).build(),
        Cadenza::builder().channels(0).build(),
        Cadenza::builder().event_capacity(0).build(),
    ];

    for result in cases {
        assert!(matches!(
            result,
            Err(Error::Core(cadenza::core::Error::InvalidConfig(_)))
        ));
    }
}

#[test]
fn test_render_offline_advances_time() {
    let engine = mono_engine();

    let audio = engine.render_offline(blocks(3)).unwrap();

    assert_eq!(audio.len(), 3 * TEST_BLOCK_SIZE);
    assert_silence(&audio, tolerances::FLOAT_EPSILON);
    assert!((engine.current_time() - blocks(3)).abs() < 1e-9);
}

#[test]
fn test_render_fills_interleaved_buffer() {
    let engine = test_engine();
    let mut buffer = vec![1.0; 100 * 2];

    engine.render(&mut buffer).unwrap();

    assert_silence(&buffer, tolerances::FLOAT_EPSILON);
    let frames = engine.with_renderer(|r| r.current_time()).unwrap();
    assert!((frames - blocks(2)).abs() < 1e-9);
}

#[test]
fn test_taken_renderer_is_unavailable() {
    let engine = test_engine();

    let mut renderer = engine.take_renderer().unwrap();
    assert!(matches!(
        engine.render_offline(0.01),
        Err(Error::RendererUnavailable)
    ));
    assert!(matches!(
        engine.take_renderer(),
        Err(Error::RendererUnavailable)
    ));

    // The graph is still editable and the taken renderer still plays it.
    engine.register(level_unit()).unwrap();
    let mut node = engine.create_node("level", &UnitOptions::new()).unwrap();
    node.connect_to(engine.destination()).unwrap();
    let block = renderer.render_block();
    assert!((block[0][0] - 0.5).abs() < tolerances::FLOAT_EPSILON);
}

#[test]
fn test_core_errors_are_wrapped() {
    let engine = test_engine();

    assert!(matches!(
        engine.create_node("missing", &UnitOptions::new()),
        Err(Error::Core(cadenza::core::Error::UnregisteredUnit(_)))
    ));

    let bad = UnitDefinition::per_sample("", [], 0, |_| 0.0);
    assert!(matches!(
        engine.register(bad),
        Err(Error::Core(cadenza::core::Error::Registration(_)))
    ));
}
